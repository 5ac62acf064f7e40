//! Directory listings and the root sweep.

use std::sync::Arc;

use tracing::{debug, error};

use crate::node::{Node, NodeKind};

use super::{DirEntry, Error, EventFs, Result, STICKY_XATTR};

enum Verdict {
    Keep,
    Omit,
    Reap,
}

impl EventFs {
    /// Lists a directory. Listing the root re-runs the creator
    /// liveness check on every non-sticky child directory: dead ones
    /// are marked, queued for reclamation, and omitted.
    pub async fn readdir(&self, path: &str) -> Result<Vec<DirEntry>> {
        debug!(path, "readdir");

        let node = self.resolve(path).await?;
        if node.kind() != NodeKind::Dir {
            return Err(Error::NotDir);
        }

        if crate::node::depth(path) > 0 {
            let state = node.state.read().await;
            let dir = state.dir().ok_or(Error::Io)?;
            if dir.inode.as_ref().is_some_and(|inode| inode.is_deleted()) {
                return Err(Error::NotFound);
            }
            return Ok(Self::listing(&dir.children));
        }

        let children: Vec<(String, Arc<Node>)> = {
            let state = node.state.read().await;
            let dir = state.dir().ok_or(Error::Io)?;
            dir.children.iter().map(|(name, child)| (name.clone(), Arc::clone(child))).collect()
        };

        let mut entries = Vec::with_capacity(children.len());
        for (name, child) in children {
            if child.kind() != NodeKind::Dir {
                entries.push(DirEntry { name, ino: child.ino(), kind: child.kind() });
                continue;
            }

            match self.probe_child(path, &name, &child).await {
                Verdict::Keep => {
                    entries.push(DirEntry { name, ino: child.ino(), kind: NodeKind::Dir });
                }
                Verdict::Omit => {}
                Verdict::Reap => self.reap_child(path, &name, &child).await,
            }
        }

        Ok(entries)
    }

    /// First pass over a root child, under its read lock.
    async fn probe_child(&self, path: &str, name: &str, child: &Arc<Node>) -> Verdict {
        let state = child.state.read().await;
        let Some(dir) = state.dir() else {
            return Verdict::Keep;
        };

        if state.attr.xattrs.contains_key(STICKY_XATTR) {
            return Verdict::Keep;
        }

        let Some(inode) = dir.inode.as_ref() else {
            return Verdict::Omit;
        };
        if inode.is_deleted() {
            return Verdict::Omit;
        }

        match inode.is_valid() {
            Err(err) => {
                error!(path, name, %err, "liveness probe failed");
                Verdict::Keep
            }
            Ok(true) => Verdict::Keep,
            Ok(false) => Verdict::Reap,
        }
    }

    /// Second pass for a child that looked dead: re-check under the
    /// write lock (a racing marker may have won), then mark and hand
    /// the subtree to the worker.
    async fn reap_child(&self, path: &str, name: &str, child: &Arc<Node>) {
        let mut state = child.state.write().await;
        let Some(dir_state) = state.dir_mut() else {
            return;
        };
        let Some(inode) = dir_state.inode.as_mut() else {
            return;
        };
        if inode.is_deleted() {
            return;
        }

        let pid = inode.snapshot().pid();
        inode.set_deleted();
        let garbage = crate::deferred::tag_garbage(dir_state);
        drop(state);

        let child_path = crate::node::fullpath(path, name);
        debug!(path = %child_path, pid, "detaching orphaned directory");
        self.deferred_remove(&child_path, child, garbage);
    }

    fn listing(
        children: &std::collections::BTreeMap<String, Arc<Node>>,
    ) -> Vec<DirEntry> {
        children
            .iter()
            .map(|(name, child)| DirEntry {
                name: name.clone(),
                ino: child.ino(),
                kind: child.kind(),
            })
            .collect()
    }
}
