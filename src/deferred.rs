//! Deferred reclamation of dead directories.
//!
//! A callback that finds a directory whose creator died cannot tear
//! the subtree down on the spot: it holds the directory's own lock,
//! and the teardown needs to visit every child. Instead the callback
//! marks the directory deleted, strips its children out of the
//! namespace while it still holds the write lock, and hands the
//! orphaned set to the work-queue worker. The worker owns the subtree
//! outright at that point and needs no cooperation from callers.
//!
//! The periodic sweep is the second job flavour: it lists the root
//! through the engine's own `readdir`, which re-runs the liveness
//! check on every child directory and queues reclamation for the dead
//! ones. The worker never holds an entry lock when a job starts, so
//! the sweep cannot deadlock against the callbacks it triggers.

use std::sync::Arc;

use tracing::{debug, error};

use crate::fs::EventFs;
use crate::node::{self, DirState, Node, NodeKind};
use crate::quota::OwnerId;

/// Strips every child of a marked directory out of the namespace.
/// The directory's write lock must be held; the returned set belongs
/// to the deferred worker.
pub(crate) fn tag_garbage(dir: &mut DirState) -> Vec<(String, Arc<Node>)> {
    let names: Vec<String> = dir.children.keys().cloned().collect();
    let garbage = names
        .into_iter()
        .filter_map(|name| node::detach(&mut dir.children, &name).map(|child| (name, child)))
        .collect();

    if let Some(inode) = dir.inode.as_mut() {
        inode.clear();
    }
    garbage
}

impl EventFs {
    /// Queues the recursive detach of a marked directory. `garbage`
    /// is the child set collected under the directory's write lock.
    pub(crate) fn deferred_remove(
        &self,
        path: &str,
        dir: &Arc<Node>,
        garbage: Vec<(String, Arc<Node>)>,
    ) {
        let Some(fs) = self.arc() else {
            return;
        };
        let dir = Arc::clone(dir);
        let path = path.to_owned();

        self.work_queue().add(Box::pin(async move {
            fs.reclaim(&path, &dir, garbage).await;
        }));
    }

    /// Queues a sweep of the mount: list the root so that every child
    /// directory gets its liveness re-checked.
    pub(crate) fn deferred_reap(&self) {
        let Some(fs) = self.arc() else {
            return;
        };

        self.work_queue().add(Box::pin(async move {
            debug!("sweep the root for dead directories");
            if let Err(err) = fs.readdir("/").await {
                error!(%err, "sweep failed");
            }
        }));
    }

    /// Worker half of the reclamation: destroy the orphaned children,
    /// drop the directory's name from the root, and settle the usage
    /// accounting.
    async fn reclaim(&self, path: &str, dir: &Arc<Node>, garbage: Vec<(String, Arc<Node>)>) {
        debug!(path, children = garbage.len(), "deferred remove");

        for (name, child) in garbage {
            if child.is_dead() {
                continue;
            }
            let destroyed = child.try_destroy();

            if child.kind() == NodeKind::File {
                let (size, uid, gid) = {
                    let state = child.state.read().await;
                    let size = state.file().map(|file| file.size() as i64).unwrap_or(0);
                    (size, state.attr.uid as OwnerId, state.attr.gid as OwnerId)
                };
                self.debit_usage(uid, gid, |usage| {
                    usage.change_num_files(-1);
                    if destroyed {
                        usage.change_num_bytes(-size);
                    }
                })
                .await;
            }

            debug!(path, name, destroyed, "reclaimed child");
        }

        // Drop the directory's own name from the root namespace.
        let name = crate::node::components(path).pop().unwrap_or_default().to_owned();
        {
            let mut root_state = self.root().state.write().await;
            if let Some(root_dir) = root_state.dir_mut() {
                let still_ours =
                    root_dir.children.get(&name).is_some_and(|entry| Arc::ptr_eq(entry, dir));
                if still_ours {
                    node::detach(&mut root_dir.children, &name);
                }
            }
        }
        dir.try_destroy();

        let owner = {
            let state = dir.state.read().await;
            (state.attr.uid as OwnerId, state.attr.gid as OwnerId)
        };
        self.debit_usage(owner.0, owner.1, |usage| usage.change_num_dirs(-1)).await;

        debug!(path, "reclaimed directory");
    }
}
