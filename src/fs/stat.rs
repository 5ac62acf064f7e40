//! Attribute queries, the creator-liveness check, and xattrs.

use tracing::{debug, error};

use crate::node::{NodeKind, NodeState};

use super::{Error, EventFs, FileStat, Result, STICKY_XATTR};

impl EventFs {
    /// Fills the standard attributes. A stat of a non-root directory
    /// doubles as the garbage-collection probe: when the creating
    /// process no longer matches its snapshot, the directory is
    /// marked, handed to the deferred worker, and reported missing.
    pub async fn stat(&self, path: &str) -> Result<FileStat> {
        debug!(path, "stat");

        let node = self.resolve(path).await?;

        if node.kind() != NodeKind::Dir || crate::node::depth(path) == 0 {
            let state = node.state.read().await;
            return Ok(Self::stat_of(&node, &state));
        }

        let mut state = node.state.write().await;
        let stat = Self::stat_of(&node, &state);

        let NodeState { attr, body } = &mut *state;
        let dir_state = body.dir_mut().ok_or(Error::Io)?;
        let Some(inode) = dir_state.inode.as_mut() else {
            // Already stripped by a racing reclaim.
            return Err(Error::NotFound);
        };
        if inode.is_deleted() {
            return Err(Error::NotFound);
        }

        if attr.xattrs.contains_key(STICKY_XATTR) {
            debug!(path, "sticky directory does not share fate with its creator");
            return Ok(stat);
        }

        match inode.is_valid() {
            Err(err) => {
                // Probe trouble is not proof of death; keep the
                // directory until a later check can tell.
                error!(path, %err, "liveness probe failed");
                Ok(stat)
            }
            Ok(true) => {
                debug!(path, pid = inode.snapshot().pid(), "creator still valid");
                Ok(stat)
            }
            Ok(false) => {
                let pid = inode.snapshot().pid();
                inode.set_deleted();
                let garbage = crate::deferred::tag_garbage(dir_state);
                drop(state);

                debug!(path, pid, "detaching orphaned directory");
                self.deferred_remove(path, &node, garbage);
                Err(Error::NotFound)
            }
        }
    }

    /// Resolves a symlink's target string.
    pub async fn readlink(&self, path: &str) -> Result<String> {
        debug!(path, "readlink");

        let node = self.resolve(path).await?;
        let state = node.state.read().await;
        match &state.body {
            crate::node::NodeBody::Symlink(target) => Ok(target.clone()),
            _ => Err(Error::InvalidArgument),
        }
    }

    /// Stores an extended attribute on an entry.
    pub async fn set_xattr(&self, path: &str, name: &str, value: &[u8]) -> Result<()> {
        debug!(path, name, "setxattr");

        let node = self.resolve(path).await?;
        let mut state = node.state.write().await;
        if let Some(dir) = state.dir() {
            if dir.inode.as_ref().is_some_and(|inode| inode.is_deleted()) {
                return Err(Error::NotFound);
            }
        }
        state.attr.xattrs.insert(name.to_owned(), value.to_vec());
        Ok(())
    }

    /// Reads an extended attribute. A zero-length value still answers
    /// success, which is how stickiness is probed.
    pub async fn get_xattr(&self, path: &str, name: &str) -> Result<Vec<u8>> {
        debug!(path, name, "getxattr");

        let node = self.resolve(path).await?;
        let state = node.state.read().await;
        if let Some(dir) = state.dir() {
            if dir.inode.as_ref().is_some_and(|inode| inode.is_deleted()) {
                return Err(Error::NotFound);
            }
        }
        state.attr.xattrs.get(name).cloned().ok_or(Error::NotFound)
    }
}
