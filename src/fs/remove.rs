//! Name removal: unlink of files and anchors, rmdir of directories.

use tracing::{debug, error};

use crate::inode::DetachedFile;
use crate::node::{self, NodeKind, NodeState};
use crate::quota::OwnerId;

use super::{Error, EventFs, Result};

impl EventFs {
    /// Removes a name from its directory. Unlinking an anchor symlink
    /// pops the file it points at and regenerates the anchor; plain
    /// files are spliced out of the deque.
    pub async fn unlink(&self, path: &str) -> Result<()> {
        debug!(path, "unlink");

        let (parent, name) = self.resolve_parent(path).await?;
        if parent.kind() != NodeKind::Dir {
            return Err(Error::NotDir);
        }

        let mut state = parent.state.write().await;
        let NodeState { attr, body } = &mut *state;
        let dir_state = body.dir_mut().ok_or(Error::NotDir)?;
        let owner = (attr.uid, attr.gid);

        let child = dir_state.children.get(&name).cloned().ok_or(Error::NotFound)?;
        if child.kind() == NodeKind::Dir {
            return Err(Error::IsDir);
        }

        let crate::node::DirState { children, inode } = dir_state;
        let Some(dir_inode) = inode.as_mut() else {
            error!(path, "parent has no inode data");
            return Err(Error::Io);
        };
        if dir_inode.is_deleted() {
            return Err(Error::NotFound);
        }

        if dir_inode.is_anchor_head(&child) {
            node::detach(children, &name);
            child.try_destroy();
            let popped = dir_inode.pop_head(children, self.ino_allocator(), owner).await?;
            attr.touch();
            drop(state);
            if let Some(file) = popped {
                self.debit_removed_file(&file).await;
            }
            return Ok(());
        }

        if dir_inode.is_anchor_tail(&child) {
            node::detach(children, &name);
            child.try_destroy();
            let popped = dir_inode.pop_tail(children, self.ino_allocator(), owner).await?;
            attr.touch();
            drop(state);
            if let Some(file) = popped {
                self.debit_removed_file(&file).await;
            }
            return Ok(());
        }

        // A plain file somewhere in the deque.
        dir_inode.remove(children, &name).await?;
        node::detach(children, &name);
        let destroyed = child.try_destroy();

        let (size, uid, gid) = {
            let child_state = child.state.read().await;
            match child_state.file() {
                Some(file) => (file.size() as i64, child_state.attr.uid, child_state.attr.gid),
                None => (0, child_state.attr.uid, child_state.attr.gid),
            }
        };
        attr.touch();
        drop(state);

        if child.kind() == NodeKind::File {
            self.debit_usage(uid as OwnerId, gid as OwnerId, |usage| {
                usage.change_num_files(-1);
                if destroyed {
                    usage.change_num_bytes(-size);
                }
            })
            .await;
        }

        Ok(())
    }

    /// Removes an empty event directory; its creator's explicit
    /// counterpart to the deferred reclamation.
    pub async fn rmdir(&self, path: &str) -> Result<()> {
        debug!(path, "rmdir");

        let components = node::components(path);
        let name = match components.as_slice() {
            [name] => (*name).to_owned(),
            [] => return Err(Error::NotPermitted),
            _ => {
                // Nothing below depth one can be a directory.
                return match self.resolve(path).await {
                    Ok(node) if node.kind() != NodeKind::Dir => Err(Error::NotDir),
                    Ok(_) => Err(Error::NotPermitted),
                    Err(err) => Err(err),
                };
            }
        };

        let mut root_state = self.root().state.write().await;
        let root_dir = root_state.dir_mut().ok_or(Error::Io)?;
        let child = root_dir.children.get(&name).cloned().ok_or(Error::NotFound)?;
        if child.kind() != NodeKind::Dir {
            return Err(Error::NotDir);
        }

        let owner = {
            let child_state = child.state.read().await;
            let dir = child_state.dir().ok_or(Error::Io)?;
            match &dir.inode {
                Some(inode) if inode.is_deleted() => return Err(Error::NotFound),
                Some(inode) if !inode.is_empty() => return Err(Error::NotEmpty),
                Some(_) => {}
                None => return Err(Error::Io),
            }
            (child_state.attr.uid as OwnerId, child_state.attr.gid as OwnerId)
        };

        node::detach(&mut root_dir.children, &name);
        child.try_destroy();
        root_state.attr.touch();
        drop(root_state);

        self.debit_usage(owner.0, owner.1, |usage| usage.change_num_dirs(-1)).await;

        Ok(())
    }

    /// Settles the accounting for a file detached by one of the pops.
    pub(crate) async fn debit_removed_file(&self, file: &DetachedFile) {
        debug!(name = %file.name, size = file.size, destroyed = file.destroyed, "file removed");
        self.debit_usage(file.uid as OwnerId, file.gid as OwnerId, |usage| {
            usage.change_num_files(-1);
            if file.destroyed {
                usage.change_num_bytes(-(file.size as i64));
            }
        })
        .await;
    }
}
