//! Hard links into a deque, and the rename refusal.

use tracing::debug;

use crate::node::{self, NodeKind, NodeState, HEAD_NAME, TAIL_NAME};

use super::{Error, EventFs, Result};

impl EventFs {
    /// Gives an existing file an additional name in the target
    /// directory. The new name joins the tail of that directory's
    /// deque; it is a fresh queue position, not a shared one.
    pub async fn link(&self, path: &str, new_path: &str) -> Result<()> {
        debug!(path, new_path, "link");

        let source = self.resolve(path).await?;
        if source.kind() != NodeKind::File {
            return Err(Error::NotPermitted);
        }

        let (parent, new_name) = self.resolve_parent(new_path).await?;
        if parent.kind() != NodeKind::Dir {
            return Err(Error::NotDir);
        }
        if new_name == HEAD_NAME || new_name == TAIL_NAME {
            return Err(Error::NotPermitted);
        }

        let mut state = parent.state.write().await;
        let NodeState { attr, body } = &mut *state;
        let dir_state = body.dir_mut().ok_or(Error::NotDir)?;
        let owner = (attr.uid, attr.gid);

        let crate::node::DirState { children, inode } = dir_state;
        let Some(dir_inode) = inode.as_mut() else {
            // Linking into the root, or into a directory already torn
            // down.
            return Err(Error::NotFound);
        };
        if dir_inode.is_deleted() {
            return Err(Error::NotFound);
        }
        if children.contains_key(&new_name) {
            return Err(Error::Exists);
        }

        dir_inode.append(children, self.ino_allocator(), owner, &new_name).await?;
        node::attach(children, &new_name, &source);
        attr.touch();

        Ok(())
    }

    /// Rename is permanently disabled: queue order is append-only and
    /// the anchor names must never move.
    pub async fn rename(&self, path: &str, new_path: &str) -> Result<()> {
        debug!(path, new_path, "rename refused");
        Err(Error::NotPermitted)
    }
}
