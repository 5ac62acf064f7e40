//! File creation.

use tracing::{debug, error};

use crate::inode::FileInode;
use crate::node::{self, Node, NodeAttr, NodeKind, HEAD_NAME, TAIL_NAME};
use crate::quota::OwnerId;

use super::{Credentials, Error, EventFs, Result};

impl EventFs {
    /// Creates an event file at `path` and appends it to the owning
    /// directory's deque.
    pub async fn create(&self, path: &str, mode: u32, cred: &Credentials) -> Result<()> {
        debug!(path, pid = cred.pid, "create");

        let (parent, name) = self.resolve_parent(path).await?;
        if parent.kind() != NodeKind::Dir {
            return Err(Error::NotDir);
        }
        if name == HEAD_NAME || name == TAIL_NAME {
            // Only the anchor symlinks may bear these names.
            return Err(Error::NotPermitted);
        }

        let mut state = parent.state.write().await;
        let crate::node::NodeState { attr, body } = &mut *state;
        let dir_state = body.dir_mut().ok_or(Error::NotDir)?;
        let owner = (attr.uid, attr.gid);

        let Some(dir_inode) = dir_state.inode.as_mut() else {
            // Files live only inside event directories, never in the root.
            error!(path, "parent has no inode data");
            return Err(Error::Io);
        };
        if dir_inode.is_deleted() {
            return Err(Error::NotFound);
        }
        if dir_state.children.contains_key(&name) {
            return Err(Error::Exists);
        }

        let caller_uid = cred.uid as OwnerId;
        let caller_gid = cred.gid as OwnerId;
        let num_dir_files = dir_inode.queue().len() as u64;

        let (dir_limits, user_limit, user_used, group_limit, group_used) = {
            let quotas = self.quotas().await;

            // The per-directory budget belongs to the directory owner,
            // and the user and group lookups are independent.
            let user_dir_limit = quotas
                .user_quotas
                .lookup(owner.0 as OwnerId)
                .map(|quota| quota.max_files_per_dir);
            let group_dir_limit = quotas
                .group_quotas
                .lookup(owner.1 as OwnerId)
                .map(|quota| quota.max_files_per_dir);
            let dir_limits = match (user_dir_limit, group_dir_limit) {
                (None, None) => vec![self.config().default_max_files_per_dir],
                (user, group) => user.into_iter().chain(group).collect(),
            };

            let user_limit = quotas
                .user_quotas
                .lookup(caller_uid)
                .map(|quota| quota.max_files)
                .unwrap_or(self.config().default_max_files);
            let user_used = quotas.user_usages.lookup(caller_uid).map(|usage| usage.num_files());

            let group_limit = quotas
                .group_quotas
                .lookup(caller_gid)
                .map(|quota| quota.max_files)
                .unwrap_or(self.config().default_max_files);
            let group_used = quotas.group_usages.lookup(caller_gid).map(|usage| usage.num_files());

            (dir_limits, user_limit, user_used, group_limit, group_used)
        };

        if dir_limits.iter().any(|limit| num_dir_files >= *limit) {
            debug!(path, uid = owner.0, used = num_dir_files, "per-directory quota reached");
            return Err(Error::OverQuota);
        }

        if user_used.unwrap_or(0).max(0) as u64 >= user_limit {
            debug!(uid = cred.uid, limit = user_limit, "user file quota reached");
            self.deferred_reap();
            return Err(Error::OverQuota);
        }

        if group_used.unwrap_or(0).max(0) as u64 >= group_limit {
            debug!(gid = cred.gid, limit = group_limit, "group file quota reached");
            self.deferred_reap();
            return Err(Error::OverQuota);
        }

        let file_node = Node::new_file(
            self.ino_allocator().allocate(),
            NodeAttr::new(mode, cred.uid, cred.gid),
            FileInode::new(&name),
        );

        let crate::node::DirState { children, inode } = dir_state;
        let dir_inode = inode.as_mut().ok_or(Error::Io)?;
        dir_inode.append(children, self.ino_allocator(), owner, &name).await?;
        node::attach(children, &name, &file_node);
        attr.touch();
        drop(state);

        self.charge_usage(caller_uid, caller_gid, |usage| usage.change_num_files(1)).await;

        Ok(())
    }
}
