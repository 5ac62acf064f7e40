//! Directory creation.

use std::sync::atomic::Ordering;

use tracing::debug;

use crate::inode::DirInode;
use crate::node::{self, Node, NodeAttr};
use crate::proc::VerifyDiscipline;
use crate::quota::OwnerId;

use super::{Credentials, Error, EventFs, Result, REAP_FREQUENCY};

impl EventFs {
    /// Creates an event directory. Only one level of directories is
    /// permitted beneath the root.
    pub async fn mkdir(&self, path: &str, mode: u32, cred: &Credentials) -> Result<()> {
        debug!(path, pid = cred.pid, "mkdir");

        let components = node::components(path);
        let name = match components.as_slice() {
            [name] => (*name).to_owned(),
            [] => return Err(Error::Exists),
            _ => return Err(Error::NotPermitted),
        };

        let caller_uid = cred.uid as OwnerId;
        let caller_gid = cred.gid as OwnerId;

        let mut state = self.root().state.write().await;
        let root_state = state.dir_mut().ok_or(Error::Io)?;
        if root_state.children.contains_key(&name) {
            return Err(Error::Exists);
        }

        let (user_limit, user_used, group_limit, group_used) = {
            let quotas = self.quotas().await;

            let user_limit = quotas
                .user_quotas
                .lookup(caller_uid)
                .map(|quota| quota.max_dirs)
                .unwrap_or(self.config().default_max_dirs);
            let user_used = quotas.user_usages.lookup(caller_uid).map(|usage| usage.num_dirs());

            let group_limit = quotas
                .group_quotas
                .lookup(caller_gid)
                .map(|quota| quota.max_dirs)
                .unwrap_or(self.config().default_max_dirs);
            let group_used = quotas.group_usages.lookup(caller_gid).map(|usage| usage.num_dirs());

            (user_limit, user_used, group_limit, group_used)
        };

        if user_used.unwrap_or(0).max(0) as u64 >= user_limit {
            debug!(uid = cred.uid, limit = user_limit, "user directory quota reached");
            self.deferred_reap();
            return Err(Error::OverQuota);
        }

        if group_used.unwrap_or(0).max(0) as u64 >= group_limit {
            debug!(gid = cred.gid, limit = group_limit, "group directory quota reached");
            self.deferred_reap();
            return Err(Error::OverQuota);
        }

        let inode =
            DirInode::new(cred.pid, VerifyDiscipline::DEFAULT).map_err(|_| Error::Io)?;
        let dir_node = Node::new_dir(
            self.ino_allocator().allocate(),
            NodeAttr::new(mode, cred.uid, cred.gid),
            Some(inode),
        );
        node::attach(&mut root_state.children, &name, &dir_node);
        state.attr.touch();
        drop(state);

        // A high volume of mkdirs must not starve the sweeper: of the
        // racers that see the counter hit the threshold, exactly one
        // observes the decrement result below it and schedules.
        let count = self.mkdir_counter().fetch_add(1, Ordering::SeqCst) + 1;
        if count == REAP_FREQUENCY {
            let after = self.mkdir_counter().fetch_sub(REAP_FREQUENCY, Ordering::SeqCst)
                - REAP_FREQUENCY;
            if after < REAP_FREQUENCY {
                debug!("reap dead directories");
                self.deferred_reap();
            }
        }

        self.charge_usage(caller_uid, caller_gid, |usage| usage.change_num_dirs(1)).await;

        Ok(())
    }
}
