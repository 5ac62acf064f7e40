//! File data operations: read, write, truncate.

use tracing::debug;

use crate::node::{NodeBody, NodeState};
use crate::quota::OwnerId;

use super::{Error, EventFs, Result};

impl EventFs {
    /// Copies out at most `len` bytes from `offset`; empty at EOF.
    /// Concurrent readers are allowed.
    pub async fn read(&self, path: &str, offset: u64, len: usize) -> Result<Vec<u8>> {
        debug!(path, offset, len, "read");

        let node = self.resolve(path).await?;
        let state = node.state.read().await;
        match &state.body {
            NodeBody::File(file) => Ok(file.read(offset, len)),
            NodeBody::Dir(_) => Err(Error::IsDir),
            NodeBody::Symlink(_) => Err(Error::InvalidArgument),
        }
    }

    /// Writes `data` at `offset`, growing the file in RAM as needed.
    /// The entry is held exclusively for the duration.
    pub async fn write(&self, path: &str, offset: u64, data: &[u8]) -> Result<usize> {
        debug!(path, offset, len = data.len(), "write");

        let node = self.resolve(path).await?;
        let mut state = node.state.write().await;
        let NodeState { attr, body } = &mut *state;
        let file = match body {
            NodeBody::File(file) => file,
            NodeBody::Dir(_) => return Err(Error::IsDir),
            NodeBody::Symlink(_) => return Err(Error::InvalidArgument),
        };

        let end = offset + data.len() as u64;
        let delta = end.saturating_sub(file.size() as u64) as i64;
        self.check_byte_quota(attr.uid, attr.gid, delta).await?;

        file.write(offset, data);
        attr.touch();
        let owner = (attr.uid as OwnerId, attr.gid as OwnerId);
        drop(state);

        if delta != 0 {
            self.debit_usage(owner.0, owner.1, |usage| usage.change_num_bytes(delta)).await;
        }

        Ok(data.len())
    }

    /// Resets the logical size. Extension zero-fills; shrinking zeroes
    /// the abandoned tail without releasing memory, and never refuses
    /// on quota.
    pub async fn truncate(&self, path: &str, new_size: u64) -> Result<()> {
        debug!(path, new_size, "truncate");

        let node = self.resolve(path).await?;
        let mut state = node.state.write().await;
        let NodeState { attr, body } = &mut *state;
        let file = match body {
            NodeBody::File(file) => file,
            NodeBody::Dir(_) => return Err(Error::IsDir),
            NodeBody::Symlink(_) => return Err(Error::InvalidArgument),
        };

        let delta = new_size as i64 - file.size() as i64;
        if delta > 0 {
            self.check_byte_quota(attr.uid, attr.gid, delta).await?;
        }

        file.truncate(new_size);
        attr.touch();
        let owner = (attr.uid as OwnerId, attr.gid as OwnerId);
        drop(state);

        if delta != 0 {
            self.debit_usage(owner.0, owner.1, |usage| usage.change_num_bytes(delta)).await;
        }

        Ok(())
    }

    /// Enforces the byte budget of the file owner before a write
    /// grows the owner's footprint by `delta`.
    ///
    /// An owner unknown to both usage tables is refused outright: a
    /// file that was never accounted for cannot be charged either.
    async fn check_byte_quota(&self, uid: u32, gid: u32, delta: i64) -> Result<()> {
        let owner_uid = uid as OwnerId;
        let owner_gid = gid as OwnerId;

        let quotas = self.quotas().await;

        let user_limit = quotas
            .user_quotas
            .lookup(owner_uid)
            .map(|quota| quota.max_bytes)
            .unwrap_or(self.config().default_max_bytes);
        let user_used = quotas.user_usages.lookup(owner_uid).map(|usage| usage.num_bytes());

        let group_limit = quotas
            .group_quotas
            .lookup(owner_gid)
            .map(|quota| quota.max_bytes)
            .unwrap_or(self.config().default_max_bytes);
        let group_used = quotas.group_usages.lookup(owner_gid).map(|usage| usage.num_bytes());
        drop(quotas);

        if user_used.is_none() && group_used.is_none() {
            return Err(Error::OverQuota);
        }

        let used = user_used.unwrap_or(0);
        if used.saturating_add(delta).max(0) as u64 > user_limit {
            debug!(uid, limit = user_limit, used, delta, "user byte quota reached");
            return Err(Error::OverQuota);
        }

        let used = group_used.unwrap_or(0);
        if used.saturating_add(delta).max(0) as u64 > group_limit {
            debug!(gid, limit = group_limit, used, delta, "group byte quota reached");
            return Err(Error::OverQuota);
        }

        Ok(())
    }
}
