//! Filesystem engine --- state, errors, and the operation surface the
//! host adapter routes into.

mod create;
mod io;
mod link;
mod mkdir;
mod readdir;
mod remove;
mod stat;

use std::fmt;
use std::sync::atomic::AtomicI64;
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use async_trait::async_trait;
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::{FromPrimitive as _, ToPrimitive as _};
use tokio::sync::RwLock;

use crate::config::Config;
use crate::node::{InoAllocator, Node, NodeAttr, NodeBody, NodeKind};
use crate::proc::Pid;
use crate::quota::{OwnerId, QuotaState, QuotaTable, UsageEntry};
use crate::wq::WorkQueue;

/// Result of filesystem operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Try to prune dead directories every this many successful mkdirs.
pub const REAP_FREQUENCY: i64 = 10;

/// Extended attribute marking a directory that does not share fate
/// with its creator process.
pub const STICKY_XATTR: &str = "user.eventfs_sticky";

/// Filesystem errors, valued by the errno the adapter reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(i32)]
pub enum Error {
    /// Null or malformed input where a value is required.
    InvalidArgument = libc::EINVAL,
    /// Missing inode, deleted directory, or empty-deque pop.
    NotFound = libc::ENOENT,
    /// Forbidden shape: mkdir below depth one, rename, touching the
    /// anchor names.
    NotPermitted = libc::EPERM,
    /// Internal invariant violation; logged at the point of detection.
    Io = libc::EIO,
    /// Inode payload missing where that should be impossible.
    NotSupported = libc::ENOSYS,
    /// Allocation failure.
    OutOfMemory = libc::ENOMEM,
    /// A quota would be exceeded.
    OverQuota = libc::EDQUOT,
    /// Name already taken.
    Exists = libc::EEXIST,
    /// Directory still has queued files.
    NotEmpty = libc::ENOTEMPTY,
    /// Directory given to a file operation.
    IsDir = libc::EISDIR,
    /// Non-directory given to a directory operation.
    NotDir = libc::ENOTDIR,
}

impl Error {
    /// The small-integer status the adapter surfaces (negative errno).
    pub fn status(self) -> i32 {
        -self.to_i32().unwrap_or(libc::EIO)
    }

    /// Recovers an error from an adapter status code.
    pub fn from_status(status: i32) -> Option<Self> {
        Self::from_i32(-status)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Error::InvalidArgument => "invalid argument",
            Error::NotFound => "not found",
            Error::NotPermitted => "not permitted",
            Error::Io => "I/O error",
            Error::NotSupported => "not supported",
            Error::OutOfMemory => "out of memory",
            Error::OverQuota => "quota exceeded",
            Error::Exists => "already exists",
            Error::NotEmpty => "directory not empty",
            Error::IsDir => "is a directory",
            Error::NotDir => "not a directory",
        };
        f.write_str(text)
    }
}

impl std::error::Error for Error {}

/// Identity of the process invoking an operation, as reported by the
/// host adapter.
#[derive(Debug, Clone, Copy)]
pub struct Credentials {
    pub uid: u32,
    pub gid: u32,
    pub pid: Pid,
}

impl Credentials {
    /// Credentials of this process; what a local adapter would pass.
    pub fn current() -> Self {
        // SAFETY: geteuid/getegid only read process state.
        let (uid, gid) = unsafe { (libc::geteuid(), libc::getegid()) };
        Self { uid, gid, pid: std::process::id() as Pid }
    }
}

/// Attributes returned by [`Vfs::stat`].
#[derive(Debug, Clone)]
pub struct FileStat {
    pub ino: u64,
    pub kind: NodeKind,
    pub size: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    pub mtime: SystemTime,
}

/// One row of a [`Vfs::readdir`] listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub ino: u64,
    pub kind: NodeKind,
}

/// An open-handle token; keeps the inode alive until released.
///
/// Hand it back through [`EventFs::release`]. A handle that is merely
/// dropped keeps the inode pinned forever, exactly like a leaked file
/// descriptor.
pub struct OpenHandle {
    pub(crate) node: Arc<Node>,
}

/// The operation table the host adapter routes filesystem calls into.
///
/// All operations take per-inode concurrent locking except
/// [`Vfs::write`] and [`Vfs::truncate`], which serialise on the entry
/// they touch. Rename is deliberately absent from the route table; the
/// method exists only to document the refusal.
#[async_trait]
pub trait Vfs: Send + Sync {
    async fn create(&self, path: &str, mode: u32, cred: &Credentials) -> Result<()>;

    async fn mkdir(&self, path: &str, mode: u32, cred: &Credentials) -> Result<()>;

    async fn read(&self, path: &str, offset: u64, len: usize) -> Result<Vec<u8>>;

    async fn write(&self, path: &str, offset: u64, data: &[u8]) -> Result<usize>;

    async fn truncate(&self, path: &str, new_size: u64) -> Result<()>;

    async fn unlink(&self, path: &str) -> Result<()>;

    async fn rmdir(&self, path: &str) -> Result<()>;

    async fn stat(&self, path: &str) -> Result<FileStat>;

    async fn readdir(&self, path: &str) -> Result<Vec<DirEntry>>;

    async fn readlink(&self, path: &str) -> Result<String>;

    async fn link(&self, path: &str, new_path: &str) -> Result<()>;

    async fn rename(&self, path: &str, new_path: &str) -> Result<()>;

    async fn set_xattr(&self, path: &str, name: &str, value: &[u8]) -> Result<()>;

    async fn get_xattr(&self, path: &str, name: &str) -> Result<Vec<u8>>;
}

/// The mounted filesystem.
pub struct EventFs {
    self_ref: Weak<EventFs>,
    config: Config,
    root: Arc<Node>,
    quotas: RwLock<QuotaState>,
    wq: Arc<WorkQueue>,
    ino: InoAllocator,
    mkdir_count: AtomicI64,
}

impl EventFs {
    /// Builds the engine around a loaded configuration and quota
    /// tables. The work queue is created stopped; call
    /// [`EventFs::start`] before serving.
    pub fn new(config: Config, user_quotas: QuotaTable, group_quotas: QuotaTable) -> Arc<Self> {
        let cred = Credentials::current();
        let root = Node::new_dir(1, NodeAttr::new(0o755, cred.uid, cred.gid), None);

        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            config,
            root,
            quotas: RwLock::new(QuotaState::new(user_quotas, group_quotas)),
            wq: Arc::new(WorkQueue::new()),
            ino: InoAllocator::new(2),
            mkdir_count: AtomicI64::new(0),
        })
    }

    /// Starts the deferred-work worker.
    pub fn start(&self) {
        self.wq.start();
    }

    /// Stops the worker after the job in hand; pending reclamation is
    /// dropped.
    pub fn stop(&self) {
        self.wq.stop();
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn root(&self) -> &Arc<Node> {
        &self.root
    }

    pub(crate) fn work_queue(&self) -> &Arc<WorkQueue> {
        &self.wq
    }

    pub(crate) fn ino_allocator(&self) -> &InoAllocator {
        &self.ino
    }

    pub(crate) fn mkdir_counter(&self) -> &AtomicI64 {
        &self.mkdir_count
    }

    /// Waits for all queued reclamation work to finish. Test and
    /// shutdown aid.
    pub async fn quiesce(&self) {
        self.wq.quiesce().await;
    }

    pub(crate) fn arc(&self) -> Option<Arc<Self>> {
        self.self_ref.upgrade()
    }

    /// Walks `path` from the root.
    pub(crate) async fn resolve(&self, path: &str) -> Result<Arc<Node>> {
        let mut current = Arc::clone(&self.root);
        for component in crate::node::components(path) {
            let next = {
                let state = current.state.read().await;
                match state.dir() {
                    Some(dir) => dir.children.get(component).cloned(),
                    None => return Err(Error::NotDir),
                }
            };
            current = next.ok_or(Error::NotFound)?;
        }
        Ok(current)
    }

    /// Resolves the parent directory of `path` and splits off the
    /// leaf name.
    pub(crate) async fn resolve_parent(&self, path: &str) -> Result<(Arc<Node>, String)> {
        let mut components = crate::node::components(path);
        let name = components.pop().ok_or(Error::InvalidArgument)?;

        let mut current = Arc::clone(&self.root);
        for component in components {
            let next = {
                let state = current.state.read().await;
                match state.dir() {
                    Some(dir) => dir.children.get(component).cloned(),
                    None => return Err(Error::NotDir),
                }
            };
            current = next.ok_or(Error::NotFound)?;
        }
        Ok((current, name.to_owned()))
    }

    /// Applies `apply` to the caller's user and group usage entries,
    /// creating them when absent.
    pub(crate) async fn charge_usage<F: Fn(&UsageEntry)>(
        &self,
        uid: OwnerId,
        gid: OwnerId,
        apply: F,
    ) {
        {
            let quotas = self.quotas.read().await;
            if let (Some(user), Some(group)) =
                (quotas.user_usages.lookup(uid), quotas.group_usages.lookup(gid))
            {
                apply(user);
                apply(group);
                return;
            }
        }

        let mut quotas = self.quotas.write().await;
        apply(quotas.user_usages.ensure(uid));
        apply(quotas.group_usages.ensure(gid));
    }

    /// Applies `apply` to whichever of the two usage entries already
    /// exist. Removal paths never create accounting records.
    pub(crate) async fn debit_usage<F: Fn(&UsageEntry)>(
        &self,
        uid: OwnerId,
        gid: OwnerId,
        apply: F,
    ) {
        let quotas = self.quotas.read().await;
        if let Some(user) = quotas.user_usages.lookup(uid) {
            apply(user);
        }
        if let Some(group) = quotas.group_usages.lookup(gid) {
            apply(group);
        }
    }

    pub(crate) async fn quotas(&self) -> tokio::sync::RwLockReadGuard<'_, QuotaState> {
        self.quotas.read().await
    }

    /// Opens a handle on `path`, pinning the inode.
    pub async fn open(&self, path: &str) -> Result<OpenHandle> {
        let node = self.resolve(path).await?;
        node.open();
        Ok(OpenHandle { node })
    }

    /// Drops an open handle. An inode whose last name and last handle
    /// are both gone is destroyed here, settling the byte accounting
    /// deferred at unlink time.
    pub async fn release(&self, handle: OpenHandle) {
        let node = handle.node;
        if !node.release() {
            return;
        }
        node.mark_dead();

        let debit = {
            let state = node.state.read().await;
            state.file().map(|file| (state.attr.uid, state.attr.gid, file.size() as i64))
        };
        if let Some((uid, gid, size)) = debit {
            self.debit_usage(uid as OwnerId, gid as OwnerId, |usage| {
                usage.change_num_bytes(-size);
            })
            .await;
        }
    }

    /// Builds the attribute record for a node under its state guard.
    pub(crate) fn stat_of(node: &Node, state: &crate::node::NodeState) -> FileStat {
        let size = match &state.body {
            NodeBody::File(file) => file.size() as u64,
            NodeBody::Symlink(target) => target.len() as u64,
            NodeBody::Dir(dir) => (dir.children.len() as u64 + 2) * 32,
        };
        FileStat {
            ino: node.ino(),
            kind: node.kind(),
            size,
            mode: state.attr.mode,
            uid: state.attr.uid,
            gid: state.attr.gid,
            nlink: node.link_count().max(1),
            mtime: state.attr.mtime,
        }
    }
}

#[async_trait]
impl Vfs for EventFs {
    async fn create(&self, path: &str, mode: u32, cred: &Credentials) -> Result<()> {
        EventFs::create(self, path, mode, cred).await
    }

    async fn mkdir(&self, path: &str, mode: u32, cred: &Credentials) -> Result<()> {
        EventFs::mkdir(self, path, mode, cred).await
    }

    async fn read(&self, path: &str, offset: u64, len: usize) -> Result<Vec<u8>> {
        EventFs::read(self, path, offset, len).await
    }

    async fn write(&self, path: &str, offset: u64, data: &[u8]) -> Result<usize> {
        EventFs::write(self, path, offset, data).await
    }

    async fn truncate(&self, path: &str, new_size: u64) -> Result<()> {
        EventFs::truncate(self, path, new_size).await
    }

    async fn unlink(&self, path: &str) -> Result<()> {
        EventFs::unlink(self, path).await
    }

    async fn rmdir(&self, path: &str) -> Result<()> {
        EventFs::rmdir(self, path).await
    }

    async fn stat(&self, path: &str) -> Result<FileStat> {
        EventFs::stat(self, path).await
    }

    async fn readdir(&self, path: &str) -> Result<Vec<DirEntry>> {
        EventFs::readdir(self, path).await
    }

    async fn readlink(&self, path: &str) -> Result<String> {
        EventFs::readlink(self, path).await
    }

    async fn link(&self, path: &str, new_path: &str) -> Result<()> {
        EventFs::link(self, path, new_path).await
    }

    async fn rename(&self, path: &str, new_path: &str) -> Result<()> {
        EventFs::rename(self, path, new_path).await
    }

    async fn set_xattr(&self, path: &str, name: &str, value: &[u8]) -> Result<()> {
        EventFs::set_xattr(self, path, name, value).await
    }

    async fn get_xattr(&self, path: &str, name: &str) -> Result<Vec<u8>> {
        EventFs::get_xattr(self, path, name).await
    }
}
