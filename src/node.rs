//! Namespace entries and the lifetime primitives the callbacks use.
//!
//! The engine keeps one [`Node`] per live entry. A node's mutable
//! state (attributes plus the kind-specific body) sits behind a
//! per-entry [`RwLock`]; the link and open counts are atomics outside
//! it so the lifetime checks never need a state lock of their own.
//! Names are attached to and detached from a parent directory's child
//! map under the parent's write lock, and an inode is only freed once
//! nothing in the namespace or an open handle still references it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::RwLock;

use crate::inode::{DirInode, FileInode};

/// Inode number.
pub type Ino = u64;

/// Literal names of the two anchor symlinks.
pub const HEAD_NAME: &str = "head";
pub const TAIL_NAME: &str = "tail";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Dir,
    File,
    Symlink,
}

/// Mutable attributes shared by every entry kind.
#[derive(Debug, Clone)]
pub struct NodeAttr {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub mtime: SystemTime,
    pub xattrs: BTreeMap<String, Vec<u8>>,
}

impl NodeAttr {
    pub fn new(mode: u32, uid: u32, gid: u32) -> Self {
        Self { mode, uid, gid, mtime: SystemTime::now(), xattrs: BTreeMap::new() }
    }

    pub fn touch(&mut self) {
        self.mtime = SystemTime::now();
    }
}

/// Kind-specific payload of an entry.
pub enum NodeBody {
    Dir(DirState),
    File(FileInode),
    Symlink(String),
}

impl NodeBody {
    pub fn dir_mut(&mut self) -> Option<&mut DirState> {
        match self {
            NodeBody::Dir(dir) => Some(dir),
            _ => None,
        }
    }
}

/// Body of a directory entry: its namespace children plus the deque
/// engine state. The root carries no [`DirInode`].
pub struct DirState {
    pub children: BTreeMap<String, Arc<Node>>,
    pub inode: Option<DirInode>,
}

pub struct NodeState {
    pub attr: NodeAttr,
    pub body: NodeBody,
}

impl NodeState {
    pub fn dir(&self) -> Option<&DirState> {
        match &self.body {
            NodeBody::Dir(dir) => Some(dir),
            _ => None,
        }
    }

    pub fn dir_mut(&mut self) -> Option<&mut DirState> {
        match &mut self.body {
            NodeBody::Dir(dir) => Some(dir),
            _ => None,
        }
    }

    pub fn file(&self) -> Option<&FileInode> {
        match &self.body {
            NodeBody::File(file) => Some(file),
            _ => None,
        }
    }

    pub fn file_mut(&mut self) -> Option<&mut FileInode> {
        match &mut self.body {
            NodeBody::File(file) => Some(file),
            _ => None,
        }
    }
}

/// One namespace entry.
pub struct Node {
    ino: Ino,
    kind: NodeKind,
    links: AtomicU32,
    opens: AtomicU32,
    dead: AtomicBool,
    pub state: RwLock<NodeState>,
}

impl Node {
    fn new(ino: Ino, kind: NodeKind, attr: NodeAttr, body: NodeBody) -> Arc<Self> {
        Arc::new(Self {
            ino,
            kind,
            links: AtomicU32::new(0),
            opens: AtomicU32::new(0),
            dead: AtomicBool::new(false),
            state: RwLock::new(NodeState { attr, body }),
        })
    }

    pub fn new_dir(ino: Ino, attr: NodeAttr, inode: Option<DirInode>) -> Arc<Self> {
        Self::new(
            ino,
            NodeKind::Dir,
            attr,
            NodeBody::Dir(DirState { children: BTreeMap::new(), inode }),
        )
    }

    pub fn new_file(ino: Ino, attr: NodeAttr, inode: FileInode) -> Arc<Self> {
        Self::new(ino, NodeKind::File, attr, NodeBody::File(inode))
    }

    pub fn new_symlink(ino: Ino, attr: NodeAttr, target: String) -> Arc<Self> {
        Self::new(ino, NodeKind::Symlink, attr, NodeBody::Symlink(target))
    }

    pub fn ino(&self) -> Ino {
        self.ino
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    pub fn link_count(&self) -> u32 {
        self.links.load(Ordering::SeqCst)
    }

    /// Records an open handle.
    pub fn open(&self) {
        self.opens.fetch_add(1, Ordering::SeqCst);
    }

    /// Drops an open handle. Returns true when this was the last
    /// reference to an already-unlinked inode, i.e. the caller must
    /// now destroy it.
    pub fn release(&self) -> bool {
        let remaining = self.opens.fetch_sub(1, Ordering::SeqCst) - 1;
        remaining == 0 && self.link_count() == 0 && !self.is_dead()
    }

    /// Frees the inode if nothing still references it.
    ///
    /// The name must already be detached. Returns true when the node
    /// is now dead; false leaves it to the open-handle machinery (the
    /// final [`Node::release`] reports the destruction instead).
    pub fn try_destroy(&self) -> bool {
        if self.opens.load(Ordering::SeqCst) == 0 {
            self.dead.store(true, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    /// Marks the node destroyed without a liveness check. Used by the
    /// deferred worker once it owns an unlinked subtree outright.
    pub fn mark_dead(&self) {
        self.dead.store(true, Ordering::SeqCst);
    }
}

/// Monotonic inode-number allocator.
pub struct InoAllocator {
    next: AtomicU64,
}

impl InoAllocator {
    pub fn new(first: Ino) -> Self {
        Self { next: AtomicU64::new(first) }
    }

    pub fn allocate(&self) -> Ino {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

/// Adds `node` to `children` under `name`. The parent's write lock
/// must be held.
pub fn attach(children: &mut BTreeMap<String, Arc<Node>>, name: &str, node: &Arc<Node>) {
    node.links.fetch_add(1, Ordering::SeqCst);
    children.insert(name.to_owned(), Arc::clone(node));
}

/// Removes `name` from `children`. The parent's write lock must be
/// held.
pub fn detach(children: &mut BTreeMap<String, Arc<Node>>, name: &str) -> Option<Arc<Node>> {
    let node = children.remove(name)?;
    node.links.fetch_sub(1, Ordering::SeqCst);
    Some(node)
}

/// Splits a path into its components.
pub fn components(path: &str) -> Vec<&str> {
    path.split('/').filter(|c| !c.is_empty()).collect()
}

/// Number of components below the root.
pub fn depth(path: &str) -> usize {
    components(path).len()
}

/// Joins a directory path and a leaf name.
pub fn fullpath(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{}/{name}", dir.trim_end_matches('/'))
    }
}
