//! File and directory inode state, and the deque engine.
//!
//! A directory is an ordered deque of files. Its two anchor symlinks,
//! `head` and `tail`, always name the oldest and newest file; they
//! appear with the first file, are retargeted in place as the ends
//! move, and vanish when the directory empties. Every mutation here
//! runs under the owning directory entry's write lock, which is the
//! single serialising authority for both the deque and the anchors.

pub mod deque;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use crate::fs::{Error, Result};
use crate::node::{self, InoAllocator, Node, NodeAttr, NodeBody, HEAD_NAME, TAIL_NAME};
use crate::proc::{Pid, ProcSnapshot, VerifyDiscipline};

use deque::Deque;

const ANCHOR_MODE: u32 = 0o777;

/// In-RAM contents of one event file.
pub struct FileInode {
    name: String,
    contents: Vec<u8>,
    size: usize,
}

impl FileInode {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_owned(), contents: Vec::new(), size: 0 }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.contents.len()
    }

    /// Copies out at most `buflen` bytes starting at `offset`. Empty
    /// at and beyond end of file.
    pub fn read(&self, offset: u64, buflen: usize) -> Vec<u8> {
        let offset = offset as usize;
        if offset >= self.size {
            return Vec::new();
        }
        let end = self.size.min(offset + buflen);
        self.contents[offset..end].to_vec()
    }

    /// Grows the buffer by doubling until `offset + len` fits, with
    /// the fresh region zeroed before the write lands.
    fn reserve(&mut self, wanted: usize) {
        let mut new_len = self.contents.len().max(1);
        while wanted > new_len {
            new_len *= 2;
        }
        if new_len > self.contents.len() {
            self.contents.resize(new_len, 0);
        }
    }

    /// Places `data` at `offset`, extending the file as needed.
    /// Returns the number of bytes written.
    pub fn write(&mut self, offset: u64, data: &[u8]) -> usize {
        let offset = offset as usize;
        self.reserve(offset + data.len());
        self.contents[offset..offset + data.len()].copy_from_slice(data);
        self.size = self.size.max(offset + data.len());
        data.len()
    }

    /// Sets the logical size. Extension zero-fills under the doubling
    /// policy; shrinking zeroes the abandoned tail but never releases
    /// memory.
    pub fn truncate(&mut self, new_size: u64) {
        let new_size = new_size as usize;
        if new_size >= self.contents.len() {
            self.reserve(new_size);
        } else {
            self.contents[new_size..].fill(0);
        }
        self.size = new_size;
    }
}

/// A file removed from a directory by one of the pop operations,
/// reported back so the caller can settle the usage accounting.
#[derive(Debug)]
pub struct DetachedFile {
    pub name: String,
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
    /// False when an open handle kept the inode alive; the final
    /// release settles the byte accounting instead.
    pub destroyed: bool,
}

/// Deque-engine state of one directory.
pub struct DirInode {
    snapshot: ProcSnapshot,
    discipline: VerifyDiscipline,
    deleted: bool,
    queue: Deque,
    anchor_head: Option<Arc<Node>>,
    anchor_tail: Option<Arc<Node>>,
}

impl DirInode {
    /// Snapshots the creating process and starts out empty.
    pub fn new(pid: Pid, discipline: VerifyDiscipline) -> io::Result<Self> {
        Ok(Self {
            snapshot: ProcSnapshot::capture(pid)?,
            discipline,
            deleted: false,
            queue: Deque::new(),
            anchor_head: None,
            anchor_tail: None,
        })
    }

    pub fn snapshot(&self) -> &ProcSnapshot {
        &self.snapshot
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Marks the directory reclaimed-in-progress; every later
    /// operation on it misses.
    pub fn set_deleted(&mut self) {
        self.deleted = true;
    }

    pub fn queue(&self) -> &Deque {
        &self.queue
    }

    /// Both anchors absent, no files queued.
    pub fn is_empty(&self) -> bool {
        self.anchor_head.is_none() && self.anchor_tail.is_none()
    }

    pub fn is_anchor_head(&self, node: &Arc<Node>) -> bool {
        self.anchor_head.as_ref().is_some_and(|a| Arc::ptr_eq(a, node))
    }

    pub fn is_anchor_tail(&self, node: &Arc<Node>) -> bool {
        self.anchor_tail.as_ref().is_some_and(|a| Arc::ptr_eq(a, node))
    }

    /// Asks whether the creating process still matches the snapshot
    /// under this directory's verify discipline.
    pub fn is_valid(&self) -> io::Result<bool> {
        self.snapshot.revalidate(self.discipline)
    }

    /// Attaches `name` at the tail of the deque. The first file also
    /// materialises both anchor symlinks.
    pub async fn append(
        &mut self,
        children: &mut BTreeMap<String, Arc<Node>>,
        alloc: &InoAllocator,
        owner: (u32, u32),
        name: &str,
    ) -> Result<()> {
        if self.deleted {
            return Err(Error::NotFound);
        }

        if self.queue.is_empty() {
            let head = new_anchor(alloc, owner, name);
            let tail = new_anchor(alloc, owner, name);

            node::attach(children, HEAD_NAME, &head);
            node::attach(children, TAIL_NAME, &tail);
            self.anchor_head = Some(head);
            self.anchor_tail = Some(tail);

            self.queue.push_back(name.to_owned());
            return Ok(());
        }

        self.queue.push_back(name.to_owned());
        self.retarget_tail(name.to_owned()).await
    }

    /// Removes a file wherever it sits in the deque, retargeting the
    /// anchors when an end moves and emptying the directory when the
    /// last file leaves. The caller detaches the entry itself.
    pub async fn remove(
        &mut self,
        children: &mut BTreeMap<String, Arc<Node>>,
        name: &str,
    ) -> Result<()> {
        if self.deleted {
            return Err(Error::NotFound);
        }

        let id = self.queue.find(name).ok_or(Error::NotFound)?;

        if self.queue.len() == 1 {
            self.queue.remove(id);
            self.make_empty(children);
            return Ok(());
        }

        let (prev, next) = self.queue.neighbours(id);
        let prev = prev.map(str::to_owned);
        let next = next.map(str::to_owned);
        match (prev, next) {
            (None, Some(new_head)) => self.retarget_head(new_head).await?,
            (Some(new_tail), None) => self.retarget_tail(new_tail).await?,
            _ => {}
        }

        self.queue.remove(id);
        Ok(())
    }

    /// Unlink of the `head` anchor: drop the anchor, detach the file
    /// it named, then regenerate the anchor against the next-oldest
    /// file (or empty the directory).
    ///
    /// The anchor entry itself has already been detached by the
    /// caller. Returns the popped file, or `None` if the deque was
    /// already empty.
    pub async fn pop_head(
        &mut self,
        children: &mut BTreeMap<String, Arc<Node>>,
        alloc: &InoAllocator,
        owner: (u32, u32),
    ) -> Result<Option<DetachedFile>> {
        if self.deleted {
            return Err(Error::NotFound);
        }
        self.anchor_head = None;

        let Some(target) = self.queue.head_name().map(str::to_owned) else {
            return Ok(None);
        };

        let detached = detach_file(children, &target).await?;
        self.queue.pop_front();

        if self.queue.is_empty() {
            self.make_empty(children);
        } else if let Some(new_target) = self.queue.head_name().map(str::to_owned) {
            let anchor = new_anchor(alloc, owner, &new_target);
            node::attach(children, HEAD_NAME, &anchor);
            self.anchor_head = Some(anchor);
        }

        Ok(Some(detached))
    }

    /// Unlink of the `tail` anchor; mirror image of
    /// [`DirInode::pop_head`].
    pub async fn pop_tail(
        &mut self,
        children: &mut BTreeMap<String, Arc<Node>>,
        alloc: &InoAllocator,
        owner: (u32, u32),
    ) -> Result<Option<DetachedFile>> {
        if self.deleted {
            return Err(Error::NotFound);
        }
        self.anchor_tail = None;

        let Some(target) = self.queue.tail_name().map(str::to_owned) else {
            return Ok(None);
        };

        let detached = detach_file(children, &target).await?;
        self.queue.pop_back();

        if self.queue.is_empty() {
            self.make_empty(children);
        } else if let Some(new_target) = self.queue.tail_name().map(str::to_owned) {
            let anchor = new_anchor(alloc, owner, &new_target);
            node::attach(children, TAIL_NAME, &anchor);
            self.anchor_tail = Some(anchor);
        }

        Ok(Some(detached))
    }

    /// Swaps the `head` anchor's target string in place.
    pub async fn retarget_head(&self, target: String) -> Result<()> {
        if self.deleted {
            return Err(Error::NotFound);
        }
        let anchor = self.anchor_head.as_ref().ok_or(Error::NotFound)?;
        retarget(anchor, target).await
    }

    /// Swaps the `tail` anchor's target string in place.
    pub async fn retarget_tail(&self, target: String) -> Result<()> {
        if self.deleted {
            return Err(Error::NotFound);
        }
        let anchor = self.anchor_tail.as_ref().ok_or(Error::NotFound)?;
        retarget(anchor, target).await
    }

    /// Make-empty protocol: both anchors leave the namespace. An
    /// anchor that is still held open elsewhere keeps its inode; this
    /// directory only drops its reference.
    pub fn make_empty(&mut self, children: &mut BTreeMap<String, Arc<Node>>) {
        for (anchor, name) in
            [(self.anchor_head.take(), HEAD_NAME), (self.anchor_tail.take(), TAIL_NAME)]
        {
            let Some(anchor) = anchor else { continue };
            if anchor.is_dead() {
                continue;
            }
            node::detach(children, name);
            anchor.try_destroy();
        }
    }

    /// Tears the directory down for reclamation: the deque forgets
    /// its order and both anchor references drop.
    pub fn clear(&mut self) {
        self.queue = Deque::new();
        self.anchor_head = None;
        self.anchor_tail = None;
    }
}

fn new_anchor(alloc: &InoAllocator, owner: (u32, u32), target: &str) -> Arc<Node> {
    Node::new_symlink(
        alloc.allocate(),
        NodeAttr::new(ANCHOR_MODE, owner.0, owner.1),
        target.to_owned(),
    )
}

async fn retarget(anchor: &Arc<Node>, target: String) -> Result<()> {
    let mut guard = anchor.state.write().await;
    let state = &mut *guard;
    match &mut state.body {
        NodeBody::Symlink(old) => {
            *old = target;
            state.attr.touch();
            Ok(())
        }
        _ => Err(Error::Io),
    }
}

/// Detaches the named file from the namespace and reports its
/// accounting payload.
async fn detach_file(
    children: &mut BTreeMap<String, Arc<Node>>,
    name: &str,
) -> Result<DetachedFile> {
    let node = children.get(name).cloned().ok_or(Error::NotFound)?;

    let (size, uid, gid) = {
        let state = node.state.read().await;
        let file = state.file().ok_or(Error::Io)?;
        (file.size() as u64, state.attr.uid, state.attr.gid)
    };

    node::detach(children, name);
    let destroyed = node.try_destroy();

    Ok(DetachedFile { name: name.to_owned(), size, uid, gid, destroyed })
}
