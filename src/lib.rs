//! eventfs - a self-cleaning user-space filesystem for event queues.
//!
//! Every top-level directory is an ordered deque of files written by
//! producers and drained by consumers; two synthetic symlinks named
//! `head` and `tail` always point at the oldest and newest file. A
//! directory shares fate with the process that created it: once the
//! creator's identity fingerprint no longer checks out, the directory
//! and everything in it are reclaimed asynchronously. Per-user and
//! per-group quotas bound directories, files, files per directory,
//! and bytes.

pub mod config;
mod deferred;
pub mod fs;
pub mod inode;
pub mod node;
pub mod proc;
pub mod quota;
pub mod wq;

pub use fs::{Credentials, DirEntry, Error, EventFs, FileStat, OpenHandle, Result, Vfs};
