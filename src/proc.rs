//! Process identity snapshots and revalidation.
//!
//! A directory shares fate with the process that created it. At mkdir
//! time the engine captures a fingerprint of the creator --- pid, start
//! time, executable path and the executable's inode/size/mtime --- and
//! later re-reads the live state to decide whether the directory is
//! still backed by the same process. Which fields must still match is
//! selected by a [`VerifyDiscipline`] bit set.

use std::fmt;
use std::fs;
use std::io;
use std::ops::BitOr;
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;

/// Kernel process identifier.
pub type Pid = libc::pid_t;

const DELETED_SUFFIX: &str = " (deleted)";

/// Field 22 of `/proc/<pid>/stat`, counted from the process state
/// (field 3) onwards.
const STARTTIME_FIELD: usize = 19;

/// Bit set selecting which fingerprint fields [`ProcSnapshot::revalidate`]
/// compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyDiscipline(u32);

impl VerifyDiscipline {
    pub const INODE: Self = Self(0x1);
    pub const MTIME: Self = Self(0x2);
    pub const SIZE: Self = Self(0x4);
    pub const PATH: Self = Self(0x8);
    pub const STARTTIME: Self = Self(0x10);

    /// Everything except the executable path, which is opt-in.
    pub const DEFAULT: Self = Self(0x1 | 0x2 | 0x4 | 0x10);
    pub const ALL: Self = Self(0x1f);

    pub fn contains(self, bits: Self) -> bool {
        self.0 & bits.0 == bits.0
    }
}

impl BitOr for VerifyDiscipline {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// `stat` of the process executable at snapshot time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ExeStat {
    ino: u64,
    size: u64,
    mtime_sec: i64,
    mtime_nsec: i64,
}

/// Fingerprint of a process at a point in time.
#[derive(Debug, Clone)]
pub struct ProcSnapshot {
    pid: Pid,
    running: bool,
    starttime: u64,
    exe_path: PathBuf,
    exe_deleted: bool,
    exe: Option<ExeStat>,
}

impl ProcSnapshot {
    /// Captures the current state of `pid` from `/proc`.
    ///
    /// A pid with no `/proc` entry yields a snapshot with
    /// `running == false`; only genuine I/O trouble reading `/proc`
    /// is an error.
    pub fn capture(pid: Pid) -> io::Result<Self> {
        let stat = match fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => stat,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(Self {
                    pid,
                    running: false,
                    starttime: 0,
                    exe_path: PathBuf::new(),
                    exe_deleted: false,
                    exe: None,
                });
            }
            Err(err) => return Err(err),
        };

        let (state, starttime) = parse_stat(&stat)?;
        let running = !matches!(state, 'Z' | 'X' | 'x');

        let (exe_path, exe_deleted) = match fs::read_link(format!("/proc/{pid}/exe")) {
            Ok(target) => {
                let raw = target.to_string_lossy().into_owned();
                match raw.strip_suffix(DELETED_SUFFIX) {
                    Some(live) => (PathBuf::from(live), true),
                    None => (target, false),
                }
            }
            // Kernel threads and foreign processes have no readable exe.
            Err(_) => (PathBuf::new(), false),
        };

        let exe = if exe_path.as_os_str().is_empty() || exe_deleted {
            None
        } else {
            fs::metadata(&exe_path)
                .map(|meta| ExeStat {
                    ino: meta.ino(),
                    size: meta.size(),
                    mtime_sec: meta.mtime(),
                    mtime_nsec: meta.mtime_nsec(),
                })
                .ok()
        };

        Ok(Self { pid, running, starttime, exe_path, exe_deleted, exe })
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Re-reads the live process state and reports whether this
    /// snapshot still describes it.
    ///
    /// `Ok(false)` means stale: the process exited, the pid was reused
    /// (start time differs), or an enabled discipline field no longer
    /// matches. `Err` means the probe itself failed; callers treat
    /// that as "still valid" and try again later.
    pub fn revalidate(&self, discipline: VerifyDiscipline) -> io::Result<bool> {
        let current = Self::capture(self.pid)?;

        if !current.running {
            tracing::debug!(pid = self.pid, "process is not running");
            return Ok(false);
        }

        if discipline.contains(VerifyDiscipline::STARTTIME) && current.starttime != self.starttime {
            tracing::debug!(
                pid = self.pid,
                was = self.starttime,
                now = current.starttime,
                "start time mismatch"
            );
            return Ok(false);
        }

        if discipline.contains(VerifyDiscipline::INODE)
            && (current.exe_deleted || field_differs(self, &current, |e| e.ino))
        {
            tracing::debug!(pid = self.pid, "executable inode mismatch");
            return Ok(false);
        }

        if discipline.contains(VerifyDiscipline::SIZE)
            && (current.exe_deleted || field_differs(self, &current, |e| e.size))
        {
            tracing::debug!(pid = self.pid, "executable size mismatch");
            return Ok(false);
        }

        if discipline.contains(VerifyDiscipline::MTIME)
            && (current.exe_deleted
                || field_differs(self, &current, |e| (e.mtime_sec, e.mtime_nsec)))
        {
            tracing::debug!(pid = self.pid, "executable mtime mismatch");
            return Ok(false);
        }

        if discipline.contains(VerifyDiscipline::PATH)
            && (current.exe_deleted || self.exe_path != current.exe_path)
        {
            tracing::debug!(pid = self.pid, "executable path mismatch");
            return Ok(false);
        }

        Ok(true)
    }
}

impl fmt::Display for ProcSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid {} ({})", self.pid, self.exe_path.display())
    }
}

fn field_differs<T: PartialEq>(
    old: &ProcSnapshot,
    new: &ProcSnapshot,
    field: impl Fn(&ExeStat) -> T,
) -> bool {
    match (&old.exe, &new.exe) {
        (Some(a), Some(b)) => field(a) != field(b),
        (None, None) => false,
        _ => true,
    }
}

/// Pulls the process state character and start time out of a
/// `/proc/<pid>/stat` line. The command name may itself contain
/// spaces and parentheses, so fields are counted from the last `)`.
fn parse_stat(stat: &str) -> io::Result<(char, u64)> {
    let bad = || io::Error::new(io::ErrorKind::InvalidData, "malformed /proc stat line");

    let tail = stat.rfind(')').map(|pos| &stat[pos + 1..]).ok_or_else(bad)?;
    let mut fields = tail.split_whitespace();

    let state = fields.next().and_then(|s| s.chars().next()).ok_or_else(bad)?;
    let starttime = fields.nth(STARTTIME_FIELD - 1).ok_or_else(bad)?;
    let starttime = starttime.parse::<u64>().map_err(|_| bad())?;

    Ok((state, starttime))
}
