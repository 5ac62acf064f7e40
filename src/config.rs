//! Configuration and quota-file loading.
//!
//! One global file names the default limits and a quotas directory;
//! each file in that directory grants a single user or group its own
//! limits. Section and key names follow the daemon's historical
//! layout: `[eventfs-config]` with `default_max_*` keys and a
//! required `quotas` path, and per-subject `[eventfs-quota]` files
//! whose subject is exactly one of `user` or `group` (a name, or an
//! id in string form).

use std::ffi::CString;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::quota::{OwnerId, QuotaEntry, QuotaTable};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/eventfs/eventfs.conf";

/// Global limits and the quota directory location.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub default_max_dirs: u64,
    pub default_max_files: u64,
    pub default_max_files_per_dir: u64,
    pub default_max_bytes: u64,
    pub quotas_dir: PathBuf,
}

/// Configuration loading failures.
#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, io::Error),
    Parse(PathBuf, toml::de::Error),
    /// Quota file names neither `user` nor `group`.
    MissingSubject(PathBuf),
    /// Quota file names both `user` and `group`.
    AmbiguousSubject(PathBuf),
    UnknownUser(PathBuf, String),
    UnknownGroup(PathBuf, String),
    /// The same user or group appears in two quota files.
    Duplicate(PathBuf, String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(path, err) => write!(f, "{}: {err}", path.display()),
            ConfigError::Parse(path, err) => write!(f, "{}: {err}", path.display()),
            ConfigError::MissingSubject(path) => {
                write!(f, "{}: quota file must name a user or a group", path.display())
            }
            ConfigError::AmbiguousSubject(path) => {
                write!(f, "{}: quota file names both a user and a group", path.display())
            }
            ConfigError::UnknownUser(path, name) => {
                write!(f, "{}: unknown user '{name}'", path.display())
            }
            ConfigError::UnknownGroup(path, name) => {
                write!(f, "{}: unknown group '{name}'", path.display())
            }
            ConfigError::Duplicate(path, name) => {
                write!(f, "{}: duplicate quota for '{name}'", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(rename = "eventfs-config")]
    config: GlobalSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GlobalSection {
    #[serde(default)]
    default_max_dirs: u64,
    #[serde(default)]
    default_max_files: u64,
    #[serde(default)]
    default_max_files_per_dir: u64,
    #[serde(default)]
    default_max_bytes: u64,
    quotas: PathBuf,
}

#[derive(Debug, Deserialize)]
struct QuotaFile {
    #[serde(rename = "eventfs-quota")]
    quota: QuotaSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct QuotaSection {
    user: Option<String>,
    group: Option<String>,
    max_dirs: Option<u64>,
    max_files: Option<u64>,
    max_files_per_dir: Option<u64>,
    max_bytes: Option<u64>,
}

/// Loads the global configuration and every per-subject quota file.
pub fn load(path: &Path) -> Result<(Config, QuotaTable, QuotaTable), ConfigError> {
    let text =
        fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
    let parsed: ConfigFile =
        toml::from_str(&text).map_err(|err| ConfigError::Parse(path.to_path_buf(), err))?;
    let global = parsed.config;

    // A relative quotas path counts from the config file's directory.
    let quotas_dir = if global.quotas.is_absolute() {
        global.quotas.clone()
    } else {
        path.parent().unwrap_or(Path::new(".")).join(&global.quotas)
    };

    let config = Config {
        default_max_dirs: global.default_max_dirs,
        default_max_files: global.default_max_files,
        default_max_files_per_dir: global.default_max_files_per_dir,
        default_max_bytes: global.default_max_bytes,
        quotas_dir: quotas_dir.clone(),
    };

    let mut user_quotas = QuotaTable::new();
    let mut group_quotas = QuotaTable::new();

    let entries =
        fs::read_dir(&quotas_dir).map_err(|err| ConfigError::Io(quotas_dir.clone(), err))?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    for quota_path in paths {
        load_quota(&quota_path, &config, &mut user_quotas, &mut group_quotas)?;
    }

    Ok((config, user_quotas, group_quotas))
}

/// Parses one quota file into the matching table.
fn load_quota(
    path: &Path,
    config: &Config,
    user_quotas: &mut QuotaTable,
    group_quotas: &mut QuotaTable,
) -> Result<(), ConfigError> {
    let text =
        fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
    let parsed: QuotaFile =
        toml::from_str(&text).map_err(|err| ConfigError::Parse(path.to_path_buf(), err))?;
    let section = parsed.quota;

    let entry = QuotaEntry {
        max_files: section.max_files.unwrap_or(config.default_max_files),
        max_dirs: section.max_dirs.unwrap_or(config.default_max_dirs),
        max_files_per_dir: section
            .max_files_per_dir
            .unwrap_or(config.default_max_files_per_dir),
        max_bytes: section.max_bytes.unwrap_or(config.default_max_bytes),
    };

    match (&section.user, &section.group) {
        (Some(_), Some(_)) => Err(ConfigError::AmbiguousSubject(path.to_path_buf())),
        (None, None) => Err(ConfigError::MissingSubject(path.to_path_buf())),
        (Some(user), None) => {
            let uid = lookup_uid(user)
                .ok_or_else(|| ConfigError::UnknownUser(path.to_path_buf(), user.clone()))?;
            if user_quotas.lookup(uid as OwnerId).is_some() {
                return Err(ConfigError::Duplicate(path.to_path_buf(), user.clone()));
            }
            user_quotas.set(uid as OwnerId, entry);
            Ok(())
        }
        (None, Some(group)) => {
            let gid = lookup_gid(group)
                .ok_or_else(|| ConfigError::UnknownGroup(path.to_path_buf(), group.clone()))?;
            if group_quotas.lookup(gid as OwnerId).is_some() {
                return Err(ConfigError::Duplicate(path.to_path_buf(), group.clone()));
            }
            group_quotas.set(gid as OwnerId, entry);
            Ok(())
        }
    }
}

fn name_buffer(kind: libc::c_int) -> Vec<u8> {
    // SAFETY: sysconf only reads configuration limits.
    let len = unsafe { libc::sysconf(kind) };
    let len = if len <= 0 { 65536 } else { len as usize };
    vec![0; len]
}

/// Resolves a user name (or numeric id in string form) to a uid.
fn lookup_uid(name: &str) -> Option<u32> {
    if let Ok(id) = name.parse::<u32>() {
        return Some(id);
    }

    let cname = CString::new(name).ok()?;
    let mut buf = name_buffer(libc::_SC_GETPW_R_SIZE_MAX);
    // SAFETY: zeroed passwd is a valid out-parameter for getpwnam_r.
    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut result: *mut libc::passwd = std::ptr::null_mut();

    // SAFETY: all pointers reference live buffers for the duration of
    // the call; the result, when set, aliases `pwd`.
    let rc = unsafe {
        libc::getpwnam_r(
            cname.as_ptr(),
            &mut pwd,
            buf.as_mut_ptr() as *mut libc::c_char,
            buf.len(),
            &mut result,
        )
    };
    if rc == 0 && !result.is_null() {
        Some(pwd.pw_uid)
    } else {
        None
    }
}

/// Resolves a group name (or numeric id in string form) to a gid.
fn lookup_gid(name: &str) -> Option<u32> {
    if let Ok(id) = name.parse::<u32>() {
        return Some(id);
    }

    let cname = CString::new(name).ok()?;
    let mut buf = name_buffer(libc::_SC_GETGR_R_SIZE_MAX);
    // SAFETY: zeroed group is a valid out-parameter for getgrnam_r.
    let mut grp: libc::group = unsafe { std::mem::zeroed() };
    let mut result: *mut libc::group = std::ptr::null_mut();

    // SAFETY: all pointers reference live buffers for the duration of
    // the call; the result, when set, aliases `grp`.
    let rc = unsafe {
        libc::getgrnam_r(
            cname.as_ptr(),
            &mut grp,
            buf.as_mut_ptr() as *mut libc::c_char,
            buf.len(),
            &mut result,
        )
    };
    if rc == 0 && !result.is_null() {
        Some(grp.gr_gid)
    } else {
        None
    }
}
