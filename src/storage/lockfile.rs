//! Instance lock for the data directory
//!
//! One pipeline instance per data directory: a second consumer on the same
//! feed would double-write records and interleave the smoothing window, and
//! sled itself refuses concurrent opens.
//!
//! The lock file holds the owner's PID on the first line and its start time
//! on the second. It is created with `create_new`, so two processes racing
//! for a fresh directory cannot both win.

use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

const LOCK_FILE_NAME: &str = ".motor-sentinel.lock";

#[derive(Debug, Error)]
pub enum LockError {
    #[error(
        "another motor-sentinel instance (PID {pid}) is using this data directory; \
         stop it, or remove {} if it is no longer running",
        .path.display()
    )]
    Held { pid: u32, path: PathBuf },

    #[error("lock file I/O on {}: {}", .0.display(), .1)]
    Io(PathBuf, #[source] io::Error),
}

/// Who, if anyone, currently owns an existing lock file.
enum Holder {
    Live(u32),
    Stale,
    Unreadable,
}

/// Lock guard. The file is removed when the guard is dropped.
#[derive(Debug)]
pub struct ProcessLock {
    path: PathBuf,
}

impl ProcessLock {
    /// Take the lock for `data_dir`, creating the directory if needed.
    ///
    /// A lock left behind by a dead process, or one that cannot be parsed,
    /// is replaced.
    pub fn acquire<P: AsRef<Path>>(data_dir: P) -> Result<Self, LockError> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir).map_err(|e| LockError::Io(data_dir.to_path_buf(), e))?;
        let path = data_dir.join(LOCK_FILE_NAME);

        match inspect(&path) {
            None => {}
            Some(Holder::Live(pid)) => return Err(LockError::Held { pid, path }),
            Some(Holder::Stale) => {
                info!(path = %path.display(), "Removing stale lock from a previous run");
                remove(&path)?;
            }
            Some(Holder::Unreadable) => {
                warn!(path = %path.display(), "Lock file unreadable, replacing it");
                remove(&path)?;
            }
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                // Lost a race with another starting instance.
                io::ErrorKind::AlreadyExists => match inspect(&path) {
                    Some(Holder::Live(pid)) => LockError::Held {
                        pid,
                        path: path.clone(),
                    },
                    _ => LockError::Io(path.clone(), e),
                },
                _ => LockError::Io(path.clone(), e),
            })?;

        let pid = std::process::id();
        writeln!(file, "{}\n{}", pid, Utc::now().to_rfc3339())
            .map_err(|e| LockError::Io(path.clone(), e))?;

        debug!(pid, path = %path.display(), "Instance lock acquired");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Instance lock released"),
            Err(e) => warn!(error = %e, "Failed to remove lock file"),
        }
    }
}

fn remove(path: &Path) -> Result<(), LockError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(LockError::Io(path.to_path_buf(), e)),
    }
}

/// `None` when there is no lock file.
fn inspect(path: &Path) -> Option<Holder> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(_) => return Some(Holder::Unreadable),
    };
    let pid = contents.lines().next().and_then(|l| l.trim().parse::<u32>().ok());
    Some(match pid {
        Some(pid) if is_running_instance(pid) => Holder::Live(pid),
        Some(_) => Holder::Stale,
        None => Holder::Unreadable,
    })
}

#[cfg(target_os = "linux")]
fn is_running_instance(pid: u32) -> bool {
    if pid == std::process::id() {
        return true;
    }
    // A recycled PID belonging to some other program does not count.
    fs::read(format!("/proc/{pid}/cmdline"))
        .map(|cmdline| {
            let cmdline = String::from_utf8_lossy(&cmdline);
            cmdline.contains("motor-sentinel") || cmdline.contains("motor_sentinel")
        })
        .unwrap_or(false)
}

#[cfg(not(target_os = "linux"))]
fn is_running_instance(_pid: u32) -> bool {
    true
}
