// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-process lock files.
//!
//! A lock is a file containing the holder's PID. It is taken by writing a
//! private temp file and hard-linking it to the lock path, which fails
//! atomically if the lock already exists. Locks whose holder is no longer
//! running are removed and retaken.

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors from lock operations
#[derive(Debug, Error)]
pub enum LockError {
    #[error("timed out after {}s waiting for lock {} held by pid {holder}", .waited.as_secs(), .path.display())]
    Timeout {
        path: PathBuf,
        holder: i32,
        waited: Duration,
    },
    #[error("lock io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> LockError + '_ {
    move |source| LockError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Outcome of one acquisition attempt.
#[derive(Debug, PartialEq, Eq)]
enum Attempt {
    Acquired,
    Busy(i32),
    /// Previous holder is gone; the lock file was removed.
    Stale,
}

/// A named lock in a lock directory.
#[derive(Debug, Clone)]
pub struct FileLock {
    path: PathBuf,
    poll: Duration,
    timeout: Duration,
}

impl FileLock {
    /// Lock `{dir}/{key}.lock`. Path separators in `key` are flattened.
    pub fn new(dir: &Path, key: &str) -> Self {
        let file = format!("{}.lock", key.replace(['/', '\\'], "_"));
        Self {
            path: dir.join(file),
            poll: crate::env::lock_poll_interval(),
            timeout: crate::env::lock_timeout(),
        }
    }

    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait until the lock is ours, or the timeout passes.
    pub async fn acquire(&self) -> Result<LockGuard, LockError> {
        let start = Instant::now();
        let mut logged = false;
        loop {
            match self.try_acquire()? {
                Attempt::Acquired => {
                    tracing::debug!(path = %self.path.display(), "lock acquired");
                    return Ok(LockGuard {
                        path: self.path.clone(),
                        pid: std::process::id(),
                        held: true,
                    });
                }
                Attempt::Stale => continue,
                Attempt::Busy(holder) => {
                    let waited = start.elapsed();
                    if waited >= self.timeout {
                        return Err(LockError::Timeout {
                            path: self.path.clone(),
                            holder,
                            waited,
                        });
                    }
                    if !logged {
                        tracing::info!(path = %self.path.display(), holder, "waiting for lock");
                        logged = true;
                    }
                    let remaining = self.timeout - waited;
                    tokio::time::sleep(self.poll.min(remaining)).await;
                }
            }
        }
    }

    fn try_acquire(&self) -> Result<Attempt, LockError> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(io_err(dir))?;

        let pid = std::process::id();
        let tmp = dir.join(format!(
            ".{}.{}.{}",
            self.path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            pid,
            uuid::Uuid::new_v4().simple()
        ));
        std::fs::write(&tmp, pid.to_string()).map_err(io_err(&tmp))?;
        let linked = std::fs::hard_link(&tmp, &self.path);
        let _ = std::fs::remove_file(&tmp);

        match linked {
            Ok(()) => Ok(Attempt::Acquired),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => self.inspect_holder(),
            Err(e) => Err(io_err(&self.path)(e)),
        }
    }

    /// Decide whether an existing lock file is live or stale.
    fn inspect_holder(&self) -> Result<Attempt, LockError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            // Released between our link and read
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Attempt::Stale),
            Err(e) => return Err(io_err(&self.path)(e)),
        };

        let Ok(holder) = content.trim().parse::<i32>() else {
            tracing::warn!(path = %self.path.display(), "removing unreadable lock file");
            self.remove_if_unchanged(&content)?;
            return Ok(Attempt::Stale);
        };

        if holder <= 0 {
            self.remove_if_unchanged(&content)?;
            return Ok(Attempt::Stale);
        }

        match kill(Pid::from_raw(holder), None) {
            Ok(()) => Ok(Attempt::Busy(holder)),
            // Alive but owned by another user
            Err(Errno::EPERM) => Ok(Attempt::Busy(holder)),
            Err(Errno::ESRCH) => {
                tracing::warn!(path = %self.path.display(), holder, "removing stale lock");
                self.remove_if_unchanged(&content)?;
                Ok(Attempt::Stale)
            }
            Err(errno) => {
                tracing::warn!(path = %self.path.display(), holder, %errno, "cannot probe lock holder");
                Ok(Attempt::Busy(holder))
            }
        }
    }

    fn remove_if_unchanged(&self, seen: &str) -> Result<(), LockError> {
        match std::fs::read_to_string(&self.path) {
            Ok(now) if now == seen => match std::fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(io_err(&self.path)(e)),
            },
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&self.path)(e)),
        }
    }
}

/// Held lock; released on drop.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    pid: u32,
    held: bool,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release now, reporting failures.
    pub fn release(mut self) -> Result<(), LockError> {
        self.held = false;
        release_file(&self.path, self.pid)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.held {
            if let Err(e) = release_file(&self.path, self.pid) {
                tracing::warn!(error = %e, "failed to release lock");
            }
        }
    }
}

/// Remove the lock file if it still records `pid`.
fn release_file(path: &Path, pid: u32) -> Result<(), LockError> {
    match std::fs::read_to_string(path) {
        Ok(content) if content.trim() == pid.to_string() => {
            std::fs::remove_file(path).map_err(io_err(path))?;
            tracing::debug!(path = %path.display(), "lock released");
            Ok(())
        }
        Ok(content) => {
            tracing::warn!(
                path = %path.display(),
                holder = content.trim(),
                "lock taken over by another process, not removing"
            );
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(path)(e)),
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
