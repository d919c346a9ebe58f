//! Advisory locking on the store file itself (fs2).
//!
//! - Shared: read-only openers (the checker). Many may coexist.
//! - Exclusive: the fixture writer while it lays the file out.
//!
//! A zero timeout fails immediately when the file is locked in a
//! conflicting mode; otherwise the lock is polled until the deadline.
//! Lock is released on Drop.

use anyhow::{anyhow, Context, Result};
use fs2::FileExt;
use log::debug;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const LOCK_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

pub struct LockGuard {
    file: File,
    path: PathBuf,
    mode: LockMode,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        // ошибки unlock при Drop игнорируются
        let _ = FileExt::unlock(&self.file);
    }
}

fn try_lock(file: &File, mode: LockMode) -> std::io::Result<()> {
    match mode {
        LockMode::Shared => FileExt::try_lock_shared(file),
        LockMode::Exclusive => FileExt::try_lock_exclusive(file),
    }
}

/// Lock `file` (opened from `path`) in `mode`, waiting at most `timeout`.
pub fn lock_file(file: &File, path: &Path, mode: LockMode, timeout: Duration) -> Result<LockGuard> {
    // отдельный дескриптор: guard живёт независимо от владельца `file`
    let handle = file
        .try_clone()
        .with_context(|| format!("dup handle of {}", path.display()))?;
    let deadline = Instant::now() + timeout;
    loop {
        match try_lock(&handle, mode) {
            Ok(()) => {
                debug!("lock {:?} acquired on {}", mode, path.display());
                return Ok(LockGuard {
                    file: handle,
                    path: path.to_path_buf(),
                    mode,
                });
            }
            Err(e) => {
                if Instant::now() >= deadline {
                    return Err(anyhow!(
                        "database file {} is locked ({:?} lock unavailable: {})",
                        path.display(),
                        mode,
                        e
                    ));
                }
                std::thread::sleep(LOCK_POLL);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;

    fn temp_file(tag: &str) -> PathBuf {
        let t = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("boltcheck-lock-{}-{}-{}", tag, std::process::id(), t))
    }

    #[test]
    fn shared_locks_coexist_exclusive_conflicts() {
        let path = temp_file("rw");
        let f1 = OpenOptions::new().create(true).write(true).open(&path).unwrap();
        let f2 = OpenOptions::new().read(true).open(&path).unwrap();
        let f3 = OpenOptions::new().read(true).open(&path).unwrap();

        let g1 = lock_file(&f1, &path, LockMode::Shared, Duration::ZERO).unwrap();
        let g2 = lock_file(&f2, &path, LockMode::Shared, Duration::ZERO).unwrap();
        assert_eq!(g2.mode(), LockMode::Shared);
        assert!(lock_file(&f3, &path, LockMode::Exclusive, Duration::ZERO).is_err());

        drop(g1);
        drop(g2);
        let g3 = lock_file(&f3, &path, LockMode::Exclusive, Duration::ZERO).unwrap();
        assert_eq!(g3.path(), path.as_path());
        drop(g3);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn shared_lock_waits_for_exclusive_holder() {
        let path = temp_file("wait");
        let f1 = OpenOptions::new().create(true).write(true).open(&path).unwrap();
        let f2 = OpenOptions::new().read(true).open(&path).unwrap();

        let g1 = lock_file(&f1, &path, LockMode::Exclusive, Duration::ZERO).unwrap();
        let err = lock_file(&f2, &path, LockMode::Shared, Duration::from_millis(60))
            .err()
            .unwrap();
        assert!(err.to_string().contains("is locked"), "{}", err);

        let holder = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            drop(g1);
        });
        let g2 = lock_file(&f2, &path, LockMode::Shared, Duration::from_secs(5)).unwrap();
        assert_eq!(g2.mode(), LockMode::Shared);
        holder.join().unwrap();
        drop(g2);
        let _ = std::fs::remove_file(&path);
    }
}
