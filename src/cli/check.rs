//! cli/check — оркестрация `check db` / `check page`.
//!
//! Порядок:
//! 1) валидация режима (без I/O);
//! 2) предусловие на путь (существует, stat проходит);
//! 3) открытие read-only с preload free-list; без ретраев;
//! 4) read-only транзакция, Check(options) → ленивая последовательность;
//! 5) каждая находка сразу уходит в Reporter, считается только счётчик;
//! 6) итог: `N errors found` → Corrupt{N}, иначе `OK` → Clean.
//!
//! Store и транзакция освобождаются на любом пути выхода (RAII).

use anyhow::{anyhow, Error, Result};
use log::{debug, info};
use std::path::Path;

use super::report::Reporter;
use super::scope::CheckScope;
use crate::check::{CheckError, CheckOptions, ReadableKvStringer};
use crate::store::{Store, StoreOptions};

/// Terminal result of one invocation.
#[derive(Debug)]
pub enum CheckOutcome {
    /// The check ran to completion and found nothing.
    Clean,
    /// The check ran to completion and reported `count` findings.
    Corrupt { count: u64 },
    /// The store could not be opened or the check could not run.
    OperationalFailure { cause: Error },
}

impl CheckOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, CheckOutcome::Clean)
    }
}

/// A store that can run `Check` inside a read-only transaction.
pub trait CheckStore {
    /// Run `f` over the lazy error sequence inside one read transaction.
    fn check_view<R, F>(&self, opts: CheckOptions, f: F) -> Result<R>
    where
        F: FnOnce(&mut dyn Iterator<Item = CheckError>) -> Result<R>;
}

impl CheckStore for Store {
    fn check_view<R, F>(&self, opts: CheckOptions, f: F) -> Result<R>
    where
        F: FnOnce(&mut dyn Iterator<Item = CheckError>) -> Result<R>,
    {
        self.view(|tx| {
            let mut errors = tx.check(opts)?;
            f(&mut errors)
        })
    }
}

/// Path precondition and read-only open, kept behind a seam so the
/// orchestrator can be driven without real files.
pub trait StoreOpener {
    type Store: CheckStore;

    fn check_path(&self, path: &Path) -> Result<()>;
    fn open_ro(&self, path: &Path) -> Result<Self::Store>;
}

/// Opens real store files.
#[derive(Debug, Clone, Default)]
pub struct FileStoreOpener {
    pub options: StoreOptions,
}

impl FileStoreOpener {
    pub fn new(options: StoreOptions) -> Self {
        Self { options }
    }
}

impl StoreOpener for FileStoreOpener {
    type Store = Store;

    fn check_path(&self, path: &Path) -> Result<()> {
        check_source_db_path(path).map(|_| ())
    }

    fn open_ro(&self, path: &Path) -> Result<Store> {
        Store::open_ro(path, &self.options)
    }
}

/// The source file must exist and be stat-able.
pub fn check_source_db_path(path: &Path) -> Result<std::fs::Metadata> {
    match std::fs::metadata(path) {
        Ok(md) => Ok(md),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(anyhow!(
            "source database file {:?} doesn't exist",
            path.display().to_string()
        )),
        Err(e) => Err(anyhow!(
            "failed to open source database file {:?}: {}",
            path.display().to_string(),
            e
        )),
    }
}

pub struct CheckOrchestrator<O, R> {
    opener: O,
    reporter: R,
}

impl<O: StoreOpener, R: Reporter> CheckOrchestrator<O, R> {
    pub fn new(opener: O, reporter: R) -> Self {
        Self { opener, reporter }
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    pub fn into_reporter(self) -> R {
        self.reporter
    }

    pub fn run(&mut self, path: &Path, scope: Option<CheckScope>) -> CheckOutcome {
        match self.try_run(path, scope) {
            Ok(outcome) => outcome,
            Err(cause) => {
                debug!("check of {} failed: {:#}", path.display(), cause);
                CheckOutcome::OperationalFailure { cause }
            }
        }
    }

    fn try_run(&mut self, path: &Path, scope: Option<CheckScope>) -> Result<CheckOutcome> {
        let scope = scope.unwrap_or(CheckScope::WholeDatabase);
        scope.validate()?;

        self.opener.check_path(path)?;
        let store = self.opener.open_ro(path)?;

        let mut opts = CheckOptions::new().with_kv_stringer(ReadableKvStringer);
        if let Some(page_id) = scope.page_id() {
            opts = opts.with_page_id(page_id);
        }

        let reporter = &mut self.reporter;
        let count = store.check_view(opts, |errors| {
            let mut count = 0u64;
            for e in errors {
                reporter.emit_error(&e)?;
                count += 1;
            }
            Ok(count)
        })?;

        info!("check of {} done: {} errors", path.display(), count);
        if count > 0 {
            self.reporter.emit_summary(count)?;
            Ok(CheckOutcome::Corrupt { count })
        } else {
            self.reporter.emit_ok()?;
            Ok(CheckOutcome::Clean)
        }
    }
}
