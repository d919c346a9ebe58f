use anyhow::Result;
use log::debug;
use std::path::{Path, PathBuf};

use boltcheck::cli::{
    CheckOrchestrator, CheckOutcome, CheckScope, FileStoreOpener, JsonReporter, Reporter,
    TextReporter,
};
use boltcheck::{CheckConfig, StoreOptions};

use crate::{EXIT_CLEAN, EXIT_CORRUPT};

pub fn exec_db(path: PathBuf, json: bool) -> Result<i32> {
    exec(path, CheckScope::WholeDatabase, json)
}

pub fn exec_page(path: PathBuf, page_id: u64, json: bool) -> Result<i32> {
    // Валидация до любого обращения к файлу.
    let scope = CheckScope::single_page(page_id)?;
    exec(path, scope, json)
}

/// Run the check; corruption is an exit status, operational failure an error.
fn exec(path: PathBuf, scope: CheckScope, json: bool) -> Result<i32> {
    let cfg = CheckConfig::from_env();
    debug!("{}", cfg);
    let opener = FileStoreOpener::new(StoreOptions::from(&cfg));

    let out = std::io::stdout().lock();
    let outcome = if json {
        run(opener, JsonReporter::new(out), &path, scope)
    } else {
        run(opener, TextReporter::new(out), &path, scope)
    };

    match outcome {
        CheckOutcome::Clean => Ok(EXIT_CLEAN),
        CheckOutcome::Corrupt { .. } => Ok(EXIT_CORRUPT),
        CheckOutcome::OperationalFailure { cause } => Err(cause),
    }
}

fn run<R: Reporter>(
    opener: FileStoreOpener,
    reporter: R,
    path: &Path,
    scope: CheckScope,
) -> CheckOutcome {
    let mut orch = CheckOrchestrator::new(opener, reporter);
    orch.run(path, Some(scope))
}
