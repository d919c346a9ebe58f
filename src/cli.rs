//! cli — слой команд `check db` / `check page` поверх библиотеки.
//!
//! - scope.rs  — режим проверки и его валидация (до I/O)
//! - report.rs — Reporter: текст или JSONL в переданный sink
//! - check.rs  — CheckOrchestrator: open → view → check → отчёт → CheckOutcome

pub mod check;
pub mod report;
pub mod scope;

pub use check::{
    check_source_db_path, CheckOrchestrator, CheckOutcome, CheckStore, FileStoreOpener,
    StoreOpener,
};
pub use report::{JsonReporter, Reporter, TextReporter};
pub use scope::{CheckScope, PageCheckOptions, ValidationError};
