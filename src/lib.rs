// Базовые модули
pub mod config;
pub mod consts;
pub mod lock;
pub mod meta;

// Формат страниц и read-only handle
pub mod page;  // src/page/{mod,common,elem,freelist}.rs
pub mod store; // src/store/{mod,open,tx,build}.rs

// Проверка согласованности и команды поверх неё
pub mod check; // src/check/{mod,checker,error,kv,options}.rs
pub mod cli;   // src/cli/{check,report,scope}.rs

// Удобные реэкспорты
pub use check::{CheckError, CheckOptions, Checker, HexKvStringer, KvStringer, ReadableKvStringer};
pub use cli::{CheckOrchestrator, CheckOutcome, CheckScope, FileStoreOpener, ValidationError};
pub use config::CheckConfig;
pub use meta::Meta;
pub use store::{BuildSummary, Store, StoreBuilder, StoreOptions, Tx};
