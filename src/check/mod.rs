//! check — проверка согласованности файла (read-only).
//!
//! - checker.rs — ленивый итератор находок (`Tx::check`)
//! - error.rs   — CheckError (одна находка)
//! - options.rs — CheckOptions (рендер ключей, ограничение по page_id)
//! - kv.rs      — KvStringer и две реализации (hex / читаемый текст)

pub mod checker;
pub mod error;
pub mod kv;
pub mod options;

pub use checker::Checker;
pub use error::CheckError;
pub use kv::{HexKvStringer, KvStringer, ReadableKvStringer};
pub use options::CheckOptions;
