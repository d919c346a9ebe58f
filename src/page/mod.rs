//! page — read-only views over pages of the store file.
//!
//! Раскладка:
//! - common.rs   — заголовок страницы, `page_at`, типизация (branch/leaf/meta/freelist)
//! - elem.rs     — branch/leaf элементы с проверкой границ
//! - freelist.rs — разбор free-list страницы
//!
//! Все аксессоры проверяют границы и возвращают Err вместо паники:
//! проверяемый файл может быть повреждён как угодно.

pub mod common;
pub mod elem;
pub mod freelist;

pub use common::{page_at, write_page_header, Page};
pub use elem::{BranchElem, LeafElem};
