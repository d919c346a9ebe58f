//! store — read-only handle над файлом хранилища.
//!
//! Разделение по подмодулям:
//! - open.rs  — открытие (shared lock, mmap/RAM, выбор meta, preload free-list)
//! - tx.rs    — read-only транзакция (снимок meta) и вход в проверку
//! - build.rs — запись свежего согласованного файла (фикстуры, начальная раскладка)
//!
//! Handle держит lock и отображение до Drop/close(); запись в файл не выполняется никогда.

pub mod build;
pub mod open;
pub mod tx;

use anyhow::{Context, Result};
use log::debug;
use memmap2::Mmap;
use std::cell::OnceCell;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::consts::{Pgid, PGID_NO_FREELIST};
use crate::lock::LockGuard;
use crate::meta::Meta;
use crate::page::page_at;

pub use build::{BuildSummary, StoreBuilder};
pub use open::StoreOptions;
pub use tx::Tx;

/// Образ файла: mmap или копия в RAM.
pub(crate) enum Backing {
    Mmap(Mmap),
    Ram(Vec<u8>),
}

impl Backing {
    #[inline]
    pub(crate) fn bytes(&self) -> &[u8] {
        match self {
            Backing::Mmap(m) => &m[..],
            Backing::Ram(v) => v.as_slice(),
        }
    }
}

/// Open, read-only store. Fields drop in order: mapping, lock, file.
pub struct Store {
    path: PathBuf,
    meta: Meta,
    data: Backing,
    freelist: OnceCell<Vec<Pgid>>,
    _lock: LockGuard,
    _file: File,
}

impl Store {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Meta chosen at open time (valid, highest txid).
    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn page_size(&self) -> u32 {
        self.meta.page_size
    }

    /// Whether the free-list ids are already materialized in memory.
    pub fn freelist_loaded(&self) -> bool {
        self.freelist.get().is_some()
    }

    #[inline]
    pub(crate) fn data(&self) -> &[u8] {
        self.data.bytes()
    }

    /// Free page ids, loaded on first use unless preloaded at open.
    pub(crate) fn freelist_ids(&self) -> Result<&[Pgid]> {
        if let Some(ids) = self.freelist.get() {
            return Ok(ids.as_slice());
        }
        let ids = load_freelist(self.data(), &self.meta)
            .with_context(|| format!("load freelist of {}", self.path.display()))?;
        debug!("freelist loaded: {} free pages", ids.len());
        Ok(self.freelist.get_or_init(|| ids).as_slice())
    }

    /// Run `f` inside a read-only transaction; the transaction ends when `f` returns.
    pub fn view<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Tx<'_>) -> Result<R>,
    {
        let tx = Tx::begin(self);
        let res = f(&tx);
        tx.rollback();
        res
    }

    /// Явное закрытие: отпускает отображение и lock (то же, что Drop).
    pub fn close(self) {
        debug!("close store {}", self.path.display());
    }
}

fn load_freelist(data: &[u8], meta: &Meta) -> Result<Vec<Pgid>> {
    if meta.freelist == PGID_NO_FREELIST {
        return Ok(Vec::new());
    }
    let page = page_at(data, meta.freelist, meta.page_size)
        .with_context(|| format!("read freelist page {}", meta.freelist))?;
    page.freelist_ids()
}
