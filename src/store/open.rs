//! store/open — открытие Store только на чтение.
//!
//! Шаги:
//! 1) open(read-only) + shared lock на сам файл (с ожиданием lock_timeout);
//! 2) образ файла: mmap (по умолчанию) или чтение в RAM;
//! 3) meta 0 по смещению 0; meta 1 по смещению page_size из meta 0, а если
//!    meta 0 битая — перебором допустимых размеров страницы;
//! 4) preload free-list (если включено), чтобы проверка не подгружала его лениво.
//!
//! Ошибки открытия не ретраятся: битый формат/права/lock отдаются вызывающему.

use anyhow::{anyhow, Context, Result};
use log::{debug, info, warn};
use memmap2::MmapOptions;
use std::cell::OnceCell;
use std::fs::OpenOptions;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use crate::config::CheckConfig;
use crate::consts::{MAX_PAGE_SIZE, META_END, MIN_PAGE_SIZE};
use crate::lock::{lock_file, LockMode};
use crate::meta::{pick_meta, Meta};

use super::{Backing, Store};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreOptions {
    /// Materialize the free-list during open.
    pub preload_freelist: bool,
    /// Map the file instead of reading it into RAM.
    pub mmap: bool,
    /// Wait this long for the shared lock (zero: fail at once).
    pub lock_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            preload_freelist: true,
            mmap: true,
            lock_timeout: Duration::ZERO,
        }
    }
}

impl From<&CheckConfig> for StoreOptions {
    fn from(cfg: &CheckConfig) -> Self {
        Self {
            preload_freelist: true,
            mmap: cfg.mmap,
            lock_timeout: Duration::from_millis(cfg.lock_timeout_ms),
        }
    }
}

impl Store {
    pub fn open_ro(path: &Path, opts: &StoreOptions) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .open(path)
            .with_context(|| format!("open database file {}", path.display()))?;
        let lock = lock_file(&file, path, LockMode::Shared, opts.lock_timeout)?;

        let len = file
            .metadata()
            .with_context(|| format!("stat {}", path.display()))?
            .len();
        if len < META_END as u64 {
            return Err(anyhow!(
                "invalid database: file {} is too small ({} bytes)",
                path.display(),
                len
            ));
        }

        let data = if opts.mmap {
            // SAFETY: the mapping is read-only and the file is held under a shared
            // lock; cooperating writers take the exclusive lock before mutating it.
            let mmap = unsafe { MmapOptions::new().map(&file) }
                .map_err(|e| anyhow!("mmap {}: {}", path.display(), e))?;
            Backing::Mmap(mmap)
        } else {
            let mut buf = Vec::with_capacity(len as usize);
            (&file)
                .read_to_end(&mut buf)
                .with_context(|| format!("read {}", path.display()))?;
            Backing::Ram(buf)
        };

        let meta = read_meta(data.bytes())
            .with_context(|| format!("read meta of {}", path.display()))?;
        info!(
            "opened {} read-only: page_size={} root={} freelist={} hwm={} txid={}",
            path.display(),
            meta.page_size,
            meta.root,
            meta.freelist,
            meta.pgid,
            meta.txid
        );

        let store = Store {
            path: path.to_path_buf(),
            meta,
            data,
            freelist: OnceCell::new(),
            _lock: lock,
            _file: file,
        };

        if opts.preload_freelist {
            store.freelist_ids()?;
        }
        Ok(store)
    }
}

/// Decode meta 0 and meta 1 and pick the active one.
pub(crate) fn read_meta(data: &[u8]) -> Result<Meta> {
    let m0 = Meta::decode(data);
    let m1 = match &m0 {
        Ok(m) => decode_meta1(data, m.page_size),
        Err(e) => {
            warn!("meta 0 is invalid ({:#}); scanning for meta 1", e);
            guess_meta1(data)
        }
    };
    if let Err(e) = &m1 {
        debug!("meta 1 rejected: {:#}", e);
    }
    pick_meta(m0, m1)
}

fn decode_meta1(data: &[u8], page_size: u32) -> Result<Meta> {
    let buf = data
        .get(page_size as usize..)
        .ok_or_else(|| anyhow!("meta 1 at offset {} is beyond end of file", page_size))?;
    let m = Meta::decode(buf)?;
    if m.page_size != page_size {
        return Err(anyhow!(
            "meta 1 page_size {} does not match its offset {}",
            m.page_size,
            page_size
        ));
    }
    Ok(m)
}

fn guess_meta1(data: &[u8]) -> Result<Meta> {
    let mut ps = MIN_PAGE_SIZE;
    while ps <= MAX_PAGE_SIZE {
        if let Ok(m) = decode_meta1(data, ps) {
            debug!("meta 1 found at page_size {}", ps);
            return Ok(m);
        }
        ps *= 2;
    }
    Err(anyhow!("no valid meta 1 at any supported page size"))
}
