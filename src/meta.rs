// src/meta.rs — meta pages (ids 0 and 1)
//
// Формат тела meta (LE), сразу за 16-байтовым заголовком страницы:
// u32 magic      = 0xED0CDAED
// u32 version    = 2
// u32 page_size  (1 KiB..=64 KiB, power of two)
// u32 flags      (reserved)
// u64 root       — корневая страница дерева бакетов
// u64 freelist   — страница free-list или u64::MAX
// u64 pgid       — high-water mark (первый невыделенный id)
// u64 txid
// u32 checksum   — CRC32 по 48 байтам выше
//
// Политика выбора: валидная meta с наибольшим txid.

use anyhow::{anyhow, Result};
use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher as Crc32;

use crate::consts::{
    Pgid, MAX_PAGE_SIZE, META_CHECKSUM_SPAN, META_END, META_MAGIC, META_OFF_CHECKSUM,
    META_OFF_FLAGS, META_OFF_FREELIST, META_OFF_MAGIC, META_OFF_PAGE_SIZE, META_OFF_PGID,
    META_OFF_ROOT, META_OFF_TXID, META_OFF_VERSION, META_VERSION, MIN_PAGE_SIZE,
    PAGE_FLAG_META,
};
use crate::page::write_page_header;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Meta {
    pub version: u32,
    pub page_size: u32,
    pub flags: u32,
    pub root: Pgid,
    pub freelist: Pgid,
    /// High-water mark: every page id below it is allocated.
    pub pgid: Pgid,
    pub txid: u64,
}

/// Проверка корректности размера страницы (2^n, 1 KiB .. 64 KiB).
pub fn validate_page_size(page_size: u32) -> Result<()> {
    if page_size < MIN_PAGE_SIZE || page_size > MAX_PAGE_SIZE || !page_size.is_power_of_two() {
        return Err(anyhow!(
            "page_size must be a power of two in [{} .. {}], got {}",
            MIN_PAGE_SIZE,
            MAX_PAGE_SIZE,
            page_size
        ));
    }
    Ok(())
}

fn checksum(buf: &[u8]) -> u32 {
    let mut h = Crc32::new();
    h.update(&buf[META_OFF_MAGIC..META_OFF_MAGIC + META_CHECKSUM_SPAN]);
    h.finalize()
}

impl Meta {
    /// Decode and validate a meta page image (at least `META_END` bytes).
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < META_END {
            return Err(anyhow!("meta page too short: {} bytes", buf.len()));
        }
        let magic = LittleEndian::read_u32(&buf[META_OFF_MAGIC..META_OFF_MAGIC + 4]);
        if magic != META_MAGIC {
            return Err(anyhow!(
                "invalid meta magic 0x{:08x} (expected 0x{:08x})",
                magic,
                META_MAGIC
            ));
        }
        let version = LittleEndian::read_u32(&buf[META_OFF_VERSION..META_OFF_VERSION + 4]);
        if version != META_VERSION {
            return Err(anyhow!(
                "unsupported meta version {} (expected {})",
                version,
                META_VERSION
            ));
        }
        let stored = LittleEndian::read_u32(&buf[META_OFF_CHECKSUM..META_OFF_CHECKSUM + 4]);
        let calc = checksum(buf);
        if stored != calc {
            return Err(anyhow!(
                "meta checksum mismatch (stored 0x{:08x}, computed 0x{:08x})",
                stored,
                calc
            ));
        }
        let page_size = LittleEndian::read_u32(&buf[META_OFF_PAGE_SIZE..META_OFF_PAGE_SIZE + 4]);
        validate_page_size(page_size)?;

        Ok(Self {
            version,
            page_size,
            flags: LittleEndian::read_u32(&buf[META_OFF_FLAGS..META_OFF_FLAGS + 4]),
            root: LittleEndian::read_u64(&buf[META_OFF_ROOT..META_OFF_ROOT + 8]),
            freelist: LittleEndian::read_u64(&buf[META_OFF_FREELIST..META_OFF_FREELIST + 8]),
            pgid: LittleEndian::read_u64(&buf[META_OFF_PGID..META_OFF_PGID + 8]),
            txid: LittleEndian::read_u64(&buf[META_OFF_TXID..META_OFF_TXID + 8]),
        })
    }

    /// Write header + body + checksum of meta page `id` into `buf`.
    pub fn encode(&self, id: Pgid, buf: &mut [u8]) {
        write_page_header(buf, id, PAGE_FLAG_META, 0, 0);
        LittleEndian::write_u32(&mut buf[META_OFF_MAGIC..META_OFF_MAGIC + 4], META_MAGIC);
        LittleEndian::write_u32(&mut buf[META_OFF_VERSION..META_OFF_VERSION + 4], self.version);
        LittleEndian::write_u32(
            &mut buf[META_OFF_PAGE_SIZE..META_OFF_PAGE_SIZE + 4],
            self.page_size,
        );
        LittleEndian::write_u32(&mut buf[META_OFF_FLAGS..META_OFF_FLAGS + 4], self.flags);
        LittleEndian::write_u64(&mut buf[META_OFF_ROOT..META_OFF_ROOT + 8], self.root);
        LittleEndian::write_u64(&mut buf[META_OFF_FREELIST..META_OFF_FREELIST + 8], self.freelist);
        LittleEndian::write_u64(&mut buf[META_OFF_PGID..META_OFF_PGID + 8], self.pgid);
        LittleEndian::write_u64(&mut buf[META_OFF_TXID..META_OFF_TXID + 8], self.txid);
        let c = checksum(buf);
        LittleEndian::write_u32(&mut buf[META_OFF_CHECKSUM..META_OFF_CHECKSUM + 4], c);
    }
}

/// Выбрать действующую meta: валидная с наибольшим txid.
pub fn pick_meta(m0: Result<Meta>, m1: Result<Meta>) -> Result<Meta> {
    match (m0, m1) {
        (Ok(a), Ok(b)) => Ok(if b.txid > a.txid { b } else { a }),
        (Ok(a), Err(_)) => Ok(a),
        (Err(_), Ok(b)) => Ok(b),
        (Err(e0), Err(e1)) => Err(anyhow!(
            "invalid database: meta 0: {:#}; meta 1: {:#}",
            e0,
            e1
        )),
    }
}
