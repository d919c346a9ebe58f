//! page/common — заголовок страницы и выборка страницы из образа файла.

use anyhow::{anyhow, Result};
use byteorder::{ByteOrder, LittleEndian};

use crate::consts::{
    Pgid, OFF_PAGE_COUNT, OFF_PAGE_FLAGS, OFF_PAGE_ID, OFF_PAGE_OVERFLOW, PAGE_FLAG_BRANCH,
    PAGE_FLAG_FREELIST, PAGE_FLAG_LEAF, PAGE_FLAG_META, PAGE_HEADER_SIZE,
};

/// View of one page (including its overflow span) inside the file image.
#[derive(Clone, Copy)]
pub struct Page<'a> {
    pgid: Pgid,
    bytes: &'a [u8],
}

/// Locate page `pgid` in `data`. The returned view covers `(overflow + 1)` pages.
pub fn page_at(data: &[u8], pgid: Pgid, page_size: u32) -> Result<Page<'_>> {
    let ps = page_size as u64;
    let off = pgid
        .checked_mul(ps)
        .ok_or_else(|| anyhow!("offset of page {} overflows u64", pgid))?;
    let len = data.len() as u64;
    if off.saturating_add(PAGE_HEADER_SIZE as u64) > len {
        return Err(anyhow!(
            "page header at offset {} is beyond end of file ({} bytes)",
            off,
            len
        ));
    }
    let start = off as usize;
    let overflow =
        LittleEndian::read_u32(&data[start + OFF_PAGE_OVERFLOW..start + OFF_PAGE_OVERFLOW + 4]);
    let span = (overflow as u64 + 1) * ps;
    if off.saturating_add(span) > len {
        return Err(anyhow!(
            "page span of {} pages at offset {} is beyond end of file ({} bytes)",
            overflow as u64 + 1,
            off,
            len
        ));
    }
    Ok(Page {
        pgid,
        bytes: &data[start..start + span as usize],
    })
}

impl<'a> Page<'a> {
    /// Id the page was requested by (the slot it occupies in the file).
    #[inline]
    pub fn pgid(&self) -> Pgid {
        self.pgid
    }

    /// Id stored in the page header.
    #[inline]
    pub fn id(&self) -> Pgid {
        LittleEndian::read_u64(&self.bytes[OFF_PAGE_ID..OFF_PAGE_ID + 8])
    }

    #[inline]
    pub fn flags(&self) -> u16 {
        LittleEndian::read_u16(&self.bytes[OFF_PAGE_FLAGS..OFF_PAGE_FLAGS + 2])
    }

    #[inline]
    pub fn count(&self) -> u16 {
        LittleEndian::read_u16(&self.bytes[OFF_PAGE_COUNT..OFF_PAGE_COUNT + 2])
    }

    #[inline]
    pub fn overflow(&self) -> u32 {
        LittleEndian::read_u32(&self.bytes[OFF_PAGE_OVERFLOW..OFF_PAGE_OVERFLOW + 4])
    }

    #[inline]
    pub fn is_branch(&self) -> bool {
        self.flags() & PAGE_FLAG_BRANCH != 0
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.flags() & PAGE_FLAG_LEAF != 0
    }

    #[inline]
    pub fn is_meta(&self) -> bool {
        self.flags() & PAGE_FLAG_META != 0
    }

    #[inline]
    pub fn is_freelist(&self) -> bool {
        self.flags() & PAGE_FLAG_FREELIST != 0
    }

    /// Human-readable page type, e.g. "leaf" or "unknown<20>".
    pub fn type_name(&self) -> String {
        if self.is_branch() {
            "branch".to_string()
        } else if self.is_leaf() {
            "leaf".to_string()
        } else if self.is_meta() {
            "meta".to_string()
        } else if self.is_freelist() {
            "freelist".to_string()
        } else {
            format!("unknown<{:02x}>", self.flags())
        }
    }

    /// Full byte span of the page (header included).
    #[inline]
    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

/// Записать заголовок страницы в начало `buf`.
pub fn write_page_header(buf: &mut [u8], id: Pgid, flags: u16, count: u16, overflow: u32) {
    LittleEndian::write_u64(&mut buf[OFF_PAGE_ID..OFF_PAGE_ID + 8], id);
    LittleEndian::write_u16(&mut buf[OFF_PAGE_FLAGS..OFF_PAGE_FLAGS + 2], flags);
    LittleEndian::write_u16(&mut buf[OFF_PAGE_COUNT..OFF_PAGE_COUNT + 2], count);
    LittleEndian::write_u32(&mut buf[OFF_PAGE_OVERFLOW..OFF_PAGE_OVERFLOW + 4], overflow);
}
