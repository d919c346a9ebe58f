//! page/elem — branch/leaf элементы.
//!
//! Элементы лежат сразу за заголовком, по 16 байт; `pos` отсчитывается
//! от начала самого элемента. Ключ (и значение у leaf) читаются из
//! того же span страницы; выход за span — ошибка, а не паника.

use anyhow::{anyhow, Result};
use byteorder::{ByteOrder, LittleEndian};

use super::common::Page;
use crate::consts::{
    Pgid, BRANCH_ELEM_SIZE, BUCKET_HEADER_SIZE, LEAF_ELEM_SIZE, LEAF_FLAG_BUCKET,
    PAGE_HEADER_SIZE,
};

#[derive(Debug, Clone, Copy)]
pub struct BranchElem<'a> {
    pub key: &'a [u8],
    pub pgid: Pgid,
}

#[derive(Debug, Clone, Copy)]
pub struct LeafElem<'a> {
    pub flags: u32,
    pub key: &'a [u8],
    pub value: &'a [u8],
}

impl<'a> LeafElem<'a> {
    #[inline]
    pub fn is_bucket(&self) -> bool {
        self.flags & LEAF_FLAG_BUCKET != 0
    }

    /// Root page of a nested bucket; None when the value is too short to hold a header.
    pub fn bucket_root(&self) -> Option<Pgid> {
        if self.value.len() < BUCKET_HEADER_SIZE {
            return None;
        }
        Some(LittleEndian::read_u64(&self.value[0..8]))
    }
}

fn slice_at<'a>(bytes: &'a [u8], start: usize, len: usize, what: &str) -> Result<&'a [u8]> {
    let end = start
        .checked_add(len)
        .ok_or_else(|| anyhow!("{} range overflows", what))?;
    if end > bytes.len() {
        return Err(anyhow!(
            "{} [{}..{}) exceeds page span of {} bytes",
            what,
            start,
            end,
            bytes.len()
        ));
    }
    Ok(&bytes[start..end])
}

impl<'a> Page<'a> {
    pub fn branch_element(&self, index: usize) -> Result<BranchElem<'a>> {
        let bytes = self.bytes();
        let base = PAGE_HEADER_SIZE + index * BRANCH_ELEM_SIZE;
        let raw = slice_at(bytes, base, BRANCH_ELEM_SIZE, &format!("branch element {}", index))?;
        let pos = LittleEndian::read_u32(&raw[0..4]) as usize;
        let ksize = LittleEndian::read_u32(&raw[4..8]) as usize;
        let pgid = LittleEndian::read_u64(&raw[8..16]);
        let key = slice_at(bytes, base + pos, ksize, &format!("key of branch element {}", index))?;
        Ok(BranchElem { key, pgid })
    }

    pub fn leaf_element(&self, index: usize) -> Result<LeafElem<'a>> {
        let bytes = self.bytes();
        let base = PAGE_HEADER_SIZE + index * LEAF_ELEM_SIZE;
        let raw = slice_at(bytes, base, LEAF_ELEM_SIZE, &format!("leaf element {}", index))?;
        let flags = LittleEndian::read_u32(&raw[0..4]);
        let pos = LittleEndian::read_u32(&raw[4..8]) as usize;
        let ksize = LittleEndian::read_u32(&raw[8..12]) as usize;
        let vsize = LittleEndian::read_u32(&raw[12..16]) as usize;
        let key = slice_at(bytes, base + pos, ksize, &format!("key of leaf element {}", index))?;
        let value = slice_at(
            bytes,
            base + pos + ksize,
            vsize,
            &format!("value of leaf element {}", index),
        )?;
        Ok(LeafElem { flags, key, value })
    }
}

/// Записать branch-элемент `index`; `pos` указывает на ключ относительно элемента.
pub(crate) fn write_branch_elem(buf: &mut [u8], index: usize, pos: u32, ksize: u32, pgid: Pgid) {
    let base = PAGE_HEADER_SIZE + index * BRANCH_ELEM_SIZE;
    LittleEndian::write_u32(&mut buf[base..base + 4], pos);
    LittleEndian::write_u32(&mut buf[base + 4..base + 8], ksize);
    LittleEndian::write_u64(&mut buf[base + 8..base + 16], pgid);
}

pub(crate) fn write_leaf_elem(
    buf: &mut [u8],
    index: usize,
    flags: u32,
    pos: u32,
    ksize: u32,
    vsize: u32,
) {
    let base = PAGE_HEADER_SIZE + index * LEAF_ELEM_SIZE;
    LittleEndian::write_u32(&mut buf[base..base + 4], flags);
    LittleEndian::write_u32(&mut buf[base + 4..base + 8], pos);
    LittleEndian::write_u32(&mut buf[base + 8..base + 12], ksize);
    LittleEndian::write_u32(&mut buf[base + 12..base + 16], vsize);
}
