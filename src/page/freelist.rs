//! page/freelist — список свободных страниц.
//!
//! Формат: `count` u64-идентификаторов сразу за заголовком. Если
//! `count == 0xFFFF`, настоящий счётчик лежит в первом u64, а ids идут за ним.

use anyhow::{anyhow, Result};
use byteorder::{ByteOrder, LittleEndian};

use super::common::Page;
use crate::consts::{Pgid, FREELIST_COUNT_OVERFLOW, PAGE_HEADER_SIZE};

impl<'a> Page<'a> {
    /// Decode the free page ids stored on a free-list page.
    pub fn freelist_ids(&self) -> Result<Vec<Pgid>> {
        if !self.is_freelist() {
            return Err(anyhow!(
                "page {} is not a freelist page (type {})",
                self.pgid(),
                self.type_name()
            ));
        }
        let bytes = self.bytes();
        let (count, start) = if self.count() == FREELIST_COUNT_OVERFLOW {
            if bytes.len() < PAGE_HEADER_SIZE + 8 {
                return Err(anyhow!("freelist page {} too short for count", self.pgid()));
            }
            let n = LittleEndian::read_u64(&bytes[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + 8]);
            (n, PAGE_HEADER_SIZE + 8)
        } else {
            (self.count() as u64, PAGE_HEADER_SIZE)
        };

        let need = count
            .checked_mul(8)
            .and_then(|n| n.checked_add(start as u64))
            .ok_or_else(|| anyhow!("freelist page {}: count {} overflows", self.pgid(), count))?;
        if need > bytes.len() as u64 {
            return Err(anyhow!(
                "freelist page {}: {} ids do not fit into {} bytes",
                self.pgid(),
                count,
                bytes.len()
            ));
        }

        let mut ids = Vec::with_capacity(count as usize);
        for i in 0..count as usize {
            let off = start + i * 8;
            ids.push(LittleEndian::read_u64(&bytes[off..off + 8]));
        }
        Ok(ids)
    }
}

/// Сколько байт занимает free-list из `n` ids (с заголовком).
pub fn freelist_encoded_len(n: usize) -> usize {
    if n >= FREELIST_COUNT_OVERFLOW as usize {
        PAGE_HEADER_SIZE + 8 + n * 8
    } else {
        PAGE_HEADER_SIZE + n * 8
    }
}

/// Записать ids в тело free-list страницы и вернуть значение поля `count`.
pub(crate) fn write_freelist_ids(buf: &mut [u8], ids: &[Pgid]) -> u16 {
    let (count, start) = if ids.len() >= FREELIST_COUNT_OVERFLOW as usize {
        LittleEndian::write_u64(
            &mut buf[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + 8],
            ids.len() as u64,
        );
        (FREELIST_COUNT_OVERFLOW, PAGE_HEADER_SIZE + 8)
    } else {
        (ids.len() as u16, PAGE_HEADER_SIZE)
    };
    for (i, id) in ids.iter().enumerate() {
        let off = start + i * 8;
        LittleEndian::write_u64(&mut buf[off..off + 8], *id);
    }
    count
}
