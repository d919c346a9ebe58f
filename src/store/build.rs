//! store/build — запись свежего согласованного файла хранилища.
//!
//! Раскладка файла:
//! - 0, 1        — meta (meta 1 получает txid + 1 и считается активной);
//! - 2..         — free-list страница (со span под все ids), затем свободные страницы;
//! - далее       — деревья пользовательских бакетов (листья, затем ветки уровнями);
//! - в конце     — дерево корневого бакета со ссылками на пользовательские.
//!
//! Листья заполняются жадно до page_size; элемент больше страницы получает
//! overflow-span. Ключ branch-элемента равен первому ключу дочернего поддерева.

use anyhow::{Context, Result};
use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use crate::consts::{
    Pgid, BRANCH_ELEM_SIZE, BUCKET_HEADER_SIZE, LEAF_ELEM_SIZE, LEAF_FLAG_BUCKET, META_PAGE_0,
    META_PAGE_1, META_VERSION, PAGE_FLAG_BRANCH, PAGE_FLAG_FREELIST, PAGE_FLAG_LEAF,
    PAGE_HEADER_SIZE,
};
use crate::lock::{lock_file, LockMode};
use crate::meta::{validate_page_size, Meta};
use crate::page::elem::{write_branch_elem, write_leaf_elem};
use crate::page::freelist::{freelist_encoded_len, write_freelist_ids};
use crate::page::write_page_header;

/// Where things landed in a freshly written file.
#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub page_size: u32,
    /// High-water mark (pages in the file).
    pub hwm: Pgid,
    /// Root page of the top-level bucket tree.
    pub root: Pgid,
    pub freelist: Pgid,
    pub free_pages: Vec<Pgid>,
    /// Root page of every user bucket.
    pub bucket_roots: BTreeMap<Vec<u8>, Pgid>,
}

#[derive(Clone, Debug)]
pub struct StoreBuilder {
    page_size: u32,
    buckets: BTreeMap<Vec<u8>, BTreeMap<Vec<u8>, Vec<u8>>>,
    free_pages: usize,
    txid: u64,
}

impl StoreBuilder {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            buckets: BTreeMap::new(),
            free_pages: 0,
            txid: 1,
        }
    }

    /// Ensure an (possibly empty) bucket exists.
    pub fn bucket(mut self, name: &[u8]) -> Self {
        self.buckets.entry(name.to_vec()).or_default();
        self
    }

    pub fn put(mut self, bucket: &[u8], key: &[u8], value: &[u8]) -> Self {
        self.buckets
            .entry(bucket.to_vec())
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        self
    }

    /// Number of allocated-but-free pages recorded on the free-list.
    pub fn free_pages(mut self, n: usize) -> Self {
        self.free_pages = n;
        self
    }

    pub fn txid(mut self, txid: u64) -> Self {
        self.txid = txid;
        self
    }

    /// Write the file at `path` (created or replaced) under an exclusive lock.
    pub fn write(&self, path: &Path) -> Result<BuildSummary> {
        validate_page_size(self.page_size)?;

        let mut img = Image::new(self.page_size);
        img.alloc(2); // meta 0/1

        // free-list + свободные страницы
        let fl_span = span_for(freelist_encoded_len(self.free_pages), self.page_size);
        let freelist = img.alloc(fl_span);
        let mut free_ids = Vec::with_capacity(self.free_pages);
        for _ in 0..self.free_pages {
            let id = img.alloc(1);
            write_page_header(img.page_mut(id), id, PAGE_FLAG_LEAF, 0, 0);
            free_ids.push(id);
        }
        {
            let buf = img.page_mut(freelist);
            let count = write_freelist_ids(buf, &free_ids);
            write_page_header(buf, freelist, PAGE_FLAG_FREELIST, count, (fl_span - 1) as u32);
        }

        let mut bucket_roots = BTreeMap::new();
        let mut root_entries = Vec::with_capacity(self.buckets.len());
        for (name, kvs) in &self.buckets {
            let entries: Vec<Entry<'_>> = kvs
                .iter()
                .map(|(k, v)| Entry {
                    key: k.as_slice(),
                    value: v.clone(),
                    flags: 0,
                })
                .collect();
            let root = img.write_tree(&entries);
            bucket_roots.insert(name.clone(), root);

            let mut hdr = vec![0u8; BUCKET_HEADER_SIZE];
            LittleEndian::write_u64(&mut hdr[0..8], root);
            root_entries.push((name.as_slice(), hdr));
        }
        let root_entries: Vec<Entry<'_>> = root_entries
            .into_iter()
            .map(|(name, hdr)| Entry {
                key: name,
                value: hdr,
                flags: LEAF_FLAG_BUCKET,
            })
            .collect();
        let root = img.write_tree(&root_entries);

        let hwm = img.next;
        let mut meta = Meta {
            version: META_VERSION,
            page_size: self.page_size,
            flags: 0,
            root,
            freelist,
            pgid: hwm,
            txid: self.txid,
        };
        meta.encode(META_PAGE_0, img.page_mut(META_PAGE_0));
        meta.txid = self.txid + 1;
        meta.encode(META_PAGE_1, img.page_mut(META_PAGE_1));

        let mut f = OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)
            .with_context(|| format!("create database file {}", path.display()))?;
        let _lock = lock_file(&f, path, LockMode::Exclusive, Duration::ZERO)?;
        f.set_len(0)?;
        f.write_all(&img.bytes)
            .with_context(|| format!("write {}", path.display()))?;
        f.sync_all()?;

        debug!(
            "built {}: page_size={} hwm={} root={} buckets={} free={}",
            path.display(),
            self.page_size,
            hwm,
            root,
            bucket_roots.len(),
            free_ids.len()
        );

        Ok(BuildSummary {
            page_size: self.page_size,
            hwm,
            root,
            freelist,
            free_pages: free_ids,
            bucket_roots,
        })
    }
}

struct Entry<'a> {
    key: &'a [u8],
    value: Vec<u8>,
    flags: u32,
}

#[inline]
fn span_for(bytes: usize, page_size: u32) -> u64 {
    let ps = page_size as usize;
    ((bytes + ps - 1) / ps).max(1) as u64
}

/// Образ файла в памяти с последовательной аллокацией страниц.
struct Image {
    page_size: u32,
    bytes: Vec<u8>,
    next: Pgid,
}

impl Image {
    fn new(page_size: u32) -> Self {
        Self {
            page_size,
            bytes: Vec::new(),
            next: 0,
        }
    }

    fn alloc(&mut self, span: u64) -> Pgid {
        let id = self.next;
        self.next += span;
        self.bytes
            .resize((self.next * self.page_size as u64) as usize, 0);
        id
    }

    /// Bytes from the start of page `id` to the end of the image.
    fn page_mut(&mut self, id: Pgid) -> &mut [u8] {
        let off = (id * self.page_size as u64) as usize;
        &mut self.bytes[off..]
    }

    fn write_tree(&mut self, entries: &[Entry<'_>]) -> Pgid {
        let ps = self.page_size as usize;

        // листья
        let mut level: Vec<(Vec<u8>, Pgid)> = Vec::new();
        let mut start = 0;
        while start < entries.len() || level.is_empty() {
            let mut size = PAGE_HEADER_SIZE;
            let mut end = start;
            while end < entries.len() {
                let add = LEAF_ELEM_SIZE + entries[end].key.len() + entries[end].value.len();
                if end > start && size + add > ps {
                    break;
                }
                size += add;
                end += 1;
            }
            let group = &entries[start..end];
            let id = self.write_leaf(group, size);
            let first = group.first().map(|e| e.key.to_vec()).unwrap_or_default();
            level.push((first, id));
            start = end;
        }

        // ветки уровнями, пока не останется один корень
        while level.len() > 1 {
            let mut next_level = Vec::new();
            let mut start = 0;
            while start < level.len() {
                let mut size = PAGE_HEADER_SIZE;
                let mut end = start;
                while end < level.len() {
                    let add = BRANCH_ELEM_SIZE + level[end].0.len();
                    if end > start + 1 && size + add > ps {
                        break;
                    }
                    size += add;
                    end += 1;
                }
                let group = &level[start..end];
                let id = self.write_branch(group, size);
                next_level.push((group[0].0.clone(), id));
                start = end;
            }
            level = next_level;
        }
        level[0].1
    }

    fn write_leaf(&mut self, group: &[Entry<'_>], size: usize) -> Pgid {
        let span = span_for(size, self.page_size);
        let id = self.alloc(span);
        let buf = self.page_mut(id);
        write_page_header(buf, id, PAGE_FLAG_LEAF, group.len() as u16, (span - 1) as u32);
        let mut data_off = PAGE_HEADER_SIZE + group.len() * LEAF_ELEM_SIZE;
        for (i, e) in group.iter().enumerate() {
            let elem_off = PAGE_HEADER_SIZE + i * LEAF_ELEM_SIZE;
            write_leaf_elem(
                buf,
                i,
                e.flags,
                (data_off - elem_off) as u32,
                e.key.len() as u32,
                e.value.len() as u32,
            );
            buf[data_off..data_off + e.key.len()].copy_from_slice(e.key);
            data_off += e.key.len();
            buf[data_off..data_off + e.value.len()].copy_from_slice(&e.value);
            data_off += e.value.len();
        }
        id
    }

    fn write_branch(&mut self, group: &[(Vec<u8>, Pgid)], size: usize) -> Pgid {
        let span = span_for(size, self.page_size);
        let id = self.alloc(span);
        let buf = self.page_mut(id);
        write_page_header(buf, id, PAGE_FLAG_BRANCH, group.len() as u16, (span - 1) as u32);
        let mut data_off = PAGE_HEADER_SIZE + group.len() * BRANCH_ELEM_SIZE;
        for (i, (key, child)) in group.iter().enumerate() {
            let elem_off = PAGE_HEADER_SIZE + i * BRANCH_ELEM_SIZE;
            write_branch_elem(buf, i, (data_off - elem_off) as u32, key.len() as u32, *child);
            buf[data_off..data_off + key.len()].copy_from_slice(key);
            data_off += key.len();
        }
        id
    }
}
