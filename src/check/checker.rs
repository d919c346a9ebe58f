//! check/checker — ленивый обход страниц с проверкой инвариантов.
//!
//! Фазы (ошибки выдаются по мере вытягивания итератора):
//! 1) start  — двойные освобождения в free-list, засев reachable (0, 1, span free-list),
//!             выбор корня: meta.root или page_id из опций;
//! 2) walk   — обход дерева в глубину, дети в порядке ключей; вложенные бакеты
//!             дерева обходятся после самого дерева, тоже в порядке ключей;
//! 3) sweep  — только для всей БД: каждая страница ниже hwm должна быть
//!             достижима или свободна.
//!
//! Между вызовами next() буферизуются только находки одной страницы.

use std::collections::{HashSet, VecDeque};

use log::debug;

use super::error::CheckError;
use super::kv::KvStringer;
use super::options::CheckOptions;
use crate::consts::{Pgid, META_PAGE_0, META_PAGE_1, MIN_USER_PGID, PGID_NO_FREELIST};
use crate::meta::Meta;
use crate::page::{page_at, Page};

enum Phase {
    Start,
    Walk,
    Sweep { next: Pgid },
    Done,
}

/// One page to visit, with the key range its subtree must stay in.
struct Visit {
    pgid: Pgid,
    min: Option<Vec<u8>>,
    max: Option<Vec<u8>>,
    parents: Vec<Pgid>,
}

/// Walk over one bucket tree; nested bucket roots wait until the tree is done.
struct TreeWalk {
    pages: Vec<Visit>,
    nested: Vec<Pgid>,
}

impl TreeWalk {
    fn rooted_at(root: Pgid) -> Self {
        Self {
            pages: vec![Visit {
                pgid: root,
                min: None,
                max: None,
                parents: Vec::new(),
            }],
            nested: Vec::new(),
        }
    }
}

pub struct Checker<'a> {
    data: &'a [u8],
    meta: Meta,
    freelist: &'a [Pgid],
    kv: Box<dyn KvStringer>,
    page_id: Option<Pgid>,

    phase: Phase,
    pending: VecDeque<CheckError>,
    reachable: HashSet<Pgid>,
    freed: HashSet<Pgid>,
    walks: Vec<TreeWalk>,
    /// Sweep stops here: min(hwm, pages present in the file).
    sweep_end: Pgid,
}

impl<'a> Checker<'a> {
    pub(crate) fn new(data: &'a [u8], meta: Meta, freelist: &'a [Pgid], opts: CheckOptions) -> Self {
        Self {
            data,
            meta,
            freelist,
            kv: opts.kv_stringer,
            page_id: opts.page_id,
            phase: Phase::Start,
            pending: VecDeque::new(),
            reachable: HashSet::new(),
            freed: HashSet::new(),
            walks: Vec::new(),
            sweep_end: 0,
        }
    }

    fn start(&mut self) {
        for &id in self.freelist {
            if !self.freed.insert(id) {
                self.pending.push_back(CheckError::AlreadyFreed { page: id });
            }
        }

        self.reachable.insert(META_PAGE_0);
        self.reachable.insert(META_PAGE_1);
        if self.meta.freelist != PGID_NO_FREELIST {
            match page_at(self.data, self.meta.freelist, self.meta.page_size) {
                Ok(p) => {
                    for i in 0..=p.overflow() as u64 {
                        self.reachable.insert(self.meta.freelist + i);
                    }
                }
                Err(e) => self.pending.push_back(CheckError::Unreadable {
                    page: self.meta.freelist,
                    detail: format!("{:#}", e),
                }),
            }
        }

        let hwm = self.meta.pgid;
        let file_pages = self.data.len() as u64 / self.meta.page_size as u64;
        if hwm > file_pages {
            self.pending
                .push_back(CheckError::HwmBeyondFile { hwm, file_pages });
        }
        self.sweep_end = hwm.min(file_pages);

        match self.page_id {
            None => {
                debug!("check: whole database from root {}", self.meta.root);
                self.walks.push(TreeWalk::rooted_at(self.meta.root));
                self.phase = Phase::Walk;
            }
            Some(id) if id < MIN_USER_PGID || id >= hwm => {
                self.pending.push_back(CheckError::PageIdOutOfRange {
                    page: id,
                    min: MIN_USER_PGID,
                    hwm,
                });
                self.phase = Phase::Done;
            }
            Some(id) => {
                debug!("check: subtree rooted at page {}", id);
                self.walks.push(TreeWalk::rooted_at(id));
                self.phase = Phase::Walk;
            }
        }
    }

    fn step_walk(&mut self) {
        let next = match self.walks.last_mut() {
            Some(walk) => walk.pages.pop(),
            None => {
                self.phase = if self.page_id.is_none() {
                    Phase::Sweep { next: 0 }
                } else {
                    Phase::Done
                };
                return;
            }
        };
        match next {
            Some(visit) => self.visit(visit),
            None => {
                if let Some(done) = self.walks.pop() {
                    for root in done.nested.into_iter().rev() {
                        self.walks.push(TreeWalk::rooted_at(root));
                    }
                }
            }
        }
    }

    fn sweep(&mut self, from: Pgid) -> Option<CheckError> {
        let mut id = from;
        while id < self.sweep_end {
            if !self.reachable.contains(&id) && !self.freed.contains(&id) {
                self.phase = Phase::Sweep { next: id + 1 };
                return Some(CheckError::UnreachableUnfreed { page: id });
            }
            id += 1;
        }
        self.phase = Phase::Done;
        None
    }

    fn visit(&mut self, v: Visit) {
        let pgid = v.pgid;
        let mut stack = v.parents;
        stack.push(pgid);

        let hwm = self.meta.pgid;
        if pgid >= hwm {
            self.pending.push_back(CheckError::OutOfBounds {
                page: pgid,
                hwm,
                stack: stack.clone(),
            });
        }

        let page = match page_at(self.data, pgid, self.meta.page_size) {
            Ok(p) => p,
            Err(e) => {
                self.reachable.insert(pgid);
                self.pending.push_back(CheckError::Unreadable {
                    page: pgid,
                    detail: format!("{:#}", e),
                });
                return;
            }
        };

        if page.id() != pgid {
            self.pending.push_back(CheckError::HeaderIdMismatch {
                page: pgid,
                found: page.id(),
            });
        }

        // Каждая страница (и её overflow) должна быть упомянута ровно один раз.
        let mut seen_before = false;
        for i in 0..=page.overflow() as u64 {
            let id = pgid + i;
            if !self.reachable.insert(id) {
                self.pending.push_back(CheckError::MultipleReferences {
                    page: id,
                    stack: stack.clone(),
                });
                if i == 0 {
                    seen_before = true;
                }
            }
        }

        let tree_page = page.is_branch() || page.is_leaf();
        if self.freed.contains(&pgid) {
            self.pending.push_back(CheckError::ReachableFreed { page: pgid });
        } else if !tree_page {
            self.pending.push_back(CheckError::InvalidType {
                page: pgid,
                page_type: page.type_name(),
                stack: stack.clone(),
            });
        }
        // повторно не спускаемся: защита от циклов
        if !tree_page || seen_before {
            return;
        }

        if page.is_branch() {
            self.check_branch(page, v.min, v.max, stack);
        } else {
            self.check_leaf(page, v.min, v.max, &stack);
        }
    }

    fn check_branch(
        &mut self,
        page: Page<'a>,
        min: Option<Vec<u8>>,
        max: Option<Vec<u8>>,
        stack: Vec<Pgid>,
    ) {
        let pgid = page.pgid();
        let mut elems = Vec::with_capacity(page.count() as usize);
        for i in 0..page.count() as usize {
            match page.branch_element(i) {
                Ok(e) => elems.push(e),
                Err(e) => {
                    self.pending.push_back(CheckError::Malformed {
                        page: pgid,
                        detail: format!("{:#}", e),
                    });
                    break;
                }
            }
        }

        let mut prev = min.as_deref();
        for (i, e) in elems.iter().enumerate() {
            self.verify_key_order(pgid, "branch", i, e.key, prev, max.as_deref(), &stack);
            prev = Some(e.key);
        }

        let mut children = Vec::with_capacity(elems.len());
        for (i, e) in elems.iter().enumerate() {
            let child_max = match elems.get(i + 1) {
                Some(next) => Some(next.key.to_vec()),
                None => max.clone(),
            };
            children.push(Visit {
                pgid: e.pgid,
                min: Some(e.key.to_vec()),
                max: child_max,
                parents: stack.clone(),
            });
        }
        if let Some(walk) = self.walks.last_mut() {
            walk.pages.extend(children.into_iter().rev());
        }
    }

    fn check_leaf(
        &mut self,
        page: Page<'a>,
        min: Option<Vec<u8>>,
        max: Option<Vec<u8>>,
        stack: &[Pgid],
    ) {
        let pgid = page.pgid();
        let mut nested = Vec::new();
        let mut prev = min.as_deref();
        for i in 0..page.count() as usize {
            let e = match page.leaf_element(i) {
                Ok(e) => e,
                Err(e) => {
                    self.pending.push_back(CheckError::Malformed {
                        page: pgid,
                        detail: format!("{:#}", e),
                    });
                    break;
                }
            };
            self.verify_key_order(pgid, "leaf", i, e.key, prev, max.as_deref(), stack);
            prev = Some(e.key);

            if !e.is_bucket() {
                continue;
            }
            match e.bucket_root() {
                // inline-бакет: своих страниц нет
                Some(0) => {}
                Some(root) => nested.push(root),
                None => self.pending.push_back(CheckError::Malformed {
                    page: pgid,
                    detail: format!(
                        "bucket {} has a short header ({} bytes: {})",
                        self.kv.key_to_string(e.key),
                        e.value.len(),
                        self.kv.value_to_string(e.value)
                    ),
                }),
            }
        }
        if let Some(walk) = self.walks.last_mut() {
            walk.nested.extend(nested);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn verify_key_order(
        &mut self,
        pgid: Pgid,
        page_kind: &'static str,
        index: usize,
        key: &[u8],
        previous: Option<&[u8]>,
        max_open: Option<&[u8]>,
        stack: &[Pgid],
    ) {
        if let Some(prev) = previous {
            if index == 0 {
                if prev > key {
                    self.pending.push_back(CheckError::KeyBelowAncestor {
                        page: pgid,
                        page_kind,
                        index,
                        key: self.kv.key_to_string(key),
                        ancestor: self.kv.key_to_string(prev),
                        stack: stack.to_vec(),
                    });
                }
            } else if prev >= key {
                self.pending.push_back(CheckError::KeyNotIncreasing {
                    page: pgid,
                    page_kind,
                    index,
                    key: self.kv.key_to_string(key),
                    previous: self.kv.key_to_string(prev),
                    found: if prev == key { '=' } else { '<' },
                    stack: stack.to_vec(),
                });
            }
        }
        if let Some(max) = max_open {
            if key >= max {
                self.pending.push_back(CheckError::KeyAboveBound {
                    page: pgid,
                    page_kind,
                    index,
                    key: self.kv.key_to_string(key),
                    bound: self.kv.key_to_string(max),
                    stack: stack.to_vec(),
                });
            }
        }
    }
}

impl<'a> Iterator for Checker<'a> {
    type Item = CheckError;

    fn next(&mut self) -> Option<CheckError> {
        loop {
            if let Some(e) = self.pending.pop_front() {
                return Some(e);
            }
            match self.phase {
                Phase::Start => self.start(),
                Phase::Walk => self.step_walk(),
                Phase::Sweep { next } => {
                    if let Some(e) = self.sweep(next) {
                        return Some(e);
                    }
                }
                Phase::Done => return None,
            }
        }
    }
}
