//! check/error — одна найденная несогласованность.
//!
//! Ключи в сообщениях уже отрендерены через KvStringer из опций проверки.

use thiserror::Error;

use crate::consts::Pgid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckError {
    #[error("page {page}: already freed")]
    AlreadyFreed { page: Pgid },

    #[error("high water mark {hwm} is beyond end of file ({file_pages} pages)")]
    HwmBeyondFile { hwm: Pgid, file_pages: u64 },

    #[error("page ID ({page}) out of range [{min}, {hwm})")]
    PageIdOutOfRange { page: Pgid, min: Pgid, hwm: Pgid },

    #[error("page {page}: out of bounds: {hwm} (stack: {stack:?})")]
    OutOfBounds {
        page: Pgid,
        hwm: Pgid,
        stack: Vec<Pgid>,
    },

    #[error("page {page}: unreadable: {detail}")]
    Unreadable { page: Pgid, detail: String },

    #[error("page {page}: header id mismatch: found {found}")]
    HeaderIdMismatch { page: Pgid, found: Pgid },

    #[error("page {page}: multiple references (stack: {stack:?})")]
    MultipleReferences { page: Pgid, stack: Vec<Pgid> },

    #[error("page {page}: reachable freed")]
    ReachableFreed { page: Pgid },

    #[error("page {page}: invalid type: {page_type} (stack: {stack:?})")]
    InvalidType {
        page: Pgid,
        page_type: String,
        stack: Vec<Pgid>,
    },

    #[error("page {page}: malformed: {detail}")]
    Malformed { page: Pgid, detail: String },

    #[error(
        "the first key[{index}]={key} on {page_kind} page({page}) needs to be >= the key in the ancestor ({ancestor}). Stack: {stack:?}"
    )]
    KeyBelowAncestor {
        page: Pgid,
        page_kind: &'static str,
        index: usize,
        key: String,
        ancestor: String,
        stack: Vec<Pgid>,
    },

    #[error(
        "key[{index}]={key} on {page_kind} page({page}) needs to be > (found {found}) than previous element {previous}. Stack: {stack:?}"
    )]
    KeyNotIncreasing {
        page: Pgid,
        page_kind: &'static str,
        index: usize,
        key: String,
        previous: String,
        found: char,
        stack: Vec<Pgid>,
    },

    #[error(
        "key[{index}]={key} on {page_kind} page({page}) needs to be < than key of the next element in ancestor {bound}. Pages stack: {stack:?}"
    )]
    KeyAboveBound {
        page: Pgid,
        page_kind: &'static str,
        index: usize,
        key: String,
        bound: String,
        stack: Vec<Pgid>,
    },

    #[error("page {page}: unreachable unfreed")]
    UnreachableUnfreed { page: Pgid },
}

impl CheckError {
    /// Page the finding is about, when there is one.
    pub fn page(&self) -> Option<Pgid> {
        match self {
            CheckError::HwmBeyondFile { .. } => None,
            CheckError::AlreadyFreed { page }
            | CheckError::PageIdOutOfRange { page, .. }
            | CheckError::OutOfBounds { page, .. }
            | CheckError::Unreadable { page, .. }
            | CheckError::HeaderIdMismatch { page, .. }
            | CheckError::MultipleReferences { page, .. }
            | CheckError::ReachableFreed { page }
            | CheckError::InvalidType { page, .. }
            | CheckError::Malformed { page, .. }
            | CheckError::KeyBelowAncestor { page, .. }
            | CheckError::KeyNotIncreasing { page, .. }
            | CheckError::KeyAboveBound { page, .. }
            | CheckError::UnreachableUnfreed { page } => Some(*page),
        }
    }

    /// Stable machine-readable kind, used by the JSON report.
    pub fn kind(&self) -> &'static str {
        match self {
            CheckError::AlreadyFreed { .. } => "already_freed",
            CheckError::HwmBeyondFile { .. } => "hwm_beyond_file",
            CheckError::PageIdOutOfRange { .. } => "page_id_out_of_range",
            CheckError::OutOfBounds { .. } => "out_of_bounds",
            CheckError::Unreadable { .. } => "unreadable",
            CheckError::HeaderIdMismatch { .. } => "header_id_mismatch",
            CheckError::MultipleReferences { .. } => "multiple_references",
            CheckError::ReachableFreed { .. } => "reachable_freed",
            CheckError::InvalidType { .. } => "invalid_type",
            CheckError::Malformed { .. } => "malformed",
            CheckError::KeyBelowAncestor { .. } => "key_below_ancestor",
            CheckError::KeyNotIncreasing { .. } => "key_not_increasing",
            CheckError::KeyAboveBound { .. } => "key_above_bound",
            CheckError::UnreachableUnfreed { .. } => "unreachable_unfreed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_render_stack() {
        let e = CheckError::MultipleReferences {
            page: 7,
            stack: vec![3, 7],
        };
        assert_eq!(e.to_string(), "page 7: multiple references (stack: [3, 7])");
        assert_eq!(e.page(), Some(7));
        assert_eq!(e.kind(), "multiple_references");
    }

    #[test]
    fn key_order_message() {
        let e = CheckError::KeyNotIncreasing {
            page: 4,
            page_kind: "leaf",
            index: 1,
            key: "a".into(),
            previous: "b".into(),
            found: '<',
            stack: vec![4],
        };
        assert_eq!(
            e.to_string(),
            "key[1]=a on leaf page(4) needs to be > (found <) than previous element b. Stack: [4]"
        );
    }
}
