//! cli/scope — режим проверки и его валидация (до любого I/O).

use thiserror::Error;

use crate::consts::{Pgid, MIN_USER_PGID};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("the pageId must be at least {min}, but got {page_id}")]
    PageIdTooLow { page_id: Pgid, min: Pgid },
}

/// Which part of the store to check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckScope {
    WholeDatabase,
    SinglePage { page_id: Pgid },
}

impl CheckScope {
    /// Validated page scope.
    pub fn single_page(page_id: Pgid) -> Result<Self, ValidationError> {
        PageCheckOptions { page_id }.validate()?;
        Ok(CheckScope::SinglePage { page_id })
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match *self {
            CheckScope::WholeDatabase => Ok(()),
            CheckScope::SinglePage { page_id } => PageCheckOptions { page_id }.validate(),
        }
    }

    pub fn page_id(&self) -> Option<Pgid> {
        match *self {
            CheckScope::WholeDatabase => None,
            CheckScope::SinglePage { page_id } => Some(page_id),
        }
    }
}

/// `--pageId` of `check page`. Pages 0 and 1 hold meta and are never valid roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCheckOptions {
    pub page_id: Pgid,
}

impl PageCheckOptions {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.page_id < MIN_USER_PGID {
            return Err(ValidationError::PageIdTooLow {
                page_id: self.page_id,
                min: MIN_USER_PGID,
            });
        }
        Ok(())
    }
}
