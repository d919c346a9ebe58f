use std::fmt;

use super::kv::{HexKvStringer, KvStringer};
use crate::consts::Pgid;

/// Options for `Tx::check`.
pub struct CheckOptions {
    pub(crate) kv_stringer: Box<dyn KvStringer>,
    pub(crate) page_id: Option<Pgid>,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            kv_stringer: Box::new(HexKvStringer),
            page_id: None,
        }
    }
}

impl CheckOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// How keys/values are rendered inside error messages.
    pub fn with_kv_stringer<S: KvStringer + 'static>(mut self, s: S) -> Self {
        self.kv_stringer = Box::new(s);
        self
    }

    /// Restrict the check to the subtree rooted at `page_id`.
    pub fn with_page_id(mut self, page_id: Pgid) -> Self {
        self.page_id = Some(page_id);
        self
    }

    pub fn page_id(&self) -> Option<Pgid> {
        self.page_id
    }
}

impl fmt::Debug for CheckOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckOptions")
            .field("page_id", &self.page_id)
            .finish_non_exhaustive()
    }
}
