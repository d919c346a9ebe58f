//! store/tx — read-only транзакция.
//!
//! Tx фиксирует снимок meta на момент begin(); все чтения идут через
//! образ файла Store, поэтому проверка видит согласованное состояние.

use anyhow::Result;
use log::debug;

use crate::check::{CheckOptions, Checker};
use crate::consts::Pgid;
use crate::meta::Meta;
use crate::page::{page_at, Page};

use super::Store;

pub struct Tx<'s> {
    store: &'s Store,
    meta: Meta,
}

impl<'s> Tx<'s> {
    pub(crate) fn begin(store: &'s Store) -> Self {
        debug!("tx begin (read-only), txid={}", store.meta().txid);
        Self {
            store,
            meta: *store.meta(),
        }
    }

    pub(crate) fn rollback(self) {
        debug!("tx end (read-only), txid={}", self.meta.txid);
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn page(&self, pgid: Pgid) -> Result<Page<'s>> {
        let store: &'s Store = self.store;
        page_at(store.data(), pgid, self.meta.page_size)
    }

    /// Lazy consistency check; errors are produced as the iterator is pulled.
    pub fn check(&self, opts: CheckOptions) -> Result<Checker<'s>> {
        let store: &'s Store = self.store;
        let freelist = store.freelist_ids()?;
        Ok(Checker::new(store.data(), self.meta, freelist, opts))
    }
}
