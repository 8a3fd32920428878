// Copyright (c) 2023 Yan Ka, Chiu.
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions
// are met:
// 1. Redistributions of source code must retain the above copyright
//    notice, this list of conditions, and the following disclaimer,
//    without modification, immediately at the beginning of the file.
// 2. The name of the author may not be used to endorse or promote products
//    derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE AUTHOR AND CONTRIBUTORS ``AS IS'' AND
// ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE
// IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE
// ARE DISCLAIMED. IN NO EVENT SHALL THE AUTHOR OR CONTRIBUTORS BE LIABLE FOR
// ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR CONSEQUENTIAL
// DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS
// OR SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION)
// HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT
// LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY
// OUT OF THE USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF
// SUCH DAMAGE.
pub mod sqlite;

use crate::error::StoreError;
use crate::models::{AbstractItem, DerivedItem, ItemStatus, OriginalItem};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Transactional session factory over the `abstract_item` / `original_item`
/// / `derived_item` / `version` schema. Every unit of work runs inside an
/// implicit transaction: begin, run the closure, commit on `Ok`, roll back
/// on `Err` -- the Rust shape of the specification's `session_template`.
pub struct MetadataStore {
    conn: Mutex<Connection>,
}

impl MetadataStore {
    pub fn open_file(path: impl AsRef<Path>) -> Result<MetadataStore, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(MetadataStore {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<MetadataStore, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(MetadataStore {
            conn: Mutex::new(conn),
        })
    }

    /// Run `f` inside a single transaction. Commits on `Ok`, rolls back on
    /// `Err`. The connection lock is held for the whole unit of work, so two
    /// sessions against the same `MetadataStore` never interleave -- matching
    /// the specification's "each unit of work opens its own session and
    /// commits before returning".
    pub async fn with_session<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&rusqlite::Transaction) -> Result<T, StoreError> + Send,
        T: Send,
    {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                let _ = tx.rollback();
                Err(err)
            }
        }
    }

    /// Idempotent: safe to call on every boot, whether or not the schema
    /// already exists.
    pub async fn create_or_upgrade_schema(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().await;
        sqlite::create_or_upgrade_schema(&mut conn)
    }

    pub async fn drop_all_tables(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        sqlite::drop_all_tables(&conn)
    }
}

/// Domain queries and mutations against the `MetadataStore`. Enforces
/// uniqueness by translating `StoreError::Unique` into the caller-visible
/// duplicate signal; every other repository error just propagates.
pub struct ItemRepository {
    store: Arc<MetadataStore>,
}

impl ItemRepository {
    pub fn new(store: Arc<MetadataStore>) -> ItemRepository {
        ItemRepository { store }
    }

    pub async fn find_original(&self, id: &str) -> Result<Option<OriginalItem>, StoreError> {
        let id = id.to_string();
        self.store
            .with_session(move |tx| sqlite::find_original(tx, &id))
            .await
    }

    pub async fn find_derived(
        &self,
        original_id: &str,
        size: (u32, u32),
        format: &str,
    ) -> Result<Option<DerivedItem>, StoreError> {
        let original_id = original_id.to_string();
        let format = format.to_uppercase();
        self.store
            .with_session(move |tx| sqlite::find_derived(tx, &original_id, size, &format))
            .await
    }

    pub async fn find_inconsistent_originals(
        &self,
        limit: u32,
    ) -> Result<Vec<OriginalItem>, StoreError> {
        self.store
            .with_session(move |tx| sqlite::find_inconsistent_originals(tx, limit))
            .await
    }

    pub async fn find_inconsistent_deriveds(
        &self,
        limit: u32,
    ) -> Result<Vec<DerivedItem>, StoreError> {
        self.store
            .with_session(move |tx| sqlite::find_inconsistent_deriveds(tx, limit))
            .await
    }

    /// Inserts the abstract row then the concrete row atomically. Returns
    /// `StoreError::Unique` on a primary-key or unique-index collision; the
    /// caller (the coordinator) is responsible for translating that into
    /// `CacheError::AlreadyExists` or a create-or-join wait, depending on
    /// which item kind is being created.
    pub async fn create_original(&self, item: &OriginalItem) -> Result<(), StoreError> {
        let item = item.clone();
        self.store
            .with_session(move |tx| sqlite::create_original(tx, &item))
            .await
    }

    pub async fn create_derived(&self, item: &DerivedItem) -> Result<(), StoreError> {
        let item = item.clone();
        self.store
            .with_session(move |tx| sqlite::create_derived(tx, &item))
            .await
    }

    pub async fn update_original(&self, item: &OriginalItem) -> Result<(), StoreError> {
        let item = item.clone();
        self.store
            .with_session(move |tx| sqlite::update_abstract(tx, &item.abstract_item))
            .await
    }

    pub async fn update_derived(&self, item: &DerivedItem) -> Result<(), StoreError> {
        let item = item.clone();
        self.store
            .with_session(move |tx| sqlite::update_abstract(tx, &item.abstract_item))
            .await
    }

    /// Removes the concrete row and the abstract row. Deleting an
    /// `OriginalItem` cascades to its derivatives via `ON DELETE CASCADE`.
    pub async fn delete_original(&self, item: &OriginalItem) -> Result<(), StoreError> {
        let id = item.id().to_string();
        self.store
            .with_session(move |tx| sqlite::delete_abstract(tx, &id))
            .await
    }

    pub async fn delete_derived(&self, item: &DerivedItem) -> Result<(), StoreError> {
        let id = item.id().to_string();
        self.store
            .with_session(move |tx| sqlite::delete_abstract(tx, &id))
            .await
    }
}

pub(crate) fn row_to_abstract_item(
    id: String,
    status: String,
    width: u32,
    height: u32,
    format: String,
) -> AbstractItem {
    AbstractItem {
        id,
        status: ItemStatus::from_str(&status).unwrap_or(ItemStatus::Inconsistent),
        width,
        height,
        format,
    }
}
