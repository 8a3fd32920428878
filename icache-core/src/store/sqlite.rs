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

use super::row_to_abstract_item;
use crate::error::StoreError;
use crate::models::{AbstractItem, DerivedItem, OriginalItem};
use rusqlite::{Connection, OptionalExtension};

const SCHEMA_VERSION: i64 = 1;

pub(crate) fn create_or_upgrade_schema(conn: &mut Connection) -> Result<(), StoreError> {
    let has_version: i64 = conn.query_row(
        "select count(*) from sqlite_master where type='table' and name='version'",
        [],
        |row| row.get(0),
    )?;

    if has_version == 0 {
        let tx = conn.transaction()?;
        tx.execute_batch(
            "
            create table version (name text not null, value integer not null);

            create table abstract_item (
                id     text primary key,
                status text not null,
                width  integer not null,
                height integer not null,
                format text not null
            );

            create table original_item (
                id text primary key references abstract_item(id) on delete cascade
            );

            create table derived_item (
                id               text primary key references abstract_item(id) on delete cascade,
                original_item_id text not null references original_item(id) on delete cascade,
                width            integer not null,
                height           integer not null,
                format           text not null,
                unique (original_item_id, width, height, format)
            );
            ",
        )?;
        tx.execute(
            "insert into version (name, value) values ('schema', ?)",
            [SCHEMA_VERSION],
        )?;
        tx.commit()?;
        tracing::info!("created icache metadata schema (version {SCHEMA_VERSION})");
    }

    Ok(())
}

pub(crate) fn drop_all_tables(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        drop table if exists derived_item;
        drop table if exists original_item;
        drop table if exists abstract_item;
        drop table if exists version;
        ",
    )?;
    Ok(())
}

pub(crate) fn find_original(
    tx: &rusqlite::Transaction,
    id: &str,
) -> Result<Option<OriginalItem>, StoreError> {
    let mut stmt = tx.prepare_cached(
        "
        select ai.id, ai.status, ai.width, ai.height, ai.format
        from abstract_item ai
        inner join original_item oi on oi.id = ai.id
        where ai.id = ?
        ",
    )?;
    let item = stmt
        .query_row([id], |row| {
            Ok(row_to_abstract_item(
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
            ))
        })
        .optional()?;
    Ok(item.map(|abstract_item| OriginalItem { abstract_item }))
}

pub(crate) fn find_derived(
    tx: &rusqlite::Transaction,
    original_id: &str,
    size: (u32, u32),
    format: &str,
) -> Result<Option<DerivedItem>, StoreError> {
    let mut stmt = tx.prepare_cached(
        "
        select ai.id, ai.status, ai.width, ai.height, ai.format, di.original_item_id
        from abstract_item ai
        inner join derived_item di on di.id = ai.id
        where di.original_item_id = ? and di.width = ? and di.height = ? and di.format = ?
        ",
    )?;
    let item = stmt
        .query_row((original_id, size.0, size.1, format), |row| {
            let abstract_item = row_to_abstract_item(
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
            );
            let original_id: String = row.get(5)?;
            Ok(DerivedItem {
                abstract_item,
                original_id,
            })
        })
        .optional()?;
    Ok(item)
}

pub(crate) fn find_inconsistent_originals(
    tx: &rusqlite::Transaction,
    limit: u32,
) -> Result<Vec<OriginalItem>, StoreError> {
    let mut stmt = tx.prepare_cached(
        "
        select ai.id, ai.status, ai.width, ai.height, ai.format
        from abstract_item ai
        inner join original_item oi on oi.id = ai.id
        where ai.status = 'INCONSISTENT'
        limit ?
        ",
    )?;
    let mut rows = stmt.query([limit])?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(OriginalItem {
            abstract_item: row_to_abstract_item(
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
            ),
        });
    }
    Ok(items)
}

pub(crate) fn find_inconsistent_deriveds(
    tx: &rusqlite::Transaction,
    limit: u32,
) -> Result<Vec<DerivedItem>, StoreError> {
    let mut stmt = tx.prepare_cached(
        "
        select ai.id, ai.status, ai.width, ai.height, ai.format, di.original_item_id
        from abstract_item ai
        inner join derived_item di on di.id = ai.id
        where ai.status = 'INCONSISTENT'
        limit ?
        ",
    )?;
    let mut rows = stmt.query([limit])?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        let abstract_item = row_to_abstract_item(
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
        );
        let original_id: String = row.get(5)?;
        items.push(DerivedItem {
            abstract_item,
            original_id,
        });
    }
    Ok(items)
}

pub(crate) fn create_original(
    tx: &rusqlite::Transaction,
    item: &OriginalItem,
) -> Result<(), StoreError> {
    insert_abstract(tx, &item.abstract_item)?;
    tx.prepare_cached("insert into original_item (id) values (?)")
        .and_then(|mut stmt| stmt.execute([item.id()]))
        .map_err(StoreError::from_insert)?;
    Ok(())
}

pub(crate) fn create_derived(
    tx: &rusqlite::Transaction,
    item: &DerivedItem,
) -> Result<(), StoreError> {
    insert_abstract(tx, &item.abstract_item)?;
    tx.prepare_cached(
        "insert into derived_item (id, original_item_id, width, height, format) values (?, ?, ?, ?, ?)",
    )
    .and_then(|mut stmt| {
        stmt.execute((
            item.id(),
            &item.original_id,
            item.abstract_item.width,
            item.abstract_item.height,
            &item.abstract_item.format,
        ))
    })
    .map_err(StoreError::from_insert)?;
    Ok(())
}

fn insert_abstract(tx: &rusqlite::Transaction, item: &AbstractItem) -> Result<(), StoreError> {
    tx.prepare_cached(
        "insert into abstract_item (id, status, width, height, format) values (?, ?, ?, ?, ?)",
    )
    .and_then(|mut stmt| {
        stmt.execute((
            &item.id,
            item.status.as_str(),
            item.width,
            item.height,
            &item.format,
        ))
    })
    .map_err(StoreError::from_insert)?;
    Ok(())
}

pub(crate) fn update_abstract(
    tx: &rusqlite::Transaction,
    item: &AbstractItem,
) -> Result<(), StoreError> {
    let mut stmt = tx.prepare_cached(
        "update abstract_item set status = ?, width = ?, height = ?, format = ? where id = ?",
    )?;
    stmt.execute((
        item.status.as_str(),
        item.width,
        item.height,
        &item.format,
        &item.id,
    ))?;
    Ok(())
}

pub(crate) fn delete_abstract(tx: &rusqlite::Transaction, id: &str) -> Result<(), StoreError> {
    tx.prepare_cached("delete from derived_item where id = ? or original_item_id = ?")
        .and_then(|mut stmt| stmt.execute((id, id)))?;
    tx.prepare_cached("delete from original_item where id = ?")
        .and_then(|mut stmt| stmt.execute([id]))?;
    tx.prepare_cached("delete from abstract_item where id = ?")
        .and_then(|mut stmt| stmt.execute([id]))?;
    Ok(())
}
