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

use thiserror::Error;

/// Errors surfaced by `MetadataStore`/`ItemRepository`. Never leaves the
/// `store` module boundary in this form — callers see `CacheError`.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unique constraint violated")]
    Unique,
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Classifies a raw `rusqlite::Error` coming out of an insert, so the
    /// repository can translate uniqueness violations without matching on
    /// SQL error text.
    pub fn from_insert(err: rusqlite::Error) -> StoreError {
        use rusqlite::ffi::ErrorCode;
        if let rusqlite::Error::SqliteFailure(ref e, _) = err {
            if e.code == ErrorCode::ConstraintViolation {
                return StoreError::Unique;
            }
        }
        StoreError::Sqlite(err)
    }
}

/// Errors surfaced by `TransformCoordinator` / `SizeGuard`, the coordinator
/// API's public error type. Mirrors the distilled specification's
/// language-neutral error kinds one-to-one.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("identifier is not alphanumeric")]
    InvalidIdentifier,
    #[error("source could not be decoded as an image")]
    NotRecognized,
    #[error("an image with this id already exists")]
    AlreadyExists,
    #[error("item does not exist: {0}")]
    ItemDoesNotExist(String),
    #[error("requested size is not in the whitelist")]
    ForbiddenSize,
    #[error("image processing failed: {0}")]
    Processing(String),
}

impl From<StoreError> for CacheError {
    fn from(value: StoreError) -> CacheError {
        CacheError::Processing(value.to_string())
    }
}
