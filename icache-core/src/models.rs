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

use serde::{Deserialize, Serialize};

/// Lifecycle state shared by every concrete item kind.
///
/// A row is created `Inconsistent` inside the same transaction that will
/// eventually materialise its file; only after the file is fully written
/// does it transition to `Ok`. A crash between those two writes leaves an
/// `Inconsistent` row for the next boot's reconciliation pass to clean up.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemStatus {
    Inconsistent,
    Ok,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Inconsistent => "INCONSISTENT",
            ItemStatus::Ok => "OK",
        }
    }

    pub fn from_str(s: &str) -> Option<ItemStatus> {
        match s {
            "INCONSISTENT" => Some(ItemStatus::Inconsistent),
            "OK" => Some(ItemStatus::Ok),
            _ => None,
        }
    }
}

/// Fields every item kind carries, mirrored by the `abstract_item` table.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AbstractItem {
    pub id: String,
    pub status: ItemStatus,
    pub width: u32,
    pub height: u32,
    pub format: String,
}

/// An image ingested by caller-supplied id, stored verbatim under
/// `pictures/`. `id` is restricted to `[A-Za-z0-9]+`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct OriginalItem {
    pub abstract_item: AbstractItem,
}

impl OriginalItem {
    pub fn new(id: impl Into<String>, width: u32, height: u32, format: impl Into<String>) -> Self {
        OriginalItem {
            abstract_item: AbstractItem {
                id: id.into(),
                status: ItemStatus::Inconsistent,
                width,
                height,
                format: format.into().to_uppercase(),
            },
        }
    }

    pub fn id(&self) -> &str {
        &self.abstract_item.id
    }

    pub fn status(&self) -> ItemStatus {
        self.abstract_item.status
    }

    pub fn size(&self) -> (u32, u32) {
        (self.abstract_item.width, self.abstract_item.height)
    }
}

/// A rendition of an original at a specific size and format, stored under
/// `cache/`. `id` is the deterministic `"{original_id}-{w}x{h}.{ext}"`
/// string, aligning the row's primary key with the cache filename (see the
/// specification's resolved open question on derived-item identity).
///
/// The reference to the parent is a plain `original_id: String`, never an
/// owning handle: back-references are pure lookups, reloaded on demand via
/// `ItemRepository::find_original`, per the teacher's own redesign note
/// against cyclic parent pointers.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DerivedItem {
    pub abstract_item: AbstractItem,
    pub original_id: String,
}

impl DerivedItem {
    pub fn new(
        original_id: impl Into<String>,
        width: u32,
        height: u32,
        format: impl Into<String>,
        ext: &str,
    ) -> Self {
        let original_id = original_id.into();
        let format = format.into().to_uppercase();
        let id = format!("{original_id}-{width}x{height}.{ext}");
        DerivedItem {
            abstract_item: AbstractItem {
                id,
                status: ItemStatus::Inconsistent,
                width,
                height,
                format,
            },
            original_id,
        }
    }

    pub fn id(&self) -> &str {
        &self.abstract_item.id
    }

    pub fn status(&self) -> ItemStatus {
        self.abstract_item.status
    }

    pub fn size(&self) -> (u32, u32) {
        (self.abstract_item.width, self.abstract_item.height)
    }
}
