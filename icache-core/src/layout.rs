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

use crate::models::{DerivedItem, OriginalItem};
use std::path::{Path, PathBuf};

const CACHE_DIRECTORY: &str = "cache";
const ORIGINAL_DIRECTORY: &str = "pictures";

/// Pure mapping from domain entities to on-disk paths, rooted at a
/// configured `data_directory`. Holds no state beyond that root and never
/// touches the filesystem itself.
#[derive(Clone, Debug)]
pub struct CacheLayout {
    data_directory: PathBuf,
}

impl CacheLayout {
    pub fn new(data_directory: impl Into<PathBuf>) -> CacheLayout {
        CacheLayout {
            data_directory: data_directory.into(),
        }
    }

    pub fn data_directory(&self) -> &Path {
        &self.data_directory
    }

    pub fn pictures_directory(&self) -> PathBuf {
        self.data_directory.join(ORIGINAL_DIRECTORY)
    }

    pub fn cache_directory(&self) -> PathBuf {
        self.data_directory.join(CACHE_DIRECTORY)
    }

    /// `ext(format) = FORMAT_EXTENSIONS[format.upper()]` if present, else
    /// `format.lower()`. Case-insensitive by construction.
    pub fn ext(format: &str) -> String {
        match format.to_uppercase().as_str() {
            "JPEG" => "jpg".to_string(),
            other => other.to_lowercase(),
        }
    }

    pub fn original_rel(item: &OriginalItem) -> PathBuf {
        let ext = Self::ext(&item.abstract_item.format);
        PathBuf::from(ORIGINAL_DIRECTORY).join(format!("{}.{}", item.id(), ext))
    }

    pub fn original_abs(&self, item: &OriginalItem) -> PathBuf {
        self.data_directory.join(Self::original_rel(item))
    }

    pub fn derived_rel(item: &DerivedItem) -> PathBuf {
        PathBuf::from(CACHE_DIRECTORY).join(item.id())
    }

    pub fn derived_abs(&self, item: &DerivedItem) -> PathBuf {
        self.data_directory.join(Self::derived_rel(item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DerivedItem, OriginalItem};

    #[test]
    fn ext_is_case_insensitive() {
        assert_eq!(CacheLayout::ext("JPEG"), "jpg");
        assert_eq!(CacheLayout::ext("jpeg"), "jpg");
        assert_eq!(CacheLayout::ext("Jpeg"), "jpg");
        assert_eq!(CacheLayout::ext("PNG"), "png");
        assert_eq!(CacheLayout::ext("png"), "png");
    }

    #[test]
    fn original_paths() {
        let layout = CacheLayout::new("/data");
        let item = OriginalItem::new("sami", 640, 480, "JPEG");
        assert_eq!(
            CacheLayout::original_rel(&item),
            PathBuf::from("pictures/sami.jpg")
        );
        assert_eq!(layout.original_abs(&item), PathBuf::from("/data/pictures/sami.jpg"));
    }

    #[test]
    fn derived_paths() {
        let layout = CacheLayout::new("/data");
        let item = DerivedItem::new("sami", 100, 100, "JPEG", "jpg");
        assert_eq!(item.id(), "sami-100x100.jpg");
        assert_eq!(
            CacheLayout::derived_rel(&item),
            PathBuf::from("cache/sami-100x100.jpg")
        );
        assert_eq!(
            layout.derived_abs(&item),
            PathBuf::from("/data/cache/sami-100x100.jpg")
        );
    }
}
