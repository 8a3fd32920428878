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

use crate::coordinator::{ImageSource, Transform, TransformRequest};
use crate::error::CacheError;
use std::collections::HashSet;

/// Wraps any `Transform` and rejects sizes outside a configured whitelist
/// before the request ever reaches the repository or filesystem. A
/// composition-based decorator, not a method patched onto the coordinator
/// at construction time: the wrapped coordinator is never aware it is being
/// guarded.
///
/// `None` disables the check entirely -- every size is accepted, matching
/// the specification's "whitelist absent or empty means unrestricted".
pub struct SizeGuard<C: Transform> {
    inner: C,
    allowed_sizes: Option<HashSet<(u32, u32)>>,
}

impl<C: Transform> SizeGuard<C> {
    pub fn new(inner: C, allowed_sizes: Option<HashSet<(u32, u32)>>) -> SizeGuard<C> {
        let allowed_sizes = match allowed_sizes {
            Some(sizes) if sizes.is_empty() => None,
            other => other,
        };
        SizeGuard { inner, allowed_sizes }
    }

    fn is_allowed(&self, size: (u32, u32)) -> bool {
        match &self.allowed_sizes {
            None => true,
            Some(sizes) => sizes.contains(&size),
        }
    }
}

#[async_trait::async_trait]
impl<C: Transform> Transform for SizeGuard<C> {
    async fn save_original(&self, source: ImageSource, image_id: &str) -> Result<(), CacheError> {
        self.inner.save_original(source, image_id).await
    }

    async fn prepare_transformation(&self, request: TransformRequest) -> Result<String, CacheError> {
        if !self.is_allowed(request.size) {
            return Err(CacheError::ForbiddenSize);
        }
        self.inner.prepare_transformation(request).await
    }

    async fn get_original_path(&self, image_id: &str) -> Result<String, CacheError> {
        self.inner.get_original_path(image_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RealCodec;
    use crate::layout::CacheLayout;
    use crate::store::{ItemRepository, MetadataStore};
    use crate::coordinator::TransformCoordinator;
    use image::{ImageBuffer, Rgb};
    use std::sync::Arc;

    fn write_test_jpeg(path: &std::path::Path, width: u32, height: u32) {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_fn(width, height, |_, _| Rgb([1, 2, 3]));
        img.save(path).unwrap();
    }

    async fn new_guarded(
        data_dir: &std::path::Path,
        allowed_sizes: Option<HashSet<(u32, u32)>>,
    ) -> SizeGuard<TransformCoordinator> {
        let store = Arc::new(MetadataStore::open_in_memory().unwrap());
        store.create_or_upgrade_schema().await.unwrap();
        let repo = ItemRepository::new(store);
        let layout = CacheLayout::new(data_dir);
        tokio::fs::create_dir_all(layout.pictures_directory())
            .await
            .unwrap();
        tokio::fs::create_dir_all(layout.cache_directory())
            .await
            .unwrap();
        let coordinator = TransformCoordinator::new(repo, layout, Arc::new(RealCodec::new()));
        SizeGuard::new(coordinator, allowed_sizes)
    }

    #[tokio::test]
    async fn forbidden_size_is_rejected_before_any_work() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("sami-src.jpg");
        write_test_jpeg(&source, 200, 200);

        let mut allowed = HashSet::new();
        allowed.insert((100, 100));
        let guard = new_guarded(dir.path(), Some(allowed)).await;

        guard
            .save_original(ImageSource::File(source), "sami")
            .await
            .unwrap();

        let err = guard
            .prepare_transformation(TransformRequest {
                image_id: "sami".to_string(),
                size: (64, 64),
                target_format: "jpg".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::ForbiddenSize));

        let mut entries = tokio::fs::read_dir(dir.path().join("cache")).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn allowed_size_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("sami-src.jpg");
        write_test_jpeg(&source, 200, 200);

        let mut allowed = HashSet::new();
        allowed.insert((100, 100));
        let guard = new_guarded(dir.path(), Some(allowed)).await;

        guard
            .save_original(ImageSource::File(source), "sami")
            .await
            .unwrap();

        let rel = guard
            .prepare_transformation(TransformRequest {
                image_id: "sami".to_string(),
                size: (100, 100),
                target_format: "jpg".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(rel, "cache/sami-100x100.jpg");
    }

    #[tokio::test]
    async fn no_whitelist_allows_any_size() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("sami-src.jpg");
        write_test_jpeg(&source, 200, 200);

        let guard = new_guarded(dir.path(), None).await;
        guard
            .save_original(ImageSource::File(source), "sami")
            .await
            .unwrap();

        let rel = guard
            .prepare_transformation(TransformRequest {
                image_id: "sami".to_string(),
                size: (37, 41),
                target_format: "jpg".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(rel, "cache/sami-37x41.jpg");
    }
}
