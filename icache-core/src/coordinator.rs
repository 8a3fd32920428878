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

use crate::codec::ImageCodec;
use crate::error::{CacheError, StoreError};
use crate::layout::CacheLayout;
use crate::models::{DerivedItem, ItemStatus, OriginalItem};
use crate::store::ItemRepository;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Another worker may be mid-ingest; this bounds how long a caller waits
/// for a row to settle before a cache miss is treated as a failure, per the
/// specification's polling-based wait-for-consistency.
pub const LOCK_MAX_RETRIES: u32 = 10;
pub const LOCK_WAIT: Duration = Duration::from_secs(1);

/// Either a filename on disk or an in-memory byte stream. Byte streams are
/// always treated as already positioned at offset 0 -- there is no seek
/// state to rewind in this representation, unlike a long-lived file handle.
pub enum ImageSource {
    File(PathBuf),
    Bytes(Vec<u8>),
}

/// A caller's request to materialise a rendition of `image_id` at `size` in
/// `target_format`.
#[derive(Clone, Debug)]
pub struct TransformRequest {
    pub image_id: String,
    pub size: (u32, u32),
    pub target_format: String,
}

/// The coordinator API, factored out as a trait so `SizeGuard` can wrap a
/// `TransformCoordinator` behind the identical interface -- plain
/// composition instead of the teacher's redesign-flagged alternative of
/// patching a method in at construction time.
#[async_trait::async_trait]
pub trait Transform: Send + Sync {
    async fn save_original(&self, source: ImageSource, image_id: &str) -> Result<(), CacheError>;

    async fn prepare_transformation(&self, request: TransformRequest) -> Result<String, CacheError>;

    async fn get_original_path(&self, image_id: &str) -> Result<String, CacheError>;
}

fn is_valid_identifier(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Orchestrates ingest, transform, cache lookup, wait-for-consistency, and
/// reconciliation. The crux of the system -- see `SPEC_FULL.md` §4.5 for the
/// exact algorithm this implements.
pub struct TransformCoordinator {
    repo: ItemRepository,
    layout: CacheLayout,
    codec: Arc<dyn ImageCodec>,
}

/// Page size for the reconciliation passes below -- bounds how many rows (and
/// open file handles) a single transaction touches at once.
const RECONCILE_PAGE_SIZE: u32 = 100;

impl TransformCoordinator {
    pub fn new(repo: ItemRepository, layout: CacheLayout, codec: Arc<dyn ImageCodec>) -> Self {
        TransformCoordinator { repo, layout, codec }
    }

    /// Startup reconciliation: delete every row (and any file it partially
    /// wrote) left `Inconsistent` by a prior crash. Runs in two paginated
    /// passes, derived items before originals, so a cascade delete of an
    /// original never races an in-flight pass over its derivatives.
    pub async fn cleanup_inconsistent(&self) -> Result<(), CacheError> {
        loop {
            let page = self
                .repo
                .find_inconsistent_deriveds(RECONCILE_PAGE_SIZE)
                .await?;
            if page.is_empty() {
                break;
            }
            for item in &page {
                let path = self.layout.derived_abs(item);
                if let Err(err) = tokio::fs::remove_file(&path).await {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        return Err(CacheError::Processing(err.to_string()));
                    }
                }
                self.repo.delete_derived(item).await?;
            }
            info!(count = page.len(), "reconciled inconsistent derived items");
        }

        loop {
            let page = self
                .repo
                .find_inconsistent_originals(RECONCILE_PAGE_SIZE)
                .await?;
            if page.is_empty() {
                break;
            }
            for item in &page {
                let path = self.layout.original_abs(item);
                if let Err(err) = tokio::fs::remove_file(&path).await {
                    if err.kind() != std::io::ErrorKind::NotFound {
                        return Err(CacheError::Processing(err.to_string()));
                    }
                }
                self.repo.delete_original(item).await?;
            }
            info!(count = page.len(), "reconciled inconsistent original items");
        }

        Ok(())
    }

    /// Poll a `find_*` lookup until the row is `Ok`, disappears, or
    /// `LOCK_MAX_RETRIES` is exhausted. Distinguishes the three outcomes so
    /// callers can surface the correct error -- in particular, retry
    /// exhaustion while the row is still `Inconsistent` is reported as
    /// `CacheError::Processing`, not silently returned as if ready (the
    /// specification's explicit fix for the system this was derived from).
    /// Shared by `wait_for_original` and `wait_for_derived`, which differ
    /// only in which repository lookup and status accessor they supply.
    async fn poll_until_ok<T, Fut>(
        status_of: fn(&T) -> ItemStatus,
        mut fetch: impl FnMut() -> Fut,
        missing_err: impl Fn() -> CacheError,
        timeout_err: impl Fn() -> CacheError,
    ) -> Result<T, CacheError>
    where
        Fut: std::future::Future<Output = Result<Option<T>, StoreError>>,
    {
        let mut current = fetch().await?.ok_or_else(&missing_err)?;

        let mut attempt = 0;
        while status_of(&current) != ItemStatus::Ok && attempt < LOCK_MAX_RETRIES {
            tokio::time::sleep(LOCK_WAIT).await;
            match fetch().await? {
                Some(item) => current = item,
                None => return Err(missing_err()),
            }
            attempt += 1;
        }

        if status_of(&current) != ItemStatus::Ok {
            return Err(timeout_err());
        }
        Ok(current)
    }

    async fn wait_for_original(&self, image_id: &str) -> Result<OriginalItem, CacheError> {
        Self::poll_until_ok(
            OriginalItem::status,
            || self.repo.find_original(image_id),
            || CacheError::ItemDoesNotExist(image_id.to_string()),
            || {
                CacheError::Processing(format!(
                    "timed out waiting for original '{image_id}' to become consistent"
                ))
            },
        )
        .await
    }

    /// Same shape as `wait_for_original`, for the create-or-join path on a
    /// derived item that another worker is already rendering.
    async fn wait_for_derived(
        &self,
        original_id: &str,
        size: (u32, u32),
        format: &str,
    ) -> Result<DerivedItem, CacheError> {
        Self::poll_until_ok(
            DerivedItem::status,
            || self.repo.find_derived(original_id, size, format),
            || CacheError::ItemDoesNotExist(original_id.to_string()),
            || {
                CacheError::Processing(format!(
                    "timed out waiting for derived rendition of '{original_id}' to become consistent"
                ))
            },
        )
        .await
    }
}

#[async_trait::async_trait]
impl Transform for TransformCoordinator {
    async fn save_original(&self, source: ImageSource, image_id: &str) -> Result<(), CacheError> {
        if !is_valid_identifier(image_id) {
            return Err(CacheError::InvalidIdentifier);
        }

        let (info, format) = match &source {
            ImageSource::File(path) => {
                let codec = self.codec.clone();
                let path = path.clone();
                tokio::task::spawn_blocking(move || codec.decode_and_verify(&path))
                    .await
                    .map_err(|e| CacheError::Processing(e.to_string()))?
                    .map_err(|_| CacheError::NotRecognized)?
            }
            ImageSource::Bytes(bytes) => {
                let codec = self.codec.clone();
                let bytes = bytes.clone();
                tokio::task::spawn_blocking(move || codec.decode_and_verify_bytes(&bytes))
                    .await
                    .map_err(|e| CacheError::Processing(e.to_string()))?
                    .map_err(|_| CacheError::NotRecognized)?
            }
        };

        let item = OriginalItem::new(image_id, info.width, info.height, format);

        match self.repo.create_original(&item).await {
            Ok(()) => {}
            Err(StoreError::Unique) => return Err(CacheError::AlreadyExists),
            Err(err) => return Err(err.into()),
        }
        debug!(image_id, "original row created, materialising file");

        let dest = self.layout.original_abs(&item);
        let write_result = match source {
            ImageSource::File(path) => tokio::fs::copy(&path, &dest).await.map(|_| ()),
            ImageSource::Bytes(bytes) => {
                let result = tokio::fs::write(&dest, &bytes).await;
                if result.is_ok() {
                    if let Ok(file) = tokio::fs::File::open(&dest).await {
                        let _ = file.sync_all().await;
                    }
                }
                result
            }
        };

        if let Err(err) = write_result {
            warn!(image_id, %err, "failed to materialise original file, leaving row inconsistent for reconciliation");
            return Err(CacheError::Processing(err.to_string()));
        }

        let mut item = item;
        item.abstract_item.status = ItemStatus::Ok;
        self.repo.update_original(&item).await?;
        info!(image_id, "original ingested");
        Ok(())
    }

    async fn prepare_transformation(&self, request: TransformRequest) -> Result<String, CacheError> {
        let original = self.wait_for_original(&request.image_id).await?;

        let ext = CacheLayout::ext(&request.target_format);
        let tentative = DerivedItem::new(
            original.id(),
            request.size.0,
            request.size.1,
            request.target_format.as_str(),
            &ext,
        );
        let cache_abs = self.layout.derived_abs(&tentative);
        let cache_rel = CacheLayout::derived_rel(&tentative);

        if tokio::fs::try_exists(&cache_abs).await.unwrap_or(false) {
            debug!(id = tentative.id(), "fast path: cached rendition already exists");
            return Ok(cache_rel.to_string_lossy().into_owned());
        }

        let derived = match self.repo.create_derived(&tentative).await {
            Ok(()) => tentative,
            Err(StoreError::Unique) => {
                debug!(
                    id = tentative.id(),
                    "another worker owns this rendition, joining its wait"
                );
                self.wait_for_derived(
                    original.id(),
                    request.size,
                    &request.target_format.to_uppercase(),
                )
                .await?
            }
            Err(err) => return Err(err.into()),
        };

        // If create_derived raced us and we joined an already-finished
        // rendition, there is nothing left to render.
        if derived.status() == ItemStatus::Ok {
            return Ok(cache_rel.to_string_lossy().into_owned());
        }

        let original_abs = self.layout.original_abs(&original);
        let is_identity = request.size == original.size()
            && request.target_format.to_uppercase() == original.abstract_item.format;

        let render_result = if is_identity {
            tokio::fs::copy(&original_abs, &cache_abs)
                .await
                .map(|_| ())
                .map_err(|e| e.to_string())
        } else {
            let codec = self.codec.clone();
            let (w, h) = request.size;
            let target_format = request.target_format.clone();
            let original_abs = original_abs.clone();
            let cache_abs = cache_abs.clone();
            tokio::task::spawn_blocking(move || {
                codec.resize_fit(&original_abs, &cache_abs, w, h, &target_format)
            })
            .await
            .map_err(|e| e.to_string())
            .and_then(|inner| inner.map_err(|e| e.to_string()))
        };

        if let Err(err) = render_result {
            warn!(
                id = derived.id(),
                %err,
                "failed to materialise derived rendition, leaving row inconsistent for reconciliation"
            );
            return Err(CacheError::Processing(err));
        }

        let mut derived = derived;
        derived.abstract_item.status = ItemStatus::Ok;
        self.repo.update_derived(&derived).await?;
        info!(id = derived.id(), "derived rendition rendered");
        Ok(cache_rel.to_string_lossy().into_owned())
    }

    async fn get_original_path(&self, image_id: &str) -> Result<String, CacheError> {
        let original = self.wait_for_original(image_id).await?;
        Ok(CacheLayout::original_rel(&original)
            .to_string_lossy()
            .into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::RealCodec;
    use crate::store::MetadataStore;
    use image::{ImageBuffer, Rgb};

    fn write_test_jpeg(path: &std::path::Path, width: u32, height: u32) {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_fn(width, height, |_, _| Rgb([10, 20, 30]));
        img.save(path).unwrap();
    }

    async fn new_coordinator(data_dir: &std::path::Path) -> TransformCoordinator {
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
        TransformCoordinator::new(repo, layout, Arc::new(RealCodec::new()))
    }

    #[tokio::test]
    async fn ingest_then_transform_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("sami-src.jpg");
        write_test_jpeg(&source, 200, 200);

        let coordinator = new_coordinator(dir.path()).await;
        coordinator
            .save_original(ImageSource::File(source), "sami")
            .await
            .unwrap();

        let rel = coordinator
            .prepare_transformation(TransformRequest {
                image_id: "sami".to_string(),
                size: (100, 100),
                target_format: "jpg".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(rel, "cache/sami-100x100.jpg");
        let abs = dir.path().join(&rel);
        assert!(abs.exists());
        let (info, _) = RealCodec::new().decode_and_verify(&abs).unwrap();
        assert_eq!((info.width, info.height), (100, 100));
    }

    #[tokio::test]
    async fn duplicate_ingest_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("sami-src.jpg");
        write_test_jpeg(&source, 64, 64);

        let coordinator = new_coordinator(dir.path()).await;
        coordinator
            .save_original(ImageSource::File(source.clone()), "sami")
            .await
            .unwrap();

        let err = coordinator
            .save_original(ImageSource::File(source), "sami")
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::AlreadyExists));

        // the first ingest's file must remain intact
        let original_abs = dir.path().join("pictures/sami.jpg");
        assert!(original_abs.exists());
    }

    #[tokio::test]
    async fn identity_transform_is_byte_exact_copy() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("sami-src.jpg");
        write_test_jpeg(&source, 120, 80);

        let coordinator = new_coordinator(dir.path()).await;
        coordinator
            .save_original(ImageSource::File(source), "sami")
            .await
            .unwrap();

        let rel = coordinator
            .prepare_transformation(TransformRequest {
                image_id: "sami".to_string(),
                size: (120, 80),
                target_format: "JPEG".to_string(),
            })
            .await
            .unwrap();

        let original_bytes = tokio::fs::read(dir.path().join("pictures/sami.jpg"))
            .await
            .unwrap();
        let cached_bytes = tokio::fs::read(dir.path().join(&rel)).await.unwrap();
        assert_eq!(original_bytes, cached_bytes);
    }

    #[tokio::test]
    async fn fast_path_does_not_rerender() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("sami-src.jpg");
        write_test_jpeg(&source, 200, 200);

        let coordinator = new_coordinator(dir.path()).await;
        coordinator
            .save_original(ImageSource::File(source), "sami")
            .await
            .unwrap();

        let request = TransformRequest {
            image_id: "sami".to_string(),
            size: (50, 50),
            target_format: "jpg".to_string(),
        };
        let rel = coordinator
            .prepare_transformation(request.clone())
            .await
            .unwrap();
        let abs = dir.path().join(&rel);
        let mtime1 = tokio::fs::metadata(&abs).await.unwrap().modified().unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        let rel2 = coordinator.prepare_transformation(request).await.unwrap();
        let mtime2 = tokio::fs::metadata(&abs).await.unwrap().modified().unwrap();

        assert_eq!(rel, rel2);
        assert_eq!(mtime1, mtime2);
    }

    #[tokio::test]
    async fn non_alphanumeric_id_is_rejected_before_any_state_changes() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("sami-src.jpg");
        write_test_jpeg(&source, 10, 10);

        let coordinator = new_coordinator(dir.path()).await;
        let err = coordinator
            .save_original(ImageSource::File(source), "a/b")
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::InvalidIdentifier));

        let mut entries = tokio::fs::read_dir(dir.path().join("pictures")).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cleanup_removes_inconsistent_rows_and_their_files() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = new_coordinator(dir.path()).await;

        let orphan = crate::models::OriginalItem::new("crashed", 10, 10, "PNG");
        coordinator
            .repo
            .create_original(&orphan)
            .await
            .unwrap();
        let stray_path = coordinator.layout.original_abs(&orphan);
        tokio::fs::write(&stray_path, b"partial").await.unwrap();

        coordinator.cleanup_inconsistent().await.unwrap();

        assert!(coordinator
            .repo
            .find_original("crashed")
            .await
            .unwrap()
            .is_none());
        assert!(!stray_path.exists());
    }

    #[tokio::test]
    async fn concurrent_joiners_observe_a_single_render() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("sami-src.jpg");
        write_test_jpeg(&source, 300, 300);

        let coordinator = Arc::new(new_coordinator(dir.path()).await);
        coordinator
            .save_original(ImageSource::File(source), "sami")
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let coordinator = coordinator.clone();
            handles.push(tokio::spawn(async move {
                coordinator
                    .prepare_transformation(TransformRequest {
                        image_id: "sami".to_string(),
                        size: (80, 80),
                        target_format: "jpg".to_string(),
                    })
                    .await
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }
        assert!(results.iter().all(|rel| rel == "cache/sami-80x80.jpg"));
    }

    #[tokio::test]
    async fn missing_original_fails_with_item_does_not_exist() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = new_coordinator(dir.path()).await;
        let err = coordinator
            .prepare_transformation(TransformRequest {
                image_id: "nope".to_string(),
                size: (10, 10),
                target_format: "jpg".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::ItemDoesNotExist(_)));
    }
}
