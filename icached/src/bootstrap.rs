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

use crate::config::IcachedConfig;
use anyhow::Context;
use icache_core::{CacheLayout, ImageCodec, ItemRepository, MetadataStore, RealCodec, SizeGuard,
    Transform, TransformCoordinator};
use std::io::ErrorKind;
use std::sync::Arc;
use tracing::info;

/// Builds a fully wired `Transform` handle from a resolved `IcachedConfig`.
/// No process-wide singleton is kept here: the caller owns the returned
/// `Arc` and can construct as many independent instances as it needs (one
/// per test, for instance).
pub struct Bootstrapper;

impl Bootstrapper {
    pub async fn run(config: &IcachedConfig) -> anyhow::Result<Arc<dyn Transform>> {
        let layout = CacheLayout::new(&config.data_directory);

        if config.drop_data {
            info!(dburi = %config.dburi, dir = ?config.data_directory, "drop_data set, wiping existing state");
            if let Ok(store) = open_store(&config.dburi) {
                let _ = store.drop_all_tables().await;
            }
            match std::fs::remove_dir_all(&config.data_directory) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err).context("failed to wipe data_directory"),
            }
        }

        create_dir_tolerant(&config.data_directory)?;
        create_dir_tolerant(&layout.pictures_directory())?;
        create_dir_tolerant(&layout.cache_directory())?;

        let store = Arc::new(open_store(&config.dburi).context("failed to open metadata store")?);
        store.create_or_upgrade_schema().await?;

        let repo = ItemRepository::new(store);
        let codec: Arc<dyn ImageCodec> = Arc::new(RealCodec::new());
        let coordinator = TransformCoordinator::new(repo, layout, codec);

        coordinator
            .cleanup_inconsistent()
            .await
            .context("startup reconciliation failed")?;
        info!("startup reconciliation complete");

        let guarded = SizeGuard::new(coordinator, config.allowed_sizes_set());
        Ok(Arc::new(guarded))
    }
}

fn open_store(dburi: &str) -> Result<MetadataStore, icache_core::StoreError> {
    if dburi == ":memory:" {
        MetadataStore::open_in_memory()
    } else {
        MetadataStore::open_file(dburi)
    }
}

fn create_dir_tolerant(path: &std::path::Path) -> anyhow::Result<()> {
    match std::fs::create_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(err) => Err(err).with_context(|| format!("error creating {path:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IcachedConfig;

    #[tokio::test]
    async fn boots_and_reconciles_clean_state() {
        let dir = tempfile::tempdir().unwrap();
        let config = IcachedConfig {
            data_directory: dir.path().to_path_buf(),
            dburi: ":memory:".to_string(),
            allowed_sizes: None,
            drop_data: false,
        };

        let handle = Bootstrapper::run(&config).await.unwrap();
        assert!(dir.path().join("pictures").is_dir());
        assert!(dir.path().join("cache").is_dir());

        let err = handle.get_original_path("nope").await.unwrap_err();
        assert!(matches!(err, icache_core::CacheError::ItemDoesNotExist(_)));
    }

    #[tokio::test]
    async fn drop_data_wipes_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pictures")).unwrap();
        std::fs::write(dir.path().join("pictures/stale.jpg"), b"stale").unwrap();

        let config = IcachedConfig {
            data_directory: dir.path().to_path_buf(),
            dburi: ":memory:".to_string(),
            allowed_sizes: None,
            drop_data: true,
        };

        Bootstrapper::run(&config).await.unwrap();
        assert!(!dir.path().join("pictures/stale.jpg").exists());
        assert!(dir.path().join("pictures").is_dir());
    }
}
