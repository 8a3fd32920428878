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

pub mod bootstrap;
pub mod config;

use anyhow::Context;
use clap::Parser;
use config::{IcachedArgs, IcachedConfig};
use icache_core::Transform;
use std::sync::Arc;
use tracing::info;

/// Parses CLI args, loads and merges the YAML config, boots the
/// coordinator, and runs reconciliation. Returns the guarded coordinator
/// handle; the caller decides what to do with it (serve requests, run a
/// one-shot command, etc.) -- this crate draws no networking boundary of
/// its own, matching the distilled specification's silence on transport.
pub async fn imain() -> anyhow::Result<Arc<dyn Transform>> {
    tracing_subscriber::fmt::init();
    let args = IcachedArgs::parse();

    info!(path = ?args.config_path, "loading configuration");
    let mut config = if args.config_path.exists() {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .open(&args.config_path)
            .with_context(|| format!("opening {:?}", args.config_path))?;
        serde_yaml::from_reader(file).context("parsing configuration file")?
    } else {
        IcachedConfig::default()
    };
    config.merge(args);
    info!(?config, "resolved configuration");

    bootstrap::Bootstrapper::run(&config).await
}

#[cfg(test)]
mod tests {}
