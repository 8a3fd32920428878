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

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

fn default_data_directory() -> PathBuf {
    PathBuf::from("/var/db/icached")
}

fn default_dburi() -> String {
    "/var/db/icached/icached.sqlite".to_string()
}

/// CLI overlay for `IcachedConfig`. Every field is optional so that an
/// unset flag leaves the value loaded from the YAML config file untouched.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
pub struct IcachedArgs {
    /// Root directory holding `pictures/` and `cache/`
    #[arg(long = "data-directory")]
    pub data_directory: Option<PathBuf>,

    /// SQLite database URI, or `:memory:` for an ephemeral store
    #[arg(long = "dburi")]
    pub dburi: Option<String>,

    /// Drop all tables and wipe `data_directory` before starting up
    #[arg(long = "drop-data", action)]
    pub drop_data: Option<bool>,

    #[arg(long = "config", default_value = "/usr/local/etc/icached.yaml")]
    pub config_path: PathBuf,
}

/// Whitelist entry `(width, height)`, deserialised from a two-element
/// sequence in the YAML config file (`[100, 100]`).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SizePair(pub u32, pub u32);

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct IcachedConfig {
    #[serde(default = "default_data_directory")]
    pub data_directory: PathBuf,

    #[serde(default = "default_dburi")]
    pub dburi: String,

    /// Omitted or empty disables the size whitelist entirely.
    #[serde(default)]
    pub allowed_sizes: Option<Vec<SizePair>>,

    #[serde(default)]
    pub drop_data: bool,
}

impl Default for IcachedConfig {
    fn default() -> Self {
        IcachedConfig {
            data_directory: default_data_directory(),
            dburi: default_dburi(),
            allowed_sizes: None,
            drop_data: false,
        }
    }
}

impl IcachedConfig {
    pub fn merge(&mut self, args: IcachedArgs) {
        if let Some(data_directory) = args.data_directory {
            self.data_directory = data_directory;
        }
        if let Some(dburi) = args.dburi {
            self.dburi = dburi;
        }
        if let Some(drop_data) = args.drop_data {
            self.drop_data = drop_data;
        }
    }

    pub fn allowed_sizes_set(&self) -> Option<HashSet<(u32, u32)>> {
        self.allowed_sizes
            .as_ref()
            .map(|sizes| sizes.iter().map(|SizePair(w, h)| (*w, *h)).collect())
    }
}
