// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Project configuration read from `netforge.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::catalog::LayerCatalog;
use crate::codegen::{RenderMode, TrailerConfig};
use crate::pipeline::CompileOptions;

pub const CONFIG_FILE: &str = "netforge.toml";

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    #[serde(default)]
    pub compile: CompileSection,
    #[serde(default)]
    pub catalog: CatalogSection,
    #[serde(default)]
    pub trailer: TrailerConfig,
    /// Directory of the file this was loaded from; relative paths resolve
    /// against it.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CompileSection {
    #[serde(default)]
    pub mode: RenderMode,
    pub root_shape: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CatalogSection {
    pub path: Option<PathBuf>,
}

impl ProjectConfig {
    pub fn from_toml_str(src: &str) -> Result<Self> {
        toml::from_str(src).context("invalid netforge configuration")
    }

    /// Catalog named by `[catalog] path`, or the bundled Keras catalog.
    pub fn load_catalog(&self) -> Result<LayerCatalog> {
        match &self.catalog.path {
            Some(path) => {
                let path = match &self.base_dir {
                    Some(base) if path.is_relative() => base.join(path),
                    _ => path.clone(),
                };
                LayerCatalog::load(&path)
            }
            None => Ok(LayerCatalog::keras()),
        }
    }

    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            mode: self.compile.mode,
            root_shape: self.compile.root_shape.clone(),
            trailer: self.trailer.clone(),
        }
    }
}

/// Find `netforge.toml` in `start` or any parent directory.
pub fn find_config(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        let candidate = current.join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Load a configuration file.
pub fn load_config(path: &Path) -> Result<ProjectConfig> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let mut config: ProjectConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    config.base_dir = path.parent().map(Path::to_path_buf);
    log::debug!("loaded configuration from {}", path.display());
    Ok(config)
}
