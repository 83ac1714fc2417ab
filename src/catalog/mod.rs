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

//! The layer catalog: one capability record per layer type.
//!
//! A catalog is loaded once (from the bundled Keras definitions or a TOML
//! file) and then passed by reference into every pipeline call. Nothing in
//! the pipeline mutates it.
//!
//! ```toml
//! [layers.Dense]
//! category = "core"
//! imports = ["Dense"]
//! repeatable = true
//! template = "Dense({{units}})"
//! shape = { rule = "dense" }
//! defaults = { units = 128 }
//! ```

pub mod computed;
pub mod rules;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

pub use rules::{MergeMode, ShapeComputation, ShapeRule};

use crate::shapes::{Shape, ShapeError};
use crate::template::{Rendered, Template, TemplateError};
use crate::types::{ParamValue, Params};

/// Node parameter holding the repetition count of repeatable layers.
pub const MULTIPLIER: &str = "multiplier";

/// Which calling convention a template is instantiated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeForm {
    Stacked,
    Wired,
}

/// Errors raised while loading a catalog document.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("invalid catalog document: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("template of layer `{layer}`: {source}")]
    Template {
        layer: String,
        #[source]
        source: TemplateError,
    },
}

/// Everything the pipeline knows about one layer type.
#[derive(Debug, Clone)]
pub struct LayerSpec {
    pub name: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub rule: ShapeRule,
    pub defaults: Params,
    /// Names imported from the layers module when this type is used.
    pub imports: Vec<String>,
    /// Whether the `multiplier` shorthand applies.
    pub repeatable: bool,
    template: Template,
    wired_template: Option<Template>,
}

impl LayerSpec {
    pub fn new(
        name: impl Into<String>,
        rule: ShapeRule,
        template: &str,
    ) -> Result<Self, TemplateError> {
        Ok(Self {
            name: name.into(),
            category: None,
            description: None,
            rule,
            defaults: Params::new(),
            imports: Vec::new(),
            repeatable: false,
            template: Template::parse(template)?,
            wired_template: None,
        })
    }

    pub fn with_defaults(mut self, defaults: Params) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_imports<I, S>(mut self, imports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.imports = imports.into_iter().map(Into::into).collect();
        self
    }

    pub fn repeatable(mut self, repeatable: bool) -> Self {
        self.repeatable = repeatable;
        self
    }

    /// Use a dedicated template for the wired form.
    pub fn with_wired_template(mut self, template: &str) -> Result<Self, TemplateError> {
        self.wired_template = Some(Template::parse(template)?);
        Ok(self)
    }

    pub fn template(&self, form: CodeForm) -> &Template {
        match (form, &self.wired_template) {
            (CodeForm::Wired, Some(wired)) => wired,
            _ => &self.template,
        }
    }

    pub fn is_root(&self) -> bool {
        self.rule.is_root()
    }

    /// Bindings for a node of this type: node parameters over catalog
    /// defaults, then computed placeholders for names still unbound.
    pub fn resolve_params(&self, node_params: &Params) -> Params {
        let merged = node_params.over(&self.defaults);
        let computed = computed::computed_bindings(&merged);
        merged.over(&computed)
    }

    /// How many times a node of this type is instantiated. Reads the
    /// `multiplier` parameter; absent, non-numeric or below one means a
    /// single instance, and non-repeatable types always yield one.
    pub fn repeat_count(&self, params: &Params) -> usize {
        if !self.repeatable {
            return 1;
        }
        params
            .get(MULTIPLIER)
            .and_then(ParamValue::as_i64)
            .filter(|&n| n > 1)
            .map_or(1, |n| n as usize)
    }

    pub fn validate_inputs(&self, inputs: &[Shape], params: &Params) -> Result<(), ShapeError> {
        self.rule.validate_inputs(inputs, params)
    }

    pub fn compute_shape(
        &self,
        inputs: &[Shape],
        params: &Params,
    ) -> Result<ShapeComputation, ShapeError> {
        self.rule.compute_shape(inputs, params)
    }

    /// Instantiate the template for `form` with resolved bindings.
    pub fn render(&self, form: CodeForm, params: &Params) -> Rendered {
        self.template(form).render(params)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCatalog {
    #[serde(default)]
    layers: BTreeMap<String, RawLayer>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawLayer {
    template: String,
    wired_template: Option<String>,
    #[serde(default)]
    imports: Vec<String>,
    #[serde(default)]
    repeatable: bool,
    category: Option<String>,
    description: Option<String>,
    #[serde(default)]
    defaults: Params,
    shape: ShapeRule,
}

/// Read-only lookup of layer types by catalog key.
#[derive(Debug, Clone, Default)]
pub struct LayerCatalog {
    layers: BTreeMap<String, LayerSpec>,
}

const KERAS_CATALOG: &str = include_str!("keras.toml");

impl LayerCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_specs(specs: impl IntoIterator<Item = LayerSpec>) -> Self {
        let mut catalog = Self::new();
        for spec in specs {
            catalog.insert(spec);
        }
        catalog
    }

    pub fn insert(&mut self, spec: LayerSpec) {
        self.layers.insert(spec.name.clone(), spec);
    }

    /// The bundled Keras layer definitions.
    pub fn keras() -> Self {
        Self::from_toml_str(KERAS_CATALOG).expect("bundled keras catalog is valid")
    }

    pub fn from_toml_str(src: &str) -> Result<Self, CatalogError> {
        let raw: RawCatalog = toml::from_str(src)?;
        let mut catalog = Self::new();
        for (name, layer) in raw.layers {
            let wrap = |source| CatalogError::Template {
                layer: name.clone(),
                source,
            };
            let template = Template::parse(&layer.template).map_err(wrap)?;
            let wired_template = layer
                .wired_template
                .as_deref()
                .map(Template::parse)
                .transpose()
                .map_err(wrap)?;
            catalog.insert(LayerSpec {
                name: name.clone(),
                category: layer.category,
                description: layer.description,
                rule: layer.shape,
                defaults: layer.defaults,
                imports: layer.imports,
                repeatable: layer.repeatable,
                template,
                wired_template,
            });
        }
        log::debug!("loaded layer catalog with {} types", catalog.len());
        Ok(catalog)
    }

    /// Load a catalog file from disk.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let src = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog {}", path.display()))?;
        Self::from_toml_str(&src).with_context(|| format!("failed to load catalog {}", path.display()))
    }

    pub fn get(&self, layer_type: &str) -> Option<&LayerSpec> {
        self.layers.get(layer_type)
    }

    pub fn is_root_type(&self, layer_type: &str) -> bool {
        self.get(layer_type).is_some_and(LayerSpec::is_root)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LayerSpec> {
        self.layers.values()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}
