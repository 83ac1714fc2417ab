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

//! Python model source generation.
//!
//! Two calling conventions are supported. The stacked form lists layers
//! inside `Sequential([...])` and only fits linear chains. The wired form
//! binds one variable per layer and calls each layer on its predecessors,
//! so it handles any valid graph.
//!
//! Rendering never fails. Unknown layer types become comments, an invalid
//! graph becomes a commented artifact listing its structural errors, and
//! anything else worth reporting is returned as a [`RenderWarning`].

mod stacked;
mod wired;

use std::fmt::{self, Write};
use std::str::FromStr;

use serde::Deserialize;

use crate::catalog::computed::TaskType;
use crate::catalog::{CodeForm, LayerCatalog, LayerSpec, ShapeRule};
use crate::graph::{DagResult, OrderedLayer};
use crate::types::{Params, Scope};

/// Counts above this use the loop or spread form instead of copies.
pub const MAX_INLINE_REPEAT: usize = 5;

/// Requested calling convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Stacked for linear chains, wired otherwise.
    #[default]
    Auto,
    Stacked,
    Wired,
}

impl FromStr for RenderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(RenderMode::Auto),
            "stacked" | "sequential" => Ok(RenderMode::Stacked),
            "wired" | "functional" => Ok(RenderMode::Wired),
            other => Err(format!(
                "unknown render mode '{other}' (expected auto|stacked|wired)"
            )),
        }
    }
}

impl fmt::Display for RenderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RenderMode::Auto => "auto",
            RenderMode::Stacked => "stacked",
            RenderMode::Wired => "wired",
        })
    }
}

/// Settings for the `model.compile(...)` trailer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrailerConfig {
    pub optimizer: String,
    /// Overrides the loss derived from the task head.
    pub loss: Option<String>,
    /// Overrides the metrics derived from the task head.
    pub metrics: Option<Vec<String>>,
}

impl Default for TrailerConfig {
    fn default() -> Self {
        Self {
            optimizer: "adam".to_string(),
            loss: None,
            metrics: None,
        }
    }
}

/// Something the renderer worked around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderWarning {
    pub scope: Scope,
    pub message: String,
}

impl RenderWarning {
    fn new(scope: Scope, message: impl Into<String>) -> Self {
        Self {
            scope,
            message: message.into(),
        }
    }
}

/// Generated source plus what the renderer had to say about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub code: String,
    pub form: CodeForm,
    pub warnings: Vec<RenderWarning>,
}

/// Renders ordered graphs against a catalog.
#[derive(Debug, Clone, Copy)]
pub struct Renderer<'a> {
    catalog: &'a LayerCatalog,
    trailer: &'a TrailerConfig,
}

impl<'a> Renderer<'a> {
    pub fn new(catalog: &'a LayerCatalog, trailer: &'a TrailerConfig) -> Self {
        Self { catalog, trailer }
    }

    /// Render `dag` in the requested mode.
    pub fn render(&self, dag: &DagResult, mode: RenderMode) -> Artifact {
        let form = match mode {
            RenderMode::Stacked => CodeForm::Stacked,
            RenderMode::Wired => CodeForm::Wired,
            RenderMode::Auto if dag.is_linear() => CodeForm::Stacked,
            RenderMode::Auto => CodeForm::Wired,
        };
        log::debug!("rendering {} layer(s), mode {mode} -> {form:?}", dag.ordered.len());

        let mut warnings = Vec::new();
        if !dag.is_valid() {
            return Artifact {
                code: invalid_graph_artifact(dag),
                form,
                warnings,
            };
        }
        if form == CodeForm::Stacked && !dag.is_linear() {
            warnings.push(RenderWarning::new(
                Scope::Graph,
                "graph is not a linear chain; the stacked form lists layers in build order and drops the branching",
            ));
        }
        let code = match form {
            CodeForm::Stacked => stacked::render(self, &dag.ordered, &mut warnings),
            CodeForm::Wired => wired::render(self, dag, &mut warnings),
        };
        Artifact {
            code,
            form,
            warnings,
        }
    }

    /// `Sequential([...])` artifact for layers already in build order.
    pub fn render_stacked(&self, layers: &[OrderedLayer]) -> String {
        stacked::render(self, layers, &mut Vec::new())
    }

    /// Functional artifact for a validated graph.
    pub fn render_wired(&self, dag: &DagResult) -> String {
        if !dag.is_valid() {
            return invalid_graph_artifact(dag);
        }
        wired::render(self, dag, &mut Vec::new())
    }

    /// Call expression for one instance of `layer`, or `None` for a type
    /// the catalog does not know.
    fn layer_code(
        &self,
        layer: &OrderedLayer,
        form: CodeForm,
        warnings: &mut Vec<RenderWarning>,
    ) -> Option<(&'a LayerSpec, Params, String)> {
        let Some(spec) = self.catalog.get(&layer.layer_type) else {
            warnings.push(RenderWarning::new(
                Scope::node(&layer.id),
                format!("unknown layer type `{}` rendered as a comment", layer.layer_type),
            ));
            return None;
        };
        let params = spec.resolve_params(&layer.params);
        let rendered = spec.render(form, &params);
        for name in &rendered.unresolved {
            warnings.push(RenderWarning::new(
                Scope::node(&layer.id),
                format!("placeholder `{name}` has no value and was left as written"),
            ));
        }
        Some((spec, params, rendered.text))
    }

    /// The three import lines for the layers present. A catalog import is
    /// kept only when the rendered call of some instance names it.
    fn imports(&self, layers: &[OrderedLayer], form: CodeForm) -> String {
        let mut root_names: Vec<&str> = Vec::new();
        let mut layer_names: Vec<&str> = Vec::new();
        for layer in layers {
            let Some(spec) = self.catalog.get(&layer.layer_type) else {
                continue;
            };
            let code = spec.render(form, &spec.resolve_params(&layer.params)).text;
            let names = if spec.is_root() {
                &mut root_names
            } else {
                &mut layer_names
            };
            for name in &spec.imports {
                if !names.contains(&name.as_str()) && mentions(&code, name) {
                    names.push(name);
                }
            }
        }
        let model_class = match form {
            CodeForm::Stacked => "Sequential",
            CodeForm::Wired => "Model",
        };

        let mut out = Emitter::default();
        if !root_names.is_empty() {
            out.line(format_args!("from tensorflow.keras import {}", root_names.join(", ")));
        }
        out.line(format_args!("from tensorflow.keras.models import {model_class}"));
        if !layer_names.is_empty() {
            out.line(format_args!(
                "from tensorflow.keras.layers import {}",
                layer_names.join(", ")
            ));
        }
        out.finish()
    }

    /// `model.compile(...)` and `model.summary()`.
    fn trailer(&self, layers: &[OrderedLayer]) -> String {
        let task = layers.iter().find_map(|layer| {
            let spec = self.catalog.get(&layer.layer_type)?;
            if spec.rule != ShapeRule::TaskHead {
                return None;
            }
            TaskType::from_params(&spec.resolve_params(&layer.params)).ok()
        });
        let loss = self.trailer.loss.clone().unwrap_or_else(|| {
            task.map_or("categorical_crossentropy", TaskType::loss)
                .to_string()
        });
        let metrics = self.trailer.metrics.clone().unwrap_or_else(|| {
            vec![task.map_or("accuracy", TaskType::metric).to_string()]
        });
        let metrics = metrics
            .iter()
            .map(|m| format!("'{m}'"))
            .collect::<Vec<_>>()
            .join(", ");

        let mut out = Emitter::default();
        out.line(format_args!(
            "model.compile(optimizer='{}', loss='{loss}', metrics=[{metrics}])",
            self.trailer.optimizer
        ));
        out.line(format_args!("model.summary()"));
        out.finish()
    }
}

/// Stacked artifact with the default trailer.
pub fn render_stacked(layers: &[OrderedLayer], catalog: &LayerCatalog) -> String {
    Renderer::new(catalog, &TrailerConfig::default()).render_stacked(layers)
}

/// Wired artifact with the default trailer.
pub fn render_wired(dag: &DagResult, catalog: &LayerCatalog) -> String {
    Renderer::new(catalog, &TrailerConfig::default()).render_wired(dag)
}

/// True when `name` occurs in `code` as a whole identifier.
fn mentions(code: &str, name: &str) -> bool {
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_';
    code.match_indices(name).any(|(at, _)| {
        let before = code[..at].chars().next_back();
        let after = code[at + name.len()..].chars().next();
        !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
    })
}

fn unknown_type_comment(layer_type: &str) -> String {
    format!("# Unknown layer type: {layer_type}")
}

fn repeat_comment(layer_type: &str, count: usize) -> String {
    format!("# {layer_type} x {count}")
}

fn invalid_graph_artifact(dag: &DagResult) -> String {
    let mut out = Emitter::default();
    out.line(format_args!("# Model could not be generated: the layer graph is invalid."));
    for err in &dag.errors {
        out.line(format_args!("# - {err}"));
    }
    out.finish()
}

/// Line-oriented string builder.
#[derive(Debug, Default)]
struct Emitter {
    out: String,
}

impl Emitter {
    fn line(&mut self, args: fmt::Arguments<'_>) {
        writeln!(&mut self.out, "{args}").expect("write to string cannot fail");
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }

    fn push(&mut self, block: &str) {
        self.out.push_str(block);
    }

    fn finish(self) -> String {
        self.out
    }
}
