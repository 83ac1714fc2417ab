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

//! End-to-end compilation: graph validation, shape inference and code
//! rendering in one call.
//!
//! Problems found along the way are collected as diagnostics rather than
//! returned as errors. Only an unreadable graph document is an error.

use crate::catalog::{CodeForm, LayerCatalog};
use crate::codegen::{RenderMode, Renderer, TrailerConfig};
use crate::diagnostics::{self, Diagnostic};
use crate::graph::{build_dag, DagResult};
use crate::shapes::engine::{infer_shapes, ShapeReport};
use crate::types::{Graph, GraphEdge, GraphNode};

/// Options controlling the pipeline.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CompileOptions {
    pub mode: RenderMode,
    /// Replaces the shape of every root layer.
    pub root_shape: Option<String>,
    pub trailer: TrailerConfig,
}

/// Everything the pipeline produced for one graph.
#[derive(Debug, Clone)]
pub struct CompileProducts {
    pub dag: DagResult,
    pub shapes: ShapeReport,
    /// Form the code was rendered in.
    pub form: CodeForm,
    pub code: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileProducts {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.is_error())
    }
}

/// Errors surfaced before the pipeline can run.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("invalid graph document: {0}")]
    Document(#[from] serde_json::Error),
}

/// Run every stage over `nodes` and `edges`.
pub fn compile_graph(
    nodes: &[GraphNode],
    edges: &[GraphEdge],
    catalog: &LayerCatalog,
    opts: &CompileOptions,
) -> CompileProducts {
    let dag = build_dag(nodes, edges);
    let shapes = infer_shapes(&dag, catalog, opts.root_shape.as_deref());
    let artifact = Renderer::new(catalog, &opts.trailer).render(&dag, opts.mode);

    let mut diags: Vec<Diagnostic> = dag.errors.iter().map(Diagnostic::from_dag_error).collect();
    // With structural errors the shape pass only repeats them.
    if dag.is_valid() {
        diags.extend(diagnostics::from_shape_report(&shapes));
    }
    diags.extend(artifact.warnings.iter().map(Diagnostic::from_render_warning));

    log::debug!(
        "compiled {} node(s): {} diagnostic(s), {:?} form",
        nodes.len(),
        diags.len(),
        artifact.form
    );

    CompileProducts {
        dag,
        shapes,
        form: artifact.form,
        code: artifact.code,
        diagnostics: diags,
    }
}

/// Parse a JSON graph document and compile it.
pub fn compile_json(
    source: &str,
    catalog: &LayerCatalog,
    opts: &CompileOptions,
) -> Result<CompileProducts, CompileError> {
    let graph = Graph::from_json(source)?;
    Ok(compile_graph(&graph.nodes, &graph.edges, catalog, opts))
}
