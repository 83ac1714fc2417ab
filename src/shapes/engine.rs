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

//! Shape propagation over an ordered layer graph.
//!
//! The engine visits layers in build order. Each node reads the shapes of
//! its predecessors, hands them to the catalog rule of its type and records
//! either a shape or an error. A failing node never stops the pass: its
//! successors report that their input could not be resolved.

use std::collections::BTreeMap;

use super::{format_shape, parse_shape, Shape, ShapeError, ShapeParseError};
use crate::catalog::{LayerCatalog, ShapeComputation, MULTIPLIER};
use crate::graph::{DagResult, OrderedLayer};
use crate::types::Scope;

/// Largest `multiplier` a repeatable layer may carry.
pub const MAX_REPEAT: usize = 1024;

/// Per-node shape failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InferenceError {
    /// The graph has structural errors; no node was visited.
    #[error("shapes not inferred: the graph has {count} structural error(s)")]
    InvalidGraph { count: usize },
    #[error("unknown layer type `{0}`")]
    UnknownLayerType(String),
    /// A non-root node without incoming connections.
    #[error("layer has no input connection")]
    MissingInput,
    #[error("cannot resolve input shape: predecessor `{0}` has no shape")]
    UnresolvedPredecessor(String),
    #[error("input layer cannot have incoming connections ({count} found)")]
    RootHasInputs { count: usize },
    #[error("invalid root shape: {0}")]
    RootShape(#[source] ShapeParseError),
    #[error(transparent)]
    Shape(#[from] ShapeError),
}

/// Result of [`infer_shapes`]. Maps are keyed by node id; graph-level
/// entries use [`Scope::GRAPH_KEY`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShapeReport {
    pub shapes: BTreeMap<String, Shape>,
    pub errors: BTreeMap<String, InferenceError>,
    pub warnings: BTreeMap<String, String>,
}

impl ShapeReport {
    pub fn shape(&self, id: &str) -> Option<&Shape> {
        self.shapes.get(id)
    }

    pub fn error(&self, id: &str) -> Option<&InferenceError> {
        self.errors.get(id)
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Infer the output shape of every layer in `dag`.
///
/// `root_override`, when given, replaces the shape every root layer would
/// derive from its own parameters.
pub fn infer_shapes(
    dag: &DagResult,
    catalog: &LayerCatalog,
    root_override: Option<&str>,
) -> ShapeReport {
    let mut report = ShapeReport::default();
    if !dag.is_valid() {
        report.errors.insert(
            Scope::GRAPH_KEY.to_string(),
            InferenceError::InvalidGraph {
                count: dag.errors.len(),
            },
        );
        return report;
    }

    let root_override = root_override.map(parse_shape);

    for layer in &dag.ordered {
        match infer_layer(layer, dag, catalog, root_override.as_ref(), &report.shapes) {
            Ok(ShapeComputation { shape, warning }) => {
                log::trace!("{} -> {}", layer.id, format_shape(&shape));
                if let Some(warning) = warning {
                    log::warn!("layer `{}`: {warning}", layer.id);
                    report.warnings.insert(layer.id.clone(), warning);
                }
                report.shapes.insert(layer.id.clone(), shape);
            }
            Err(err) => {
                log::debug!("layer `{}`: {err}", layer.id);
                report.errors.insert(layer.id.clone(), err);
            }
        }
    }

    log::debug!(
        "shape inference: {} resolved, {} failed, {} warning(s)",
        report.shapes.len(),
        report.errors.len(),
        report.warnings.len()
    );
    report
}

fn infer_layer(
    layer: &OrderedLayer,
    dag: &DagResult,
    catalog: &LayerCatalog,
    root_override: Option<&Result<Shape, ShapeParseError>>,
    resolved: &BTreeMap<String, Shape>,
) -> Result<ShapeComputation, InferenceError> {
    let spec = catalog
        .get(&layer.layer_type)
        .ok_or_else(|| InferenceError::UnknownLayerType(layer.layer_type.clone()))?;
    let predecessors = dag.predecessors(&layer.id);
    let params = spec.resolve_params(&layer.params);

    if spec.is_root() {
        if !predecessors.is_empty() {
            return Err(InferenceError::RootHasInputs {
                count: predecessors.len(),
            });
        }
        if let Some(parsed) = root_override {
            let shape = parsed.clone().map_err(InferenceError::RootShape)?;
            if shape.contains(&0) {
                return Err(ShapeError::ZeroDimension(shape).into());
            }
            return Ok(ShapeComputation {
                shape,
                warning: None,
            });
        }
        return Ok(spec.compute_shape(&[], &params)?);
    }

    if predecessors.is_empty() {
        return Err(InferenceError::MissingInput);
    }
    let inputs = predecessors
        .iter()
        .map(|pred| {
            resolved
                .get(&pred.id)
                .cloned()
                .ok_or_else(|| InferenceError::UnresolvedPredecessor(pred.id.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    spec.validate_inputs(&inputs, &params)?;
    let mut out = spec.compute_shape(&inputs, &params)?;

    let count = spec.repeat_count(&params);
    if count > MAX_REPEAT {
        return Err(ShapeError::InvalidParam {
            name: MULTIPLIER.to_string(),
            reason: format!("{count} exceeds the limit of {MAX_REPEAT} repetitions"),
        }
        .into());
    }

    // Repeated instances are chained, each one fed by the previous output.
    // The rule is a pure function of its input, so a fixed point ends the chain.
    for _ in 1..count {
        let input = [out.shape.clone()];
        spec.validate_inputs(&input, &params)?;
        let next = spec.compute_shape(&input, &params)?;
        let settled = next.shape == out.shape;
        out = ShapeComputation {
            shape: next.shape,
            warning: out.warning.or(next.warning),
        };
        if settled {
            break;
        }
    }
    Ok(out)
}
