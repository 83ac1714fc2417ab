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

//! netforge: compiles layer graphs into Keras model source.
pub mod catalog;
pub mod codegen;
pub mod config;
pub mod diagnostics;
pub mod graph;
pub mod lexer;
pub mod pipeline;
pub mod shapes;
pub mod template;
pub mod types;

pub use catalog::{LayerCatalog, LayerSpec};
pub use codegen::{Artifact, RenderMode, Renderer, TrailerConfig};
pub use graph::{build_dag, DagError, DagResult, OrderedLayer};
pub use pipeline::{compile_graph, compile_json, CompileOptions, CompileProducts};
pub use shapes::engine::{infer_shapes, InferenceError, ShapeReport};
pub use types::{Graph, GraphEdge, GraphNode, ParamValue, Params};
