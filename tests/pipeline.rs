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

use netforge::catalog::CodeForm;
use netforge::diagnostics::{Phase, Severity};
use netforge::pipeline::{compile_json, CompileError, CompileOptions};
use netforge::types::Scope;
use netforge::{LayerCatalog, RenderMode};

const MLP: &str = r#"{
  "nodes": [
    {"id": "in", "type": "Input", "params": {"input_type": "vector", "size": 784}},
    {"id": "h", "type": "Dense", "params": {"units": 128, "activation": "relu"}},
    {"id": "out", "type": "Dense", "params": {"units": 10, "activation": "softmax"}}
  ],
  "edges": [
    {"source": "in", "target": "h"},
    {"source": "h", "target": "out"}
  ]
}"#;

#[test]
fn mlp_compiles_cleanly() {
    let catalog = LayerCatalog::keras();
    let products = compile_json(MLP, &catalog, &CompileOptions::default()).expect("document parses");
    assert!(products.diagnostics.is_empty(), "{:?}", products.diagnostics);
    assert_eq!(products.form, CodeForm::Stacked);
    assert_eq!(products.shapes.shape("out"), Some(&vec![10]));

    let code = &products.code;
    assert_eq!(code.matches("from tensorflow.keras.layers import").count(), 1);
    assert!(code.contains("from tensorflow.keras.layers import Dense\n"));
    let statements = code
        .lines()
        .filter(|l| l.starts_with("    ") && l.contains('('))
        .count();
    assert_eq!(statements, 3);
    assert!(code.contains("model.compile("));
    assert!(code.trim_end().ends_with("model.summary()"));
}

#[test]
fn options_select_mode_and_root_shape() {
    let catalog = LayerCatalog::keras();
    let opts = CompileOptions {
        mode: RenderMode::Wired,
        root_shape: Some("(32,)".to_string()),
        ..CompileOptions::default()
    };
    let products = compile_json(MLP, &catalog, &opts).unwrap();
    assert_eq!(products.form, CodeForm::Wired);
    assert_eq!(products.shapes.shape("in"), Some(&vec![32]));
    assert!(products.code.contains("model = Model(inputs=input, outputs=dense_1)"));
}

#[test]
fn structural_errors_are_reported_once() {
    let catalog = LayerCatalog::keras();
    let doc = r#"{"nodes": [
        {"id": "a", "type": "Dense"},
        {"id": "b", "type": "Dense"}
      ],
      "edges": [{"source": "a", "target": "b"}, {"source": "b", "target": "a"}]}"#;
    let products = compile_json(doc, &catalog, &CompileOptions::default()).unwrap();
    assert!(products.has_errors());
    assert!(products.diagnostics.iter().all(|d| d.phase == Phase::Graph));
    assert_eq!(products.errors().count(), 3);
    assert!(products.code.starts_with("# Model could not be generated"));
}

#[test]
fn shape_errors_and_warnings_keep_their_nodes() {
    let catalog = LayerCatalog::keras();
    let doc = r#"{"nodes": [
        {"id": "img", "type": "Input", "params": {"input_type": "image_grayscale", "height": 8, "width": 8}},
        {"id": "d", "type": "Dense", "params": {"units": 4}},
        {"id": "lstm", "type": "LSTM"}
      ],
      "edges": [{"source": "img", "target": "d"}, {"source": "d", "target": "lstm"}]}"#;
    let products = compile_json(doc, &catalog, &CompileOptions::default()).unwrap();

    let warning = products.warnings().next().expect("dense warning");
    assert_eq!(warning.phase, Phase::Shape);
    assert_eq!(warning.scope, Scope::node("d"));

    let error = products.errors().next().expect("lstm error");
    assert_eq!(error.severity, Severity::Error);
    assert_eq!(error.scope, Scope::node("lstm"));
    // Code is still produced.
    assert!(products.code.contains("LSTM(64)"));
}

#[test]
fn malformed_documents_are_errors() {
    let catalog = LayerCatalog::keras();
    let err = compile_json("{\"nodes\": 3}", &catalog, &CompileOptions::default()).unwrap_err();
    assert!(matches!(err, CompileError::Document(_)));
}

#[test]
fn missing_params_default_to_empty() {
    let catalog = LayerCatalog::keras();
    let doc = r#"{"nodes": [{"id": "in", "type": "Input"}], "edges": []}"#;
    let products = compile_json(doc, &catalog, &CompileOptions::default()).unwrap();
    // Catalog defaults: a 784-wide vector.
    assert_eq!(products.shapes.shape("in"), Some(&vec![784]));
    assert!(!products.has_errors());
}
