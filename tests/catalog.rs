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

use std::fs;

use netforge::catalog::{CodeForm, LayerSpec, ShapeRule};
use netforge::codegen::{render_stacked, render_wired};
use netforge::graph::build_dag;
use netforge::types::{GraphEdge, GraphNode, Params};
use netforge::LayerCatalog;

const CUSTOM: &str = r#"
[layers.Source]
imports = ["Input"]
template = "Input(shape={{input_shape}})"
shape = { rule = "input" }
defaults = { input_type = "vector", size = 3 }

[layers.Scale]
category = "custom"
description = "Multiplies by a constant."
imports = ["Lambda"]
template = "Lambda(lambda x: x * {{factor}})"
wired_template = "Lambda(lambda t: t * {{factor}}, name='{{label}}')"
shape = { rule = "identity" }
defaults = { factor = 2, label = "scale" }
"#;

#[test]
fn every_bundled_layer_renders_with_defaults() {
    let catalog = LayerCatalog::keras();
    assert!(catalog.len() >= 20);
    for spec in catalog.iter() {
        let bound = spec.resolve_params(&Params::new());
        let out = spec.render(CodeForm::Stacked, &bound);
        assert!(
            out.unresolved.is_empty(),
            "{} leaves {:?} unresolved",
            spec.name,
            out.unresolved
        );
    }
}

#[test]
fn custom_catalog_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("layers.toml");
    fs::write(&path, CUSTOM).unwrap();

    let catalog = LayerCatalog::load(&path).expect("catalog loads");
    assert_eq!(catalog.len(), 2);
    assert!(catalog.is_root_type("Source"));
    let scale = catalog.get("Scale").unwrap();
    assert_eq!(scale.category.as_deref(), Some("custom"));
    assert_eq!(scale.rule, ShapeRule::Identity);

    let nodes = vec![
        GraphNode::new("in", "Source"),
        GraphNode::new("s", "Scale").with_param("factor", 0.5),
    ];
    let dag = build_dag(&nodes, &[GraphEdge::new("in", "s")]);

    let stacked = render_stacked(&dag.ordered, &catalog);
    assert!(stacked.contains("    Lambda(lambda x: x * 0.5)\n"));
    assert!(stacked.contains("from tensorflow.keras.layers import Lambda\n"));

    let wired = render_wired(&dag, &catalog);
    assert!(wired.contains("scale = Lambda(lambda t: t * 0.5, name='scale')(source)\n"));
}

#[test]
fn load_errors_carry_the_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("broken.toml");
    fs::write(&path, "[layers.X]\ntemplate = \"{% if a %}\"\nshape = { rule = \"identity\" }\n").unwrap();
    let err = LayerCatalog::load(&path).unwrap_err();
    let text = format!("{err:#}");
    assert!(text.contains("broken.toml"), "{text}");
    assert!(text.contains("never closed"), "{text}");

    let missing = LayerCatalog::load(&dir.path().join("nope.toml")).unwrap_err();
    assert!(format!("{missing:#}").contains("failed to read catalog"));
}

#[test]
fn specs_can_be_built_in_code() {
    let spec = LayerSpec::new("Noise", ShapeRule::Identity, "GaussianNoise({{stddev}})")
        .unwrap()
        .with_defaults([("stddev", 0.1)].into_iter().collect())
        .with_imports(["GaussianNoise"])
        .repeatable(true);
    let catalog = LayerCatalog::from_specs([spec]);
    let noise = catalog.get("Noise").unwrap();
    let out = noise.render(CodeForm::Wired, &noise.resolve_params(&Params::new()));
    assert_eq!(out.text, "GaussianNoise(0.1)");
    assert!(LayerSpec::new("Bad", ShapeRule::Identity, "{% endif %}").is_err());
}
