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
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

const CHAIN: &str = r#"{
  "nodes": [
    {"id": "in", "type": "Input", "params": {"input_type": "vector", "size": 20}},
    {"id": "h", "type": "Dense", "params": {"units": 8}},
    {"id": "out", "type": "Output", "params": {"task_type": "regression"}}
  ],
  "edges": [{"source": "in", "target": "h"}, {"source": "h", "target": "out"}]
}"#;

const CYCLE: &str = r#"{
  "nodes": [{"id": "a", "type": "Dense"}, {"id": "b", "type": "Dense"}],
  "edges": [{"source": "a", "target": "b"}, {"source": "b", "target": "a"}]
}"#;

fn netforgec(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_netforgec"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("run netforgec")
}

fn write_graph(dir: &Path, name: &str, body: &str) {
    fs::write(dir.join(name), body).expect("write graph");
}

#[test]
fn emits_stacked_code() {
    let dir = tempfile::tempdir().unwrap();
    write_graph(dir.path(), "model.json", CHAIN);
    let output = netforgec(dir.path(), &["model.json"]);
    assert!(
        output.status.success(),
        "netforgec failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("model = Sequential(["), "{stdout}");
    assert!(stdout.contains("loss='mse', metrics=['mae']"), "{stdout}");
}

#[test]
fn wired_mode_to_file() {
    let dir = tempfile::tempdir().unwrap();
    write_graph(dir.path(), "model.json", CHAIN);
    let output = netforgec(
        dir.path(),
        &["model.json", "--mode", "wired", "--output", "model.py"],
    );
    assert!(output.status.success());
    assert!(output.stdout.is_empty());
    let code = fs::read_to_string(dir.path().join("model.py")).unwrap();
    assert!(code.contains("model = Model(inputs=input, outputs=output)"), "{code}");
}

#[test]
fn emits_order_and_shapes() {
    let dir = tempfile::tempdir().unwrap();
    write_graph(dir.path(), "model.json", CHAIN);

    let order = netforgec(dir.path(), &["model.json", "--emit", "order"]);
    assert_eq!(
        String::from_utf8_lossy(&order.stdout),
        "input\tin\tInput\ndense\th\tDense\noutput\tout\tOutput\n"
    );

    let shapes = netforgec(dir.path(), &["model.json", "--emit", "shapes", "--root-shape", "(5,)"]);
    assert_eq!(
        String::from_utf8_lossy(&shapes.stdout),
        "in\tInput\t(5,)\nh\tDense\t(8,)\nout\tOutput\t(1,)\n"
    );
}

#[test]
fn structural_errors_exit_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    write_graph(dir.path(), "cycle.json", CYCLE);
    let output = netforgec(
        dir.path(),
        &["cycle.json", "--check", "--diagnostic-format", "short"],
    );
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("__graph__: error[G0004] graph"), "{stderr}");
}

#[test]
fn json_diagnostics_are_line_delimited() {
    let dir = tempfile::tempdir().unwrap();
    write_graph(dir.path(), "cycle.json", CYCLE);
    let output = netforgec(dir.path(), &["cycle.json", "--diagnostic-format", "json"]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines: Vec<serde_json::Value> = stderr
        .lines()
        .map(|l| serde_json::from_str(l).expect("json line"))
        .collect();
    assert_eq!(lines.len(), 3);
    assert!(lines.iter().all(|v| v["phase"] == "graph"));
}

#[test]
fn reads_stdin_and_project_config() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("netforge.toml"),
        "[compile]\nmode = \"wired\"\n\n[trailer]\noptimizer = \"rmsprop\"\n",
    )
    .unwrap();

    let mut child = Command::new(env!("CARGO_BIN_EXE_netforgec"))
        .current_dir(dir.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn netforgec");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(CHAIN.as_bytes())
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("from tensorflow.keras.models import Model"), "{stdout}");
    assert!(stdout.contains("optimizer='rmsprop'"), "{stdout}");
}

#[test]
fn layers_subcommand_lists_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let output = netforgec(dir.path(), &["layers"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.lines().any(|l| l.starts_with("Conv2D ")), "{stdout}");
    assert!(stdout.contains("recurrent"));
}

#[test]
fn unknown_mode_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_graph(dir.path(), "model.json", CHAIN);
    let output = netforgec(dir.path(), &["model.json", "--mode", "sideways"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown render mode"));
}
