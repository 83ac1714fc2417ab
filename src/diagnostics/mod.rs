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

//! Uniform diagnostics for all pipeline stages.
//!
//! Every structural error, shape error, shape warning and render warning is
//! turned into a [`Diagnostic`] attached either to the whole graph or to one
//! node id, and printed in one of three formats.

use std::io::{self, IsTerminal, Write};

use serde::Serialize;

use crate::codegen::RenderWarning;
use crate::graph::DagError;
use crate::shapes::engine::{InferenceError, ShapeReport};
use crate::types::Scope;

/// Pipeline stage a diagnostic comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Graph,
    Shape,
    Render,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Graph => "graph",
            Phase::Shape => "shape",
            Phase::Render => "render",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub phase: Phase,
    pub code: &'static str,
    pub severity: Severity,
    /// Node id, or the graph pseudo-key for graph-level entries.
    #[serde(serialize_with = "serialize_scope")]
    pub scope: Scope,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

fn serialize_scope<S: serde::Serializer>(scope: &Scope, ser: S) -> Result<S::Ok, S::Error> {
    ser.serialize_str(scope.key())
}

impl Diagnostic {
    pub fn error(phase: Phase, code: &'static str, scope: Scope, message: impl Into<String>) -> Self {
        Self {
            phase,
            code,
            severity: Severity::Error,
            scope,
            message: message.into(),
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn warning(
        phase: Phase,
        code: &'static str,
        scope: Scope,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(phase, code, scope, message)
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn from_dag_error(err: &DagError) -> Self {
        let code = match err {
            DagError::Empty => "G0001",
            DagError::NoSource => "G0002",
            DagError::NoSink => "G0003",
            DagError::Cycle { .. } => "G0004",
            DagError::DuplicateId(_) => "G0005",
            DagError::UnknownEndpoint { .. } => "G0006",
        };
        let diag = Self::error(Phase::Graph, code, Scope::Graph, err.to_string());
        match err {
            DagError::NoSource => diag.with_help("add an input layer with no incoming connections"),
            DagError::Cycle { .. } => diag.with_help("remove one of the connections in the loop"),
            _ => diag,
        }
    }

    pub fn from_inference_error(id: &str, err: &InferenceError) -> Self {
        let scope = if id == Scope::GRAPH_KEY {
            Scope::Graph
        } else {
            Scope::node(id)
        };
        let code = match err {
            InferenceError::InvalidGraph { .. } => "S0001",
            InferenceError::UnknownLayerType(_) => "S0002",
            InferenceError::MissingInput => "S0003",
            InferenceError::UnresolvedPredecessor(_) => "S0004",
            InferenceError::RootHasInputs { .. } => "S0005",
            InferenceError::RootShape(_) => "S0006",
            InferenceError::Shape(_) => "S0100",
        };
        let diag = Self::error(Phase::Shape, code, scope, err.to_string());
        match err {
            InferenceError::UnresolvedPredecessor(pred) => {
                diag.with_note(format!("see the diagnostic for `{pred}`"))
            }
            _ => diag,
        }
    }

    pub fn from_shape_warning(id: &str, warning: &str) -> Self {
        Self::warning(Phase::Shape, "S0200", Scope::node(id), warning)
    }

    pub fn from_render_warning(warning: &RenderWarning) -> Self {
        Self::warning(
            Phase::Render,
            "R0001",
            warning.scope.clone(),
            warning.message.clone(),
        )
    }
}

/// Diagnostics for a whole shape report: errors first, then warnings,
/// each in node-id order.
pub fn from_shape_report(report: &ShapeReport) -> Vec<Diagnostic> {
    let errors = report
        .errors
        .iter()
        .map(|(id, err)| Diagnostic::from_inference_error(id, err));
    let warnings = report
        .warnings
        .iter()
        .map(|(id, warning)| Diagnostic::from_shape_warning(id, warning));
    errors.chain(warnings).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiagnosticFormat {
    #[default]
    Human,
    Short,
    Json,
}

impl DiagnosticFormat {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "human" => Some(DiagnosticFormat::Human),
            "short" => Some(DiagnosticFormat::Short),
            "json" => Some(DiagnosticFormat::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorChoice {
    #[default]
    Auto,
    Always,
    Never,
}

impl ColorChoice {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "auto" => Some(ColorChoice::Auto),
            "always" => Some(ColorChoice::Always),
            "never" => Some(ColorChoice::Never),
            _ => None,
        }
    }
}

/// Writes diagnostics in the selected format.
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticEmitter {
    format: DiagnosticFormat,
    color: bool,
}

impl DiagnosticEmitter {
    pub fn new(format: DiagnosticFormat, color: ColorChoice) -> Self {
        let color = match color {
            ColorChoice::Always => true,
            ColorChoice::Never => false,
            ColorChoice::Auto => io::stderr().is_terminal(),
        };
        Self { format, color }
    }

    pub fn format(&self) -> DiagnosticFormat {
        self.format
    }

    pub fn render_human(&self, diag: &Diagnostic) -> String {
        let severity = self.paint(diag.severity);
        let mut out = format!(
            "{severity}[{}][{}]: {}\n  --> {}",
            diag.phase.as_str(),
            diag.code,
            diag.message,
            diag.scope
        );
        for note in &diag.notes {
            out.push_str(&format!("\n  = note: {note}"));
        }
        if let Some(help) = &diag.help {
            out.push_str(&format!("\n  = help: {help}"));
        }
        out
    }

    pub fn render_short(&self, diag: &Diagnostic) -> String {
        format!(
            "{}: {}[{}] {}: {}",
            diag.scope.key(),
            diag.severity.as_str(),
            diag.code,
            diag.phase.as_str(),
            diag.message
        )
    }

    pub fn render_json(&self, diag: &Diagnostic) -> String {
        serde_json::to_string(diag).unwrap_or_else(|err| {
            format!("{{\"severity\":\"error\",\"message\":\"unserializable diagnostic: {err}\"}}")
        })
    }

    pub fn render(&self, diag: &Diagnostic) -> String {
        match self.format {
            DiagnosticFormat::Human => self.render_human(diag),
            DiagnosticFormat::Short => self.render_short(diag),
            DiagnosticFormat::Json => self.render_json(diag),
        }
    }

    /// Write one diagnostic. Write failures are ignored; there is nowhere
    /// left to report them.
    pub fn emit(&self, diag: &Diagnostic, out: &mut dyn Write) {
        let _ = writeln!(out, "{}", self.render(diag));
    }

    /// Write every diagnostic to stderr.
    pub fn emit_all(&self, diags: &[Diagnostic]) {
        let stderr = io::stderr();
        let mut lock = stderr.lock();
        for diag in diags {
            self.emit(diag, &mut lock);
        }
    }

    fn paint(&self, severity: Severity) -> String {
        match (self.color, severity) {
            (false, s) => s.as_str().to_string(),
            (true, Severity::Error) => format!("\x1b[1;31m{}\x1b[0m", severity.as_str()),
            (true, Severity::Warning) => format!("\x1b[1;33m{}\x1b[0m", severity.as_str()),
        }
    }
}
