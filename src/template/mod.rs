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

//! Layer code templates.
//!
//! A template is plain text with `{{ name }}` placeholders and `{% ... %}`
//! block tags. Templates are tokenized and parsed once, when the catalog is
//! loaded; rendering walks the resulting tree and never fails.
//!
//! Supported conditions:
//!
//! | tag                         | true when                                   |
//! |-----------------------------|---------------------------------------------|
//! | `if v`                      | `v` is truthy                               |
//! | `if not v`                  | `v` is absent or falsy                      |
//! | `if v is defined`           | `v` is present, whatever its value          |
//! | `if v is not none`          | `v` is present, not null, not `""`          |
//! | `if v is none`              | the negation of `is not none`               |
//! | `if v == 'lit'` / `!=`      | the rendered value compares to `lit`        |
//!
//! Truthiness: null is false, booleans are themselves, numbers are true when
//! non-zero, strings are true when non-empty. `elif`/`else` chains and nested
//! blocks are allowed.
//!
//! ```
//! use netforge::template::Template;
//! use netforge::types::Params;
//!
//! let tpl = Template::parse("Dense({{units}}{% if activation is not none %}, activation='{{activation}}'{% endif %})").unwrap();
//! let params: Params = [("units", 64)].into_iter().collect();
//! assert_eq!(tpl.render(&params).text, "Dense(64)");
//! ```

mod lexer;
mod parser;

use std::fmt;

use crate::types::{ParamValue, Params};

pub use parser::Condition;
use parser::Node;

/// Template authoring errors, reported when a template is parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("unrecognised template text at offset {0}")]
    Lex(usize),
    #[error("invalid placeholder `{0}`")]
    BadPlaceholder(String),
    #[error("invalid condition `{0}`")]
    BadCondition(String),
    #[error("unknown block tag `{{% {0} %}}`")]
    UnknownTag(String),
    #[error("`{{% {0} %}}` without a matching `{{% if %}}`")]
    Unmatched(String),
    #[error("`{{% if {0} %}}` is never closed")]
    Unclosed(String),
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    source: String,
    nodes: Vec<Node>,
}

/// Output of [`Template::render`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    /// Placeholders that had no binding and were left verbatim.
    pub unresolved: Vec<String>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let pieces = lexer::pieces(source).map_err(TemplateError::Lex)?;
        let nodes = parser::parse(pieces)?;
        Ok(Self {
            source: source.to_string(),
            nodes,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Expand against `bindings`. Unbound placeholders stay in the output as
    /// written and are listed in [`Rendered::unresolved`].
    pub fn render(&self, bindings: &Params) -> Rendered {
        let mut out = Rendered {
            text: String::new(),
            unresolved: Vec::new(),
        };
        render_nodes(&self.nodes, bindings, &mut out);
        out
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn render_nodes(nodes: &[Node], bindings: &Params, out: &mut Rendered) {
    for node in nodes {
        match node {
            Node::Text(text) => out.text.push_str(text),
            Node::Var { name, raw } => match bindings.get(name) {
                Some(value) => out.text.push_str(&value.to_source()),
                None => {
                    out.text.push_str(raw);
                    if !out.unresolved.contains(name) {
                        out.unresolved.push(name.clone());
                    }
                }
            },
            Node::Cond {
                branches,
                otherwise,
            } => {
                let taken = branches
                    .iter()
                    .find(|(cond, _)| evaluate(cond, bindings))
                    .map(|(_, body)| body.as_slice())
                    .or(otherwise.as_deref());
                if let Some(body) = taken {
                    render_nodes(body, bindings, out);
                }
            }
        }
    }
}

/// Evaluate a condition against `bindings` using the coercion rules in the
/// module docs.
pub fn evaluate(cond: &Condition, bindings: &Params) -> bool {
    match cond {
        Condition::Truthy(name) => bindings.flag(name),
        Condition::Falsy(name) => !bindings.flag(name),
        Condition::Defined(name) => bindings.contains(name),
        Condition::NotNone(name) => bindings.present(name).is_some(),
        Condition::IsNone(name) => bindings.present(name).is_none(),
        Condition::Equals(name, literal) => bindings
            .get(name)
            .is_some_and(|value| rendered_eq(value, literal)),
        Condition::NotEquals(name, literal) => !bindings
            .get(name)
            .is_some_and(|value| rendered_eq(value, literal)),
    }
}

fn rendered_eq(value: &ParamValue, literal: &str) -> bool {
    match value {
        ParamValue::Str(s) => s == literal,
        other => other.to_source() == literal,
    }
}
