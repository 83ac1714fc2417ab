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

//! `model = Sequential([...])`

use super::{
    repeat_comment, unknown_type_comment, Emitter, RenderWarning, Renderer, MAX_INLINE_REPEAT,
};
use crate::catalog::CodeForm;
use crate::graph::OrderedLayer;

const INDENT: &str = "    ";

/// One list element. `terminated` entries already end in a comma (or are
/// comments) and get no separator.
struct Entry {
    lines: Vec<String>,
    terminated: bool,
}

impl Entry {
    fn code(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
            terminated: false,
        }
    }

    fn comment(text: String) -> Self {
        Self {
            lines: vec![text],
            terminated: true,
        }
    }
}

pub(super) fn render(
    renderer: &Renderer<'_>,
    layers: &[OrderedLayer],
    warnings: &mut Vec<RenderWarning>,
) -> String {
    let mut entries = Vec::new();
    for layer in layers {
        let Some((spec, params, code)) = renderer.layer_code(layer, CodeForm::Stacked, warnings)
        else {
            entries.push(Entry::comment(unknown_type_comment(&layer.layer_type)));
            continue;
        };
        match spec.repeat_count(&params) {
            count if count > MAX_INLINE_REPEAT => {
                let mut lines = vec![repeat_comment(&layer.layer_type, count)];
                lines.push(format!("*[{} for _ in range({count})],", code.trim_end()));
                entries.push(Entry {
                    lines,
                    terminated: true,
                });
            }
            count => entries.extend((0..count).map(|_| Entry::code(&code))),
        }
    }

    let mut out = Emitter::default();
    out.push(&renderer.imports(layers, CodeForm::Stacked));
    out.blank();
    out.line(format_args!("model = Sequential(["));
    let last = entries.len().saturating_sub(1);
    for (idx, entry) in entries.iter().enumerate() {
        let final_line = entry.lines.len().saturating_sub(1);
        for (line_idx, line) in entry.lines.iter().enumerate() {
            let separator = if idx != last && line_idx == final_line && !entry.terminated {
                ","
            } else {
                ""
            };
            out.line(format_args!("{INDENT}{line}{separator}"));
        }
    }
    out.line(format_args!("])"));
    out.blank();
    out.push(&renderer.trailer(layers));
    out.finish()
}
