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

//! Functional form: one binding per layer, then
//! `model = Model(inputs=..., outputs=...)`.

use super::{
    repeat_comment, unknown_type_comment, Emitter, RenderWarning, Renderer, MAX_INLINE_REPEAT,
};
use crate::catalog::CodeForm;
use crate::graph::DagResult;
use crate::types::Scope;

pub(super) fn render(
    renderer: &Renderer<'_>,
    dag: &DagResult,
    warnings: &mut Vec<RenderWarning>,
) -> String {
    let mut body = Emitter::default();
    let mut inputs = Vec::new();
    let mut outputs = Vec::new();

    for layer in &dag.ordered {
        let Some((spec, params, code)) = renderer.layer_code(layer, CodeForm::Wired, warnings)
        else {
            // Successors still refer to this name, so it passes its input on.
            let preds = dag
                .predecessors(&layer.id)
                .iter()
                .map(|pred| pred.var_name.as_str())
                .collect::<Vec<_>>();
            body.line(format_args!("{}", unknown_type_comment(&layer.layer_type)));
            let alias = match preds.as_slice() {
                [] => "None".to_string(),
                _ => tensor_list(&preds),
            };
            body.line(format_args!("{} = {alias}", layer.var_name));
            continue;
        };
        let var = layer.var_name.as_str();
        let is_sink = dag
            .successors
            .get(&layer.id)
            .map_or(true, Vec::is_empty);
        if is_sink {
            outputs.push(var);
        }

        if spec.is_root() {
            inputs.push(var);
            body.line(format_args!("{var} = {code}"));
            continue;
        }

        let preds = dag.predecessors(&layer.id);
        let count = spec.repeat_count(&params);
        if count > MAX_INLINE_REPEAT {
            body.line(format_args!("{}", repeat_comment(&layer.layer_type, count)));
        }

        match preds.as_slice() {
            [] => {
                warnings.push(RenderWarning {
                    scope: Scope::node(&layer.id),
                    message: "layer has no input connection; bound without a call".to_string(),
                });
                body.line(format_args!(
                    "# Warning: layer '{}' has no input connection",
                    layer.id
                ));
                body.line(format_args!("{var} = {code}"));
            }
            [single] => body.line(format_args!("{var} = {code}({})", single.var_name)),
            many => {
                let names = many
                    .iter()
                    .map(|pred| pred.var_name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                body.line(format_args!("{var} = {code}([{names}])"));
            }
        }

        if count > MAX_INLINE_REPEAT {
            body.line(format_args!("for _ in range({}):", count - 1));
            body.line(format_args!("    {var} = {code}({var})"));
        } else {
            for _ in 1..count {
                body.line(format_args!("{var} = {code}({var})"));
            }
        }
    }

    let mut out = Emitter::default();
    out.push(&renderer.imports(&dag.ordered, CodeForm::Wired));
    out.blank();
    out.push(&body.finish());
    out.blank();
    out.line(format_args!(
        "model = Model(inputs={}, outputs={})",
        tensor_list(&inputs),
        tensor_list(&outputs)
    ));
    out.blank();
    out.push(&renderer.trailer(&dag.ordered));
    out.finish()
}

/// A single tensor stands alone; anything else is a Python list.
fn tensor_list(vars: &[&str]) -> String {
    match vars {
        [single] => (*single).to_string(),
        many => format!("[{}]", many.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::tensor_list;

    #[test]
    fn tensor_lists() {
        assert_eq!(tensor_list(&["input"]), "input");
        assert_eq!(tensor_list(&["a", "b"]), "[a, b]");
        assert_eq!(tensor_list(&[]), "[]");
    }
}
