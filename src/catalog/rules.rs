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

//! Per-layer shape rules.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::computed::{self, positive_param};
use crate::shapes::{
    format_shape, normalize_axis, parse_pair, parse_shape, window_output_dim, Padding, Shape,
    ShapeError,
};
use crate::types::Params;

/// Element-wise combination performed by a merge layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    Concatenate,
    Add,
    Subtract,
    Multiply,
    Average,
    Maximum,
    Minimum,
}

impl MergeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            MergeMode::Concatenate => "concatenate",
            MergeMode::Add => "add",
            MergeMode::Subtract => "subtract",
            MergeMode::Multiply => "multiply",
            MergeMode::Average => "average",
            MergeMode::Maximum => "maximum",
            MergeMode::Minimum => "minimum",
        }
    }
}

impl fmt::Display for MergeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape behaviour of a layer type, selected in the catalog by `rule`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ShapeRule {
    /// Graph root: shape comes from the layer's own parameters.
    Input,
    Dense,
    /// Dense whose unit count is derived from `task_type`.
    TaskHead,
    #[serde(rename = "conv2d")]
    Conv2d,
    #[serde(rename = "conv2d_transpose")]
    Conv2dTranspose,
    #[serde(rename = "max_pool2d")]
    MaxPool2d,
    Flatten,
    #[serde(rename = "upsample2d")]
    UpSample2d,
    GlobalAveragePool,
    Embedding,
    Recurrent,
    Merge {
        mode: MergeMode,
    },
    /// Dropout, batch normalization, bare activations.
    Identity,
}

/// A successfully computed output shape, possibly with a warning about a
/// configuration that is valid but likely unintended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeComputation {
    pub shape: Shape,
    pub warning: Option<String>,
}

impl ShapeComputation {
    fn ok(shape: Shape) -> Self {
        Self {
            shape,
            warning: None,
        }
    }
}

fn rank(expected: &'static str, found: &[usize]) -> ShapeError {
    ShapeError::Rank {
        expected,
        found: found.to_vec(),
    }
}

fn single<'a>(inputs: &'a [Shape]) -> Result<&'a Shape, ShapeError> {
    match inputs {
        [only] => Ok(only),
        _ => Err(ShapeError::InputCount {
            expected: "exactly one",
            found: inputs.len(),
        }),
    }
}

fn image(inputs: &[Shape]) -> Result<[usize; 3], ShapeError> {
    match single(inputs)?.as_slice() {
        [h, w, c] => Ok([*h, *w, *c]),
        other => Err(rank("a 3-D (height, width, channels)", other)),
    }
}

fn padding(params: &Params) -> Result<Padding, ShapeError> {
    match params.present("padding") {
        None => Ok(Padding::default()),
        Some(value) => value
            .to_source()
            .parse()
            .map_err(|reason| ShapeError::InvalidParam {
                name: "padding".to_string(),
                reason,
            }),
    }
}

fn pair_or(params: &Params, name: &str, fallback: [usize; 2]) -> Result<[usize; 2], ShapeError> {
    match params.present(name) {
        Some(value) => parse_pair(name, value),
        None => Ok(fallback),
    }
}

fn pair(params: &Params, name: &str) -> Result<[usize; 2], ShapeError> {
    let value = params.present(name).ok_or_else(|| ShapeError::MissingParam {
        name: name.to_string(),
    })?;
    parse_pair(name, value)
}

fn scaled(dim: usize, factor: usize, rule: &'static str) -> Result<usize, ShapeError> {
    dim.checked_mul(factor).ok_or(ShapeError::Overflow { rule })
}

impl ShapeRule {
    pub fn is_root(&self) -> bool {
        matches!(self, ShapeRule::Input)
    }

    /// Check the number and ranks of the incoming shapes.
    pub fn validate_inputs(&self, inputs: &[Shape], _params: &Params) -> Result<(), ShapeError> {
        match self {
            ShapeRule::Input => {
                if inputs.is_empty() {
                    Ok(())
                } else {
                    Err(ShapeError::InputCount {
                        expected: "no",
                        found: inputs.len(),
                    })
                }
            }
            ShapeRule::Dense | ShapeRule::TaskHead => {
                let input = single(inputs)?;
                if input.is_empty() {
                    return Err(rank("an input of rank 1 or more", input));
                }
                Ok(())
            }
            ShapeRule::Conv2d
            | ShapeRule::Conv2dTranspose
            | ShapeRule::MaxPool2d
            | ShapeRule::UpSample2d => image(inputs).map(|_| ()),
            ShapeRule::Flatten | ShapeRule::GlobalAveragePool | ShapeRule::Identity => {
                single(inputs).map(|_| ())
            }
            ShapeRule::Embedding => match single(inputs)?.as_slice() {
                [_] | [_, _] => Ok(()),
                other => Err(rank("a 1-D (N) or 2-D (N, T)", other)),
            },
            ShapeRule::Recurrent => match single(inputs)?.as_slice() {
                [_, _, _] => Ok(()),
                other => Err(rank("a 3-D (N, T, features)", other)),
            },
            ShapeRule::Merge { .. } => {
                if inputs.len() < 2 {
                    Err(ShapeError::InputCount {
                        expected: "at least two",
                        found: inputs.len(),
                    })
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Compute the output shape for already validated inputs.
    ///
    /// `params` are the fully resolved bindings (catalog defaults, node
    /// parameters and computed placeholders).
    pub fn compute_shape(
        &self,
        inputs: &[Shape],
        params: &Params,
    ) -> Result<ShapeComputation, ShapeError> {
        match self {
            ShapeRule::Input => {
                let text = match params.present(computed::INPUT_SHAPE) {
                    Some(value) => value.to_source(),
                    None => computed::input_shape_text(params)?,
                };
                let shape = parse_shape(&text).map_err(|source| ShapeError::ParamParse {
                    name: computed::INPUT_SHAPE.to_string(),
                    source,
                })?;
                if shape.contains(&0) {
                    return Err(ShapeError::ZeroDimension(shape));
                }
                Ok(ShapeComputation::ok(shape))
            }
            ShapeRule::Dense => dense(single(inputs)?, positive_param(params, "units")?),
            ShapeRule::TaskHead => dense(single(inputs)?, computed::task_units(params)?),
            ShapeRule::Conv2d => {
                let [h, w, _] = image(inputs)?;
                let filters = positive_param(params, "filters")?;
                let [kh, kw] = pair(params, "kernel_size")?;
                let [sh, sw] = pair_or(params, "strides", [1, 1])?;
                let pad = padding(params)?;
                Ok(ShapeComputation::ok(vec![
                    window_output_dim(h, kh, sh, pad)?,
                    window_output_dim(w, kw, sw, pad)?,
                    filters,
                ]))
            }
            ShapeRule::Conv2dTranspose => {
                let [h, w, _] = image(inputs)?;
                let filters = positive_param(params, "filters")?;
                let [sh, sw] = pair_or(params, "strides", [1, 1])?;
                Ok(ShapeComputation::ok(vec![
                    scaled(h, sh, "conv2d_transpose")?,
                    scaled(w, sw, "conv2d_transpose")?,
                    filters,
                ]))
            }
            ShapeRule::MaxPool2d => {
                let [h, w, c] = image(inputs)?;
                let pool = pair_or(params, "pool_size", [2, 2])?;
                let [sh, sw] = pair_or(params, "strides", pool)?;
                let pad = padding(params)?;
                Ok(ShapeComputation::ok(vec![
                    window_output_dim(h, pool[0], sh, pad)?,
                    window_output_dim(w, pool[1], sw, pad)?,
                    c,
                ]))
            }
            ShapeRule::Flatten => {
                let size = single(inputs)?
                    .iter()
                    .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
                    .ok_or(ShapeError::Overflow { rule: "flatten" })?;
                Ok(ShapeComputation::ok(vec![size]))
            }
            ShapeRule::UpSample2d => {
                let [h, w, c] = image(inputs)?;
                let [fh, fw] = pair_or(params, "size", [2, 2])?;
                Ok(ShapeComputation::ok(vec![
                    scaled(h, fh, "upsample2d")?,
                    scaled(w, fw, "upsample2d")?,
                    c,
                ]))
            }
            ShapeRule::GlobalAveragePool => {
                let input = single(inputs)?;
                match input.as_slice() {
                    [_, _, c] => Ok(ShapeComputation::ok(vec![*c])),
                    _ => Ok(ShapeComputation::ok(input.clone())),
                }
            }
            ShapeRule::Embedding => {
                let dim = positive_param(params, "output_dim")?;
                match single(inputs)?.as_slice() {
                    [n] => Ok(ShapeComputation::ok(vec![*n, dim])),
                    [n, t] => Ok(ShapeComputation::ok(vec![*n, *t, dim])),
                    other => Err(rank("a 1-D (N) or 2-D (N, T)", other)),
                }
            }
            ShapeRule::Recurrent => {
                let units = positive_param(params, "units")?;
                match single(inputs)?.as_slice() {
                    [n, t, _] if params.flag("return_sequences") => {
                        Ok(ShapeComputation::ok(vec![*n, *t, units]))
                    }
                    [n, _, _] => Ok(ShapeComputation::ok(vec![*n, units])),
                    other => Err(rank("a 3-D (N, T, features)", other)),
                }
            }
            ShapeRule::Merge { mode } => merge(*mode, inputs, params),
            ShapeRule::Identity => Ok(ShapeComputation::ok(single(inputs)?.clone())),
        }
    }
}

/// Fully-connected rule. Inputs of rank 3 or more are accepted and treated
/// as implicitly flattened, with a warning.
fn dense(input: &Shape, units: usize) -> Result<ShapeComputation, ShapeError> {
    match input.len() {
        0 => Err(rank("an input of rank 1 or more", input)),
        1 | 2 => Ok(ShapeComputation::ok(vec![units])),
        n => Ok(ShapeComputation {
            shape: vec![units],
            warning: Some(format!(
                "rank-{n} input {} is flattened implicitly; add a Flatten layer to make this explicit",
                format_shape(input)
            )),
        }),
    }
}

fn merge(mode: MergeMode, inputs: &[Shape], params: &Params) -> Result<ShapeComputation, ShapeError> {
    let (first, rest) = match inputs {
        [first, rest @ ..] if !rest.is_empty() => (first, rest),
        _ => {
            return Err(ShapeError::InputCount {
                expected: "at least two",
                found: inputs.len(),
            })
        }
    };

    if mode != MergeMode::Concatenate {
        if let Some(other) = rest.iter().find(|shape| *shape != first) {
            return Err(ShapeError::MergeMismatch {
                mode: mode.as_str(),
                lhs: first.clone(),
                rhs: other.clone(),
            });
        }
        return Ok(ShapeComputation::ok(first.clone()));
    }

    let raw_axis = match params.present("axis") {
        Some(value) => value.as_i64().ok_or_else(|| ShapeError::InvalidParam {
            name: "axis".to_string(),
            reason: format!("expected an integer, got `{value}`"),
        })?,
        None => -1,
    };
    let axis = normalize_axis(raw_axis, first.len())?;
    let mut out = first.clone();
    for other in rest {
        let compatible = other.len() == first.len()
            && other
                .iter()
                .zip(first)
                .enumerate()
                .all(|(idx, (a, b))| idx == axis || a == b);
        if !compatible {
            return Err(ShapeError::ConcatMismatch {
                lhs: first.clone(),
                rhs: other.clone(),
                axis,
            });
        }
        out[axis] = out[axis]
            .checked_add(other[axis])
            .ok_or(ShapeError::Overflow { rule: "concatenate" })?;
    }
    Ok(ShapeComputation::ok(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParamValue;

    fn params(pairs: &[(&str, ParamValue)]) -> Params {
        pairs.iter().cloned().collect()
    }

    #[test]
    fn conv_same_and_valid() {
        let same = params(&[
            ("filters", 32.into()),
            ("kernel_size", "(3, 3)".into()),
            ("strides", "(1,1)".into()),
            ("padding", "same".into()),
        ]);
        let out = ShapeRule::Conv2d.compute_shape(&[vec![28, 28, 1]], &same).unwrap();
        assert_eq!(out.shape, vec![28, 28, 32]);

        let valid = params(&[
            ("filters", 32.into()),
            ("kernel_size", 3.into()),
            ("padding", "valid".into()),
        ]);
        let out = ShapeRule::Conv2d.compute_shape(&[vec![28, 28, 1]], &valid).unwrap();
        assert_eq!(out.shape, vec![26, 26, 32]);
    }

    #[test]
    fn pooling_defaults_stride_to_pool_size() {
        let p = params(&[("pool_size", "(2, 2)".into()), ("padding", "valid".into())]);
        let out = ShapeRule::MaxPool2d.compute_shape(&[vec![28, 28, 32]], &p).unwrap();
        assert_eq!(out.shape, vec![14, 14, 32]);
    }

    #[test]
    fn dense_warns_on_high_rank() {
        let p = params(&[("units", 10.into())]);
        let out = ShapeRule::Dense.compute_shape(&[vec![4, 4, 8]], &p).unwrap();
        assert_eq!(out.shape, vec![10]);
        assert!(out.warning.unwrap().contains("flattened implicitly"));
        let out = ShapeRule::Dense.compute_shape(&[vec![64]], &p).unwrap();
        assert!(out.warning.is_none());
    }

    #[test]
    fn merge_rules() {
        let none = Params::new();
        let concat = ShapeRule::Merge { mode: MergeMode::Concatenate };
        assert_eq!(
            concat.compute_shape(&[vec![128], vec![128]], &none).unwrap().shape,
            vec![256]
        );
        let axis0 = params(&[("axis", 0.into())]);
        assert_eq!(
            concat.compute_shape(&[vec![2, 5], vec![3, 5]], &axis0).unwrap().shape,
            vec![5, 5]
        );
        assert!(matches!(
            concat.compute_shape(&[vec![4, 8], vec![5, 8]], &none),
            Err(ShapeError::ConcatMismatch { .. })
        ));
        let add = ShapeRule::Merge { mode: MergeMode::Add };
        assert!(matches!(
            add.compute_shape(&[vec![4], vec![5]], &none),
            Err(ShapeError::MergeMismatch { .. })
        ));
        assert_eq!(
            add.validate_inputs(&[vec![4]], &none).unwrap_err(),
            ShapeError::InputCount { expected: "at least two", found: 1 }
        );
    }

    #[test]
    fn recurrent_and_embedding() {
        let seq = params(&[("units", 32.into()), ("return_sequences", true.into())]);
        let last = params(&[("units", 32.into())]);
        assert_eq!(
            ShapeRule::Recurrent.compute_shape(&[vec![8, 20, 4]], &seq).unwrap().shape,
            vec![8, 20, 32]
        );
        assert_eq!(
            ShapeRule::Recurrent.compute_shape(&[vec![8, 20, 4]], &last).unwrap().shape,
            vec![8, 32]
        );
        let emb = params(&[("output_dim", 16.into())]);
        assert_eq!(
            ShapeRule::Embedding.compute_shape(&[vec![100]], &emb).unwrap().shape,
            vec![100, 16]
        );
        assert!(ShapeRule::Embedding.validate_inputs(&[vec![1, 2, 3]], &emb).is_err());
    }

    #[test]
    fn transpose_and_upsampling_scale_height_and_width() {
        let strided = params(&[("filters", 8.into()), ("strides", "(2, 3)".into())]);
        assert_eq!(
            ShapeRule::Conv2dTranspose
                .compute_shape(&[vec![7, 7, 4]], &strided)
                .unwrap()
                .shape,
            vec![14, 21, 8]
        );

        let twice = params(&[("size", 2.into())]);
        assert_eq!(
            ShapeRule::UpSample2d.compute_shape(&[vec![7, 5, 3]], &twice).unwrap().shape,
            vec![14, 10, 3]
        );
        let uneven = params(&[("size", "(3, 1)".into())]);
        assert_eq!(
            ShapeRule::UpSample2d.compute_shape(&[vec![7, 5, 3]], &uneven).unwrap().shape,
            vec![21, 5, 3]
        );
    }

    #[test]
    fn global_pooling_passes_other_ranks_through() {
        let none = Params::new();
        let gap = ShapeRule::GlobalAveragePool;
        assert_eq!(gap.compute_shape(&[vec![7, 7, 64]], &none).unwrap().shape, vec![64]);
        assert_eq!(gap.compute_shape(&[vec![10, 16]], &none).unwrap().shape, vec![10, 16]);
        assert_eq!(gap.compute_shape(&[vec![32]], &none).unwrap().shape, vec![32]);
    }

    #[test]
    fn elementwise_merges_keep_the_shared_shape() {
        let none = Params::new();
        for mode in [
            MergeMode::Add,
            MergeMode::Subtract,
            MergeMode::Multiply,
            MergeMode::Average,
            MergeMode::Maximum,
            MergeMode::Minimum,
        ] {
            let rule = ShapeRule::Merge { mode };
            assert_eq!(
                rule.compute_shape(&[vec![4, 8], vec![4, 8], vec![4, 8]], &none)
                    .unwrap()
                    .shape,
                vec![4, 8],
                "{mode}"
            );
            assert_eq!(
                rule.compute_shape(&[vec![4, 8], vec![8, 4]], &none),
                Err(ShapeError::MergeMismatch {
                    mode: mode.as_str(),
                    lhs: vec![4, 8],
                    rhs: vec![8, 4],
                }),
                "{mode}"
            );
        }
    }

    #[test]
    fn oversized_outputs_are_errors() {
        let huge = 1usize << 32;
        assert_eq!(
            ShapeRule::Flatten.compute_shape(&[vec![huge, huge, huge]], &Params::new()),
            Err(ShapeError::Overflow { rule: "flatten" })
        );

        let size = params(&[("size", i64::MAX.into())]);
        assert_eq!(
            ShapeRule::UpSample2d.compute_shape(&[vec![28, 28, 3]], &size),
            Err(ShapeError::Overflow { rule: "upsample2d" })
        );

        let strides = params(&[("filters", 8.into()), ("strides", i64::MAX.into())]);
        assert_eq!(
            ShapeRule::Conv2dTranspose.compute_shape(&[vec![28, 28, 3]], &strides),
            Err(ShapeError::Overflow { rule: "conv2d_transpose" })
        );

        let concat = ShapeRule::Merge { mode: MergeMode::Concatenate };
        assert_eq!(
            concat.compute_shape(&[vec![usize::MAX], vec![1]], &Params::new()),
            Err(ShapeError::Overflow { rule: "concatenate" })
        );
    }

    #[test]
    fn rule_names_in_catalog_files() {
        let rule: ShapeRule = toml::from_str("rule = \"max_pool2d\"").unwrap();
        assert_eq!(rule, ShapeRule::MaxPool2d);
        let rule: ShapeRule = toml::from_str("rule = \"merge\"\nmode = \"average\"").unwrap();
        assert_eq!(rule, ShapeRule::Merge { mode: MergeMode::Average });
    }
}
