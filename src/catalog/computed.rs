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

//! Placeholders derived from higher-level parameters.
//!
//! `input_shape` comes from the root layer's `input_type` discriminator;
//! `output_units` and `output_activation` come from a task head's
//! `task_type`. A literal parameter with the same name always wins.

use std::fmt;
use std::str::FromStr;

use crate::shapes::{format_shape, ShapeError};
use crate::types::{ParamValue, Params};

pub const INPUT_SHAPE: &str = "input_shape";
pub const OUTPUT_UNITS: &str = "output_units";
pub const OUTPUT_ACTIVATION: &str = "output_activation";

/// Fixed set of root input kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// `(height, width, 1)`
    ImageGrayscale,
    /// `(height, width, 3)`
    ImageColor,
    /// `(size,)`
    Vector,
    /// `(sequence_length, features)`
    Sequence,
    /// the `shape` parameter verbatim
    Custom,
}

impl FromStr for InputKind {
    type Err = ShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "image_grayscale" => Ok(InputKind::ImageGrayscale),
            "image_color" | "image_rgb" => Ok(InputKind::ImageColor),
            "vector" | "flat" => Ok(InputKind::Vector),
            "sequence" => Ok(InputKind::Sequence),
            "custom" => Ok(InputKind::Custom),
            other => Err(ShapeError::UnknownInputType(other.to_string())),
        }
    }
}

/// Prediction task of a task head layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    Binary,
    Multiclass,
    Regression,
}

impl FromStr for TaskType {
    type Err = ShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "binary" | "binary_classification" => Ok(TaskType::Binary),
            "multiclass" | "multiclass_classification" => Ok(TaskType::Multiclass),
            "regression" => Ok(TaskType::Regression),
            other => Err(ShapeError::InvalidParam {
                name: "task_type".to_string(),
                reason: format!("unknown task type `{other}`"),
            }),
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskType::Binary => "binary",
            TaskType::Multiclass => "multiclass",
            TaskType::Regression => "regression",
        })
    }
}

impl TaskType {
    pub fn activation(self) -> &'static str {
        match self {
            TaskType::Binary => "sigmoid",
            TaskType::Multiclass => "softmax",
            TaskType::Regression => "linear",
        }
    }

    pub fn loss(self) -> &'static str {
        match self {
            TaskType::Binary => "binary_crossentropy",
            TaskType::Multiclass => "sparse_categorical_crossentropy",
            TaskType::Regression => "mse",
        }
    }

    pub fn metric(self) -> &'static str {
        match self {
            TaskType::Binary | TaskType::Multiclass => "accuracy",
            TaskType::Regression => "mae",
        }
    }

    pub fn from_params(params: &Params) -> Result<Self, ShapeError> {
        let raw = params
            .present("task_type")
            .ok_or_else(|| ShapeError::MissingParam {
                name: "task_type".to_string(),
            })?;
        raw.to_source().parse()
    }

    fn units(self, params: &Params) -> Result<usize, ShapeError> {
        match self {
            TaskType::Binary => Ok(1),
            TaskType::Multiclass => positive_param(params, "num_classes"),
            TaskType::Regression => match params.present("num_outputs") {
                Some(_) => positive_param(params, "num_outputs"),
                None => Ok(1),
            },
        }
    }
}

/// Read a strictly positive integer parameter.
pub fn positive_param(params: &Params, name: &str) -> Result<usize, ShapeError> {
    let value = params.present(name).ok_or_else(|| ShapeError::MissingParam {
        name: name.to_string(),
    })?;
    match value.as_i64() {
        Some(n) if n > 0 => usize::try_from(n).map_err(|_| ShapeError::InvalidParam {
            name: name.to_string(),
            reason: format!("{n} is too large"),
        }),
        Some(n) => Err(ShapeError::InvalidParam {
            name: name.to_string(),
            reason: format!("{n} is not positive"),
        }),
        None => Err(ShapeError::InvalidParam {
            name: name.to_string(),
            reason: format!("expected an integer, got `{value}`"),
        }),
    }
}

/// Shape string of a root layer, derived from its `input_type`.
pub fn input_shape_text(params: &Params) -> Result<String, ShapeError> {
    let kind = match params.present("input_type") {
        Some(value) => value.to_source().parse()?,
        None if params.present("shape").is_some() => InputKind::Custom,
        None => {
            return Err(ShapeError::MissingParam {
                name: "input_type".to_string(),
            })
        }
    };
    let dims = match kind {
        InputKind::ImageGrayscale => vec![
            positive_param(params, "height")?,
            positive_param(params, "width")?,
            1,
        ],
        InputKind::ImageColor => vec![
            positive_param(params, "height")?,
            positive_param(params, "width")?,
            3,
        ],
        InputKind::Vector => vec![positive_param(params, "size")?],
        InputKind::Sequence => vec![
            positive_param(params, "sequence_length")?,
            positive_param(params, "features")?,
        ],
        InputKind::Custom => {
            return params
                .present("shape")
                .map(ParamValue::to_source)
                .ok_or_else(|| ShapeError::MissingParam {
                    name: "shape".to_string(),
                })
        }
    };
    Ok(format_shape(&dims))
}

/// Units of a task head.
pub fn task_units(params: &Params) -> Result<usize, ShapeError> {
    TaskType::from_params(params)?.units(params)
}

/// Every computed placeholder that can be derived from `params`.
pub fn computed_bindings(params: &Params) -> Params {
    let mut out = Params::new();
    if params.contains("input_type") || params.contains("shape") {
        if let Ok(shape) = input_shape_text(params) {
            out.insert(INPUT_SHAPE, shape);
        }
    }
    if let Ok(task) = TaskType::from_params(params) {
        if let Ok(units) = task.units(params) {
            out.insert(OUTPUT_UNITS, units as i64);
        }
        out.insert(OUTPUT_ACTIVATION, task.activation());
    }
    out
}
