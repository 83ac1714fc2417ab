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

//! Shape strings, tuple parameters and the spatial output formulas shared by
//! the layer rules.

pub mod engine;

use std::fmt;
use std::str::FromStr;

use crate::lexer::{self, Token};
use crate::types::ParamValue;

/// A tensor shape without the batch dimension.
pub type Shape = Vec<usize>;

/// Malformed shape or tuple text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeParseError {
    #[error("unexpected character at offset {offset} in `{text}`")]
    InvalidCharacter { text: String, offset: usize },
    #[error("malformed shape `{text}`: {reason}")]
    Malformed { text: String, reason: &'static str },
    #[error("expected {expected} values but `{text}` has {found}")]
    Arity {
        text: String,
        expected: usize,
        found: usize,
    },
}

/// Errors raised by per-layer shape rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    #[error("expected {expected} input(s) but found {found}")]
    InputCount { expected: &'static str, found: usize },
    #[error("expected {expected} input but got shape {}", format_shape(.found))]
    Rank {
        expected: &'static str,
        found: Shape,
    },
    #[error("parameter `{name}` is missing")]
    MissingParam { name: String },
    #[error("parameter `{name}` is invalid: {reason}")]
    InvalidParam { name: String, reason: String },
    #[error("parameter `{name}`: {source}")]
    ParamParse {
        name: String,
        #[source]
        source: ShapeParseError,
    },
    #[error("kernel {kernel} is larger than input size {input} with `valid` padding")]
    KernelTooLarge { input: usize, kernel: usize },
    #[error("axis {axis} is out of range for rank {rank}")]
    AxisOutOfRange { axis: i64, rank: usize },
    #[error("cannot concatenate {} with {}: sizes differ on axis {axis}", format_shape(.lhs), format_shape(.rhs))]
    ConcatMismatch { lhs: Shape, rhs: Shape, axis: usize },
    #[error("`{mode}` needs identical shapes but got {} and {}", format_shape(.lhs), format_shape(.rhs))]
    MergeMismatch {
        mode: &'static str,
        lhs: Shape,
        rhs: Shape,
    },
    #[error("shape dimensions must be positive, got {}", format_shape(.0))]
    ZeroDimension(Shape),
    #[error("unknown input type `{0}`")]
    UnknownInputType(String),
    #[error("output size of `{rule}` does not fit in a dimension")]
    Overflow { rule: &'static str },
}

/// Parse a shape string such as `(28, 28, 1)`, `(784,)` or `()`.
///
/// Square brackets are accepted as well; whitespace is ignored anywhere.
pub fn parse_shape(text: &str) -> Result<Shape, ShapeParseError> {
    let tokens = lexer::lex(text).map_err(|offset| ShapeParseError::InvalidCharacter {
        text: text.to_string(),
        offset,
    })?;
    let malformed = |reason| ShapeParseError::Malformed {
        text: text.to_string(),
        reason,
    };

    let (open, close) = match (tokens.first(), tokens.last()) {
        (Some(Token::LParen), Some(Token::RParen)) => (Token::LParen, Token::RParen),
        (Some(Token::LBracket), Some(Token::RBracket)) => (Token::LBracket, Token::RBracket),
        (None, _) => return Err(malformed("empty string")),
        _ => return Err(malformed("expected a parenthesised list")),
    };
    let inner = &tokens[1..tokens.len() - 1];
    if inner.iter().any(|t| *t == open || *t == close) {
        return Err(malformed("nested brackets"));
    }
    parse_list(inner).ok_or_else(|| malformed("expected comma-separated integers"))
}

fn parse_list(tokens: &[Token]) -> Option<Shape> {
    let mut dims = Vec::new();
    let mut expect_value = true;
    for token in tokens {
        match (token, expect_value) {
            (Token::Int(n), true) => {
                dims.push(*n);
                expect_value = false;
            }
            (Token::Comma, false) => expect_value = true,
            _ => return None,
        }
    }
    // A trailing comma is allowed, so `(784,)` reads as a single dimension.
    Some(dims)
}

/// Format a shape the way [`parse_shape`] reads it back.
pub fn format_shape(shape: &[usize]) -> String {
    match shape {
        [] => "()".to_string(),
        [single] => format!("({single},)"),
        dims => {
            let parts: Vec<String> = dims.iter().map(usize::to_string).collect();
            format!("({})", parts.join(", "))
        }
    }
}

/// Read a two-axis tuple parameter (kernel size, strides, pool size, scale).
///
/// A single number stands for both axes.
pub fn parse_pair(name: &str, value: &ParamValue) -> Result<[usize; 2], ShapeError> {
    let invalid = |reason: String| ShapeError::InvalidParam {
        name: name.to_string(),
        reason,
    };
    if let Some(n) = value.as_i64() {
        let n = usize::try_from(n).map_err(|_| invalid(format!("{n} is negative")))?;
        return Ok([n, n]);
    }
    let text = match value {
        ParamValue::Str(text) => text,
        other => return Err(invalid(format!("expected a tuple, got {other}"))),
    };
    let dims = parse_shape(text).map_err(|source| ShapeError::ParamParse {
        name: name.to_string(),
        source,
    })?;
    match dims.as_slice() {
        [n] => Ok([*n, *n]),
        [a, b] => Ok([*a, *b]),
        _ => Err(ShapeError::ParamParse {
            name: name.to_string(),
            source: ShapeParseError::Arity {
                text: text.clone(),
                expected: 2,
                found: dims.len(),
            },
        }),
    }
}

/// Spatial padding mode for convolution and pooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Padding {
    #[default]
    Valid,
    Same,
}

impl FromStr for Padding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "valid" => Ok(Padding::Valid),
            "same" => Ok(Padding::Same),
            other => Err(format!("unknown padding `{other}`")),
        }
    }
}

impl fmt::Display for Padding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Padding::Valid => f.write_str("valid"),
            Padding::Same => f.write_str("same"),
        }
    }
}

/// Output length of one spatial axis.
///
/// `same`: `ceil(input / stride)`; `valid`: `floor((input - kernel) / stride) + 1`.
pub fn window_output_dim(
    input: usize,
    kernel: usize,
    stride: usize,
    padding: Padding,
) -> Result<usize, ShapeError> {
    if stride == 0 {
        return Err(ShapeError::InvalidParam {
            name: "strides".to_string(),
            reason: "stride must be non-zero".to_string(),
        });
    }
    if kernel == 0 {
        return Err(ShapeError::InvalidParam {
            name: "kernel_size".to_string(),
            reason: "kernel dimensions must be positive".to_string(),
        });
    }
    match padding {
        Padding::Same => Ok(input.div_ceil(stride)),
        Padding::Valid => {
            if kernel > input {
                return Err(ShapeError::KernelTooLarge { input, kernel });
            }
            Ok((input - kernel) / stride + 1)
        }
    }
}

/// Resolve a possibly negative axis against `rank`.
pub fn normalize_axis(axis: i64, rank: usize) -> Result<usize, ShapeError> {
    let rank_i = rank as i64;
    let idx = if axis < 0 { rank_i + axis } else { axis };
    if idx < 0 || idx >= rank_i {
        Err(ShapeError::AxisOutOfRange { axis, rank })
    } else {
        Ok(idx as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_formulas() {
        assert_eq!(window_output_dim(28, 3, 1, Padding::Same).unwrap(), 28);
        assert_eq!(window_output_dim(28, 3, 1, Padding::Valid).unwrap(), 26);
        assert_eq!(window_output_dim(28, 2, 2, Padding::Valid).unwrap(), 14);
        assert_eq!(window_output_dim(7, 3, 2, Padding::Same).unwrap(), 4);
        assert_eq!(
            window_output_dim(2, 3, 1, Padding::Valid).unwrap_err(),
            ShapeError::KernelTooLarge { input: 2, kernel: 3 }
        );
    }

    #[test]
    fn axis_normalization() {
        assert_eq!(normalize_axis(-1, 3).unwrap(), 2);
        assert_eq!(normalize_axis(0, 1).unwrap(), 0);
        assert!(normalize_axis(3, 3).is_err());
        assert!(normalize_axis(-4, 3).is_err());
    }

    #[test]
    fn padding_parses_case_insensitively() {
        assert_eq!("SAME".parse::<Padding>().unwrap(), Padding::Same);
        assert!("full".parse::<Padding>().is_err());
    }
}
