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

use std::vec::IntoIter;

use super::lexer::Piece;
use super::TemplateError;

/// A conditional test on one variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Truthy(String),
    Falsy(String),
    Defined(String),
    NotNone(String),
    IsNone(String),
    Equals(String, String),
    NotEquals(String, String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    Var {
        name: String,
        raw: String,
    },
    Cond {
        branches: Vec<(Condition, Vec<Node>)>,
        otherwise: Option<Vec<Node>>,
    },
}

enum Tag {
    If(Condition),
    Elif(Condition),
    Else,
    EndIf,
}

pub(crate) fn parse(pieces: Vec<Piece>) -> Result<Vec<Node>, TemplateError> {
    let mut parser = Parser {
        pieces: pieces.into_iter(),
    };
    let (nodes, stop) = parser.block()?;
    match stop {
        None => Ok(nodes),
        Some(Tag::Elif(_)) => Err(TemplateError::Unmatched("elif".to_string())),
        Some(Tag::Else) => Err(TemplateError::Unmatched("else".to_string())),
        Some(Tag::EndIf) => Err(TemplateError::Unmatched("endif".to_string())),
        Some(Tag::If(_)) => unreachable!("`if` opens a nested block and never stops one"),
    }
}

struct Parser {
    pieces: IntoIter<Piece>,
}

impl Parser {
    /// Parse nodes until end of input or a tag that closes the current block.
    fn block(&mut self) -> Result<(Vec<Node>, Option<Tag>), TemplateError> {
        let mut nodes = Vec::new();
        while let Some(piece) = self.pieces.next() {
            match piece {
                Piece::Text(text) => match nodes.last_mut() {
                    Some(Node::Text(prev)) => prev.push_str(&text),
                    _ => nodes.push(Node::Text(text)),
                },
                Piece::Var(raw) => {
                    let name = raw[2..raw.len() - 2].trim().to_string();
                    if !is_ident(&name) {
                        return Err(TemplateError::BadPlaceholder(raw));
                    }
                    nodes.push(Node::Var { name, raw });
                }
                Piece::Tag(body) => match parse_tag(&body)? {
                    Tag::If(cond) => nodes.push(self.conditional(cond, &body)?),
                    stop => return Ok((nodes, Some(stop))),
                },
            }
        }
        Ok((nodes, None))
    }

    fn conditional(&mut self, first: Condition, opener: &str) -> Result<Node, TemplateError> {
        let unclosed = || {
            let cond = opener.strip_prefix("if").unwrap_or(opener).trim();
            TemplateError::Unclosed(cond.to_string())
        };
        let mut branches = Vec::new();
        let mut cond = first;
        loop {
            let (body, stop) = self.block()?;
            branches.push((cond, body));
            match stop {
                Some(Tag::Elif(next)) => cond = next,
                Some(Tag::Else) => {
                    let (otherwise, stop) = self.block()?;
                    return match stop {
                        Some(Tag::EndIf) => Ok(Node::Cond {
                            branches,
                            otherwise: Some(otherwise),
                        }),
                        Some(Tag::Else) => Err(TemplateError::Unmatched("else".to_string())),
                        Some(Tag::Elif(_)) => Err(TemplateError::Unmatched("elif".to_string())),
                        _ => Err(unclosed()),
                    };
                }
                Some(Tag::EndIf) => {
                    return Ok(Node::Cond {
                        branches,
                        otherwise: None,
                    })
                }
                _ => return Err(unclosed()),
            }
        }
    }
}

fn parse_tag(body: &str) -> Result<Tag, TemplateError> {
    let (keyword, rest) = match body.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (body, ""),
    };
    match (keyword, rest.is_empty()) {
        ("if", false) => Ok(Tag::If(parse_condition(rest)?)),
        ("elif", false) => Ok(Tag::Elif(parse_condition(rest)?)),
        ("else", true) => Ok(Tag::Else),
        ("endif", true) => Ok(Tag::EndIf),
        ("if" | "elif", true) => Err(TemplateError::BadCondition(String::new())),
        _ => Err(TemplateError::UnknownTag(body.to_string())),
    }
}

/// Parse the text after `if`/`elif`. The comparison forms are matched on the
/// whole expression, so `v is not none` can never be read as a bare `v`.
fn parse_condition(text: &str) -> Result<Condition, TemplateError> {
    let bad = || TemplateError::BadCondition(text.to_string());

    for (op, negated) in [("!=", true), ("==", false)] {
        if let Some((lhs, rhs)) = text.split_once(op) {
            let name = lhs.trim();
            if !is_ident(name) {
                return Err(bad());
            }
            let literal = parse_literal(rhs.trim()).ok_or_else(bad)?;
            return Ok(if negated {
                Condition::NotEquals(name.to_string(), literal)
            } else {
                Condition::Equals(name.to_string(), literal)
            });
        }
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    let (name, make): (&str, fn(String) -> Condition) = match words.as_slice() {
        [name, "is", "not", "none"] => (*name, Condition::NotNone),
        [name, "is", "none"] => (*name, Condition::IsNone),
        [name, "is", "defined"] => (*name, Condition::Defined),
        ["not", name] => (*name, Condition::Falsy),
        [name] => (*name, Condition::Truthy),
        _ => return Err(bad()),
    };
    if is_ident(name) {
        Ok(make(name.to_string()))
    } else {
        Err(bad())
    }
}

fn parse_literal(text: &str) -> Option<String> {
    let quoted = |q: char| {
        (text.len() >= 2 && text.starts_with(q) && text.ends_with(q))
            .then(|| text[1..text.len() - 1].to_string())
    };
    quoted('\'').or_else(|| quoted('"')).or_else(|| {
        (!text.is_empty() && !text.contains(char::is_whitespace)).then(|| text.to_string())
    })
}

fn is_ident(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::{parse_condition, Condition};

    #[test]
    fn condition_forms() {
        assert_eq!(
            parse_condition("strides is not none").unwrap(),
            Condition::NotNone("strides".into())
        );
        assert_eq!(
            parse_condition("strides is defined").unwrap(),
            Condition::Defined("strides".into())
        );
        assert_eq!(
            parse_condition("return_sequences").unwrap(),
            Condition::Truthy("return_sequences".into())
        );
        assert_eq!(
            parse_condition("padding == 'same'").unwrap(),
            Condition::Equals("padding".into(), "same".into())
        );
        assert_eq!(
            parse_condition("mode != concat").unwrap(),
            Condition::NotEquals("mode".into(), "concat".into())
        );
        assert!(parse_condition("a is maybe").is_err());
        assert!(parse_condition("== 'x'").is_err());
    }
}
