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

use logos::Logos;

/// Raw pieces of a code template.
#[derive(Logos, Debug, Clone, PartialEq)]
pub enum Piece {
    /// `{{ name }}` with the braces kept, so unresolved names can be echoed.
    #[regex(r"\{\{[^}]*\}\}", |lex| lex.slice().to_string())]
    Var(String),

    /// Inner text of a `{% ... %}` block tag.
    #[regex(r"\{%[^%]*%\}", |lex| {
        let slice = lex.slice();
        slice[2..slice.len() - 2].trim().to_string()
    })]
    Tag(String),

    #[regex(r"[^{]+", |lex| lex.slice().to_string())]
    #[token("{", |lex| lex.slice().to_string())]
    Text(String),
}

pub fn pieces(src: &str) -> Result<Vec<Piece>, usize> {
    let mut lexer = Piece::lexer(src);
    let mut out = Vec::new();
    while let Some(piece) = lexer.next() {
        match piece {
            Ok(piece) => out.push(piece),
            Err(()) => return Err(lexer.span().start),
        }
    }
    Ok(out)
}
