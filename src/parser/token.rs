// Copyright 2025 Treeq Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tokenizer for column arguments
//!
//! One tokenizer instance covers one column argument. An unbounded lookahead
//! buffer supports the backtracking the column-name pass needs.

use std::fmt;

use crate::core::{Error, Result};

/// Token kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    End,
    Id,
    StringLit,
    NumberLit,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    /// `::`
    Scope,
    Dot,
    /// `!`
    Not,
    /// `..`
    Attribute,
    /// `&`
    Concat,
    /// `-`, unary or infix
    Minus,
    Plus,
    Mult,
    Div,
    Mod,
    /// `^`
    Caret,
    /// `&&`
    And,
    /// `||`
    Or,
    Less,
    LessEquals,
    Equals,
    NotEquals,
    GreaterEquals,
    Greater,
    /// `--`
    OptionPrefix,
    /// `=`
    Assign,
    /// `...`
    Spread,
    Error,
}

impl TokenKind {
    /// True for tokens that can begin a unary expression
    pub fn is_unary(self) -> bool {
        matches!(self, TokenKind::Not | TokenKind::Minus)
    }

    /// True for binary infix operator tokens
    pub fn is_infix(self) -> bool {
        matches!(
            self,
            TokenKind::Attribute
                | TokenKind::Concat
                | TokenKind::Minus
                | TokenKind::Plus
                | TokenKind::Mult
                | TokenKind::Div
                | TokenKind::Mod
                | TokenKind::Caret
                | TokenKind::And
                | TokenKind::Or
                | TokenKind::Less
                | TokenKind::LessEquals
                | TokenKind::Equals
                | TokenKind::NotEquals
                | TokenKind::GreaterEquals
                | TokenKind::Greater
        )
    }

    /// Human-readable description for error messages
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::End => "end of argument",
            TokenKind::Id => "identifier",
            TokenKind::StringLit => "string literal",
            TokenKind::NumberLit => "number literal",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Comma => ",",
            TokenKind::Colon => ":",
            TokenKind::Scope => "::",
            TokenKind::Dot => ".",
            TokenKind::Not => "!",
            TokenKind::Attribute => "..",
            TokenKind::Concat => "&",
            TokenKind::Minus => "-",
            TokenKind::Plus => "+",
            TokenKind::Mult => "*",
            TokenKind::Div => "/",
            TokenKind::Mod => "%",
            TokenKind::Caret => "^",
            TokenKind::And => "&&",
            TokenKind::Or => "||",
            TokenKind::Less => "<",
            TokenKind::LessEquals => "<=",
            TokenKind::Equals => "==",
            TokenKind::NotEquals => "!=",
            TokenKind::GreaterEquals => ">=",
            TokenKind::Greater => ">",
            TokenKind::OptionPrefix => "--",
            TokenKind::Assign => "=",
            TokenKind::Spread => "...",
            TokenKind::Error => "error",
        }
    }
}

/// A lexical token
#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        Token {
            kind,
            text: text.into(),
        }
    }

    /// Description used in "expected X, got Y" messages
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Id | TokenKind::StringLit | TokenKind::NumberLit | TokenKind::Error
                if !self.text.is_empty() =>
            {
                self.text.clone()
            }
            kind => kind.describe().to_string(),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({})", self.text)
    }
}

/// Tokenizer over one column argument
pub struct Tokenizer {
    chars: Vec<char>,
    pos: usize,
    lookahead: Vec<Token>,
}

impl Tokenizer {
    pub fn new(input: &str) -> Self {
        Tokenizer {
            chars: input.chars().collect(),
            pos: 0,
            lookahead: Vec::new(),
        }
    }

    /// Peek at the token `n` positions ahead without consuming
    pub fn lookahead(&mut self, n: usize) -> Result<Token> {
        while self.lookahead.len() <= n {
            let token = self.scan()?;
            self.lookahead.push(token);
        }
        Ok(self.lookahead[n].clone())
    }

    /// Consume and return the next token
    pub fn next_token(&mut self) -> Result<Token> {
        if !self.lookahead.is_empty() {
            return Ok(self.lookahead.remove(0));
        }
        self.scan()
    }

    fn peek(&self) -> char {
        self.chars.get(self.pos).copied().unwrap_or('\0')
    }

    fn bump(&mut self) -> char {
        let c = self.peek();
        if c != '\0' {
            self.pos += 1;
        }
        c
    }

    fn scan(&mut self) -> Result<Token> {
        while self.peek().is_whitespace() {
            self.bump();
        }
        let c = self.bump();
        match c {
            '\0' => Ok(Token::new(TokenKind::End, "")),
            '-' => {
                if self.peek() == '-' {
                    self.bump();
                    Ok(Token::new(TokenKind::OptionPrefix, "--"))
                } else {
                    Ok(Token::new(TokenKind::Minus, "-"))
                }
            }
            '+' => Ok(Token::new(TokenKind::Plus, "+")),
            '*' => Ok(Token::new(TokenKind::Mult, "*")), // may be a wildcard; the parser decides
            '/' => Ok(Token::new(TokenKind::Div, "/")),
            '%' => Ok(Token::new(TokenKind::Mod, "%")),
            '^' => Ok(Token::new(TokenKind::Caret, "^")),
            '&' => {
                if self.peek() == '&' {
                    self.bump();
                    Ok(Token::new(TokenKind::And, "&&"))
                } else {
                    Ok(Token::new(TokenKind::Concat, "&"))
                }
            }
            '|' => {
                if self.peek() == '|' {
                    self.bump();
                    Ok(Token::new(TokenKind::Or, "||"))
                } else {
                    Ok(Token::new(TokenKind::Error, "no bitwise or"))
                }
            }
            '(' => Ok(Token::new(TokenKind::LParen, "(")),
            ')' => Ok(Token::new(TokenKind::RParen, ")")),
            '[' => Ok(Token::new(TokenKind::LBracket, "[")),
            ']' => Ok(Token::new(TokenKind::RBracket, "]")),
            '{' => Ok(Token::new(TokenKind::LBrace, "{")),
            '}' => Ok(Token::new(TokenKind::RBrace, "}")),
            ',' => Ok(Token::new(TokenKind::Comma, ",")),
            '.' => {
                if self.peek().is_ascii_digit() {
                    self.scan_number(String::from("."), true)
                } else if self.peek() == '.' {
                    self.bump();
                    if self.peek() == '.' {
                        self.bump();
                        Ok(Token::new(TokenKind::Spread, "..."))
                    } else {
                        Ok(Token::new(TokenKind::Attribute, ".."))
                    }
                } else {
                    Ok(Token::new(TokenKind::Dot, "."))
                }
            }
            ':' => {
                if self.peek() == ':' {
                    self.bump();
                    Ok(Token::new(TokenKind::Scope, "::"))
                } else {
                    Ok(Token::new(TokenKind::Colon, ":"))
                }
            }
            '<' => {
                if self.peek() == '=' {
                    self.bump();
                    Ok(Token::new(TokenKind::LessEquals, "<="))
                } else {
                    Ok(Token::new(TokenKind::Less, "<"))
                }
            }
            '=' => {
                if self.peek() == '=' {
                    self.bump();
                    Ok(Token::new(TokenKind::Equals, "=="))
                } else {
                    Ok(Token::new(TokenKind::Assign, "="))
                }
            }
            '!' => {
                if self.peek() == '=' {
                    self.bump();
                    Ok(Token::new(TokenKind::NotEquals, "!="))
                } else {
                    Ok(Token::new(TokenKind::Not, "!"))
                }
            }
            '>' => {
                if self.peek() == '=' {
                    self.bump();
                    Ok(Token::new(TokenKind::GreaterEquals, ">="))
                } else {
                    Ok(Token::new(TokenKind::Greater, ">"))
                }
            }
            '"' | '\'' => self.scan_string(c),
            c if c.is_ascii_digit() => self.scan_number(String::from(c), false),
            c if c.is_alphabetic() || c == '_' => {
                let mut text = String::from(c);
                loop {
                    let p = self.peek();
                    if p.is_alphanumeric() || p == '_' || p == ' ' {
                        text.push(self.bump());
                    } else {
                        break;
                    }
                }
                // identifiers may contain interior spaces; trailing runs
                // belong to the surrounding expression
                let trimmed = text.trim_end().to_string();
                self.pos -= text.len() - trimmed.len();
                Ok(Token::new(TokenKind::Id, trimmed))
            }
            other => Ok(Token::new(TokenKind::Error, other.to_string())),
        }
    }

    fn scan_string(&mut self, quote: char) -> Result<Token> {
        let mut text = String::new();
        loop {
            match self.peek() {
                '\0' => return Err(Error::UnterminatedString),
                '\\' => {
                    self.bump();
                    let escaped = self.bump();
                    match escaped {
                        '\0' => return Err(Error::DanglingEscape),
                        'n' => text.push('\n'),
                        'r' => text.push('\r'),
                        't' => text.push('\t'),
                        other => text.push(other),
                    }
                }
                c if c == quote => {
                    self.bump();
                    return Ok(Token::new(TokenKind::StringLit, text));
                }
                _ => text.push(self.bump()),
            }
        }
    }

    fn scan_number(&mut self, mut text: String, mut saw_decimal: bool) -> Result<Token> {
        loop {
            let p = self.peek();
            if p.is_ascii_digit() || (p == '.' && !saw_decimal) {
                saw_decimal |= p == '.';
                text.push(self.bump());
            } else {
                break;
            }
        }
        if self.peek() == '.' && saw_decimal {
            // a second decimal point can only follow an attribute or spread
            if self.chars.get(self.pos + 1) != Some(&'.') {
                text.push(self.bump());
                return Ok(Token::new(TokenKind::Error, text));
            }
        }
        Ok(Token::new(TokenKind::NumberLit, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let mut t = Tokenizer::new(input);
        let mut out = Vec::new();
        loop {
            let tok = t.next_token().unwrap();
            let kind = tok.kind;
            out.push(kind);
            if kind == TokenKind::End {
                return out;
            }
        }
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            kinds("a + b"),
            vec![
                TokenKind::Id,
                TokenKind::Plus,
                TokenKind::Id,
                TokenKind::End
            ]
        );
        assert_eq!(
            kinds("sum[v]"),
            vec![
                TokenKind::Id,
                TokenKind::LBracket,
                TokenKind::Id,
                TokenKind::RBracket,
                TokenKind::End
            ]
        );
    }

    #[test]
    fn test_dots() {
        assert_eq!(
            kinds("a.b"),
            vec![TokenKind::Id, TokenKind::Dot, TokenKind::Id, TokenKind::End]
        );
        assert_eq!(
            kinds("a..b"),
            vec![
                TokenKind::Id,
                TokenKind::Attribute,
                TokenKind::Id,
                TokenKind::End
            ]
        );
        assert_eq!(kinds("..."), vec![TokenKind::Spread, TokenKind::End]);
        assert_eq!(kinds(".5"), vec![TokenKind::NumberLit, TokenKind::End]);
    }

    #[test]
    fn test_two_char_operators() {
        assert_eq!(
            kinds("a<=b && c||d"),
            vec![
                TokenKind::Id,
                TokenKind::LessEquals,
                TokenKind::Id,
                TokenKind::And,
                TokenKind::Id,
                TokenKind::Or,
                TokenKind::Id,
                TokenKind::End
            ]
        );
        assert_eq!(
            kinds("--opt=1"),
            vec![
                TokenKind::OptionPrefix,
                TokenKind::Id,
                TokenKind::Assign,
                TokenKind::NumberLit,
                TokenKind::End
            ]
        );
        assert_eq!(
            kinds("join::id"),
            vec![
                TokenKind::Id,
                TokenKind::Scope,
                TokenKind::Id,
                TokenKind::End
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        let mut t = Tokenizer::new(r#""a\nb\"c""#);
        let tok = t.next_token().unwrap();
        assert_eq!(tok.kind, TokenKind::StringLit);
        assert_eq!(tok.text, "a\nb\"c");
    }

    #[test]
    fn test_unterminated_string() {
        let mut t = Tokenizer::new("\"abc");
        assert!(t.next_token().is_err());
    }

    #[test]
    fn test_identifier_with_interior_space() {
        let mut t = Tokenizer::new("order line + 1");
        let tok = t.next_token().unwrap();
        assert_eq!(tok.text, "order line");
        assert_eq!(t.next_token().unwrap().kind, TokenKind::Plus);
    }

    #[test]
    fn test_number_with_two_decimals_is_error() {
        let mut t = Tokenizer::new("1.2.3");
        assert_eq!(t.next_token().unwrap().kind, TokenKind::Error);
    }

    #[test]
    fn test_lookahead_preserves_order() {
        let mut t = Tokenizer::new("a,b");
        assert_eq!(t.lookahead(1).unwrap().kind, TokenKind::Comma);
        assert_eq!(t.lookahead(0).unwrap().text, "a");
        assert_eq!(t.next_token().unwrap().text, "a");
        assert_eq!(t.next_token().unwrap().kind, TokenKind::Comma);
    }
}
