//! Hand-written scanner
//!
//! Produces the full token sequence in one pass. Lexical errors are logged
//! through the diagnostic sink and scanning continues so that later phases
//! can surface as many problems as possible in one run.

use crate::diagnostic::DiagnosticSink;
use crate::token::{Literal, Token, TokenKind};

/// The scanner state
pub struct Lexer<'a> {
    source: &'a str,
    chars: Vec<char>,
    start: usize,
    current: usize,
    line: u32,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    /// Create a scanner over the given source text
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            start: 0,
            current: 0,
            line: 1,
            tokens: Vec::new(),
        }
    }

    /// Scan the whole input, logging lexical errors into `diags`
    pub fn scan_tokens(mut self, diags: &mut DiagnosticSink) -> Vec<Token> {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token(diags);
        }

        self.tokens.push(Token::new(TokenKind::Eof, "", self.line));
        self.tokens
    }

    fn scan_token(&mut self, diags: &mut DiagnosticSink) {
        let c = self.advance();
        match c {
            '(' => self.add_token(TokenKind::LeftParen),
            ')' => self.add_token(TokenKind::RightParen),
            '{' => self.add_token(TokenKind::LeftBrace),
            '}' => self.add_token(TokenKind::RightBrace),
            '[' => self.add_token(TokenKind::LeftBracket),
            ']' => self.add_token(TokenKind::RightBracket),
            ',' => self.add_token(TokenKind::Comma),
            '.' => self.add_token(TokenKind::Dot),
            ';' => self.add_token(TokenKind::Semicolon),
            ':' => self.add_token(TokenKind::Colon),
            '?' => self.add_token(TokenKind::Question),
            '%' => self.add_token(TokenKind::Percent),
            '+' => {
                let kind = if self.match_char('+') {
                    TokenKind::PlusPlus
                } else {
                    TokenKind::Plus
                };
                self.add_token(kind);
            }
            '-' => {
                let kind = if self.match_char('-') {
                    TokenKind::MinusMinus
                } else if self.match_char('>') {
                    TokenKind::Arrow
                } else {
                    TokenKind::Minus
                };
                self.add_token(kind);
            }
            '*' => {
                let kind = if self.match_char('*') {
                    TokenKind::StarStar
                } else {
                    TokenKind::Star
                };
                self.add_token(kind);
            }
            '!' => {
                let kind = if self.match_char('=') {
                    TokenKind::BangEqual
                } else {
                    TokenKind::Bang
                };
                self.add_token(kind);
            }
            '=' => {
                let kind = if self.match_char('=') {
                    TokenKind::EqualEqual
                } else {
                    TokenKind::Equal
                };
                self.add_token(kind);
            }
            '<' => {
                let kind = if self.match_char('=') {
                    TokenKind::LessEqual
                } else {
                    TokenKind::Less
                };
                self.add_token(kind);
            }
            '>' => {
                let kind = if self.match_char('=') {
                    TokenKind::GreaterEqual
                } else {
                    TokenKind::Greater
                };
                self.add_token(kind);
            }
            '/' => {
                if self.match_char('/') {
                    while self.peek() != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                } else if self.match_char('*') {
                    self.block_comment(diags);
                } else {
                    self.add_token(TokenKind::Slash);
                }
            }
            ' ' | '\r' | '\t' => {}
            '\n' => self.line += 1,
            '"' => self.string(diags),
            c if c.is_ascii_digit() => self.number(),
            c if c.is_alphabetic() || c == '_' => self.identifier(),
            _ => diags.lex_error(self.line, format!("Unexpected character '{}'.", c)),
        }
    }

    fn block_comment(&mut self, diags: &mut DiagnosticSink) {
        while !self.is_at_end() {
            if self.peek() == '*' && self.peek_next() == '/' {
                self.advance();
                self.advance();
                return;
            }
            if self.peek() == '\n' {
                self.line += 1;
            }
            self.advance();
        }
        diags.lex_error(self.line, "Unterminated block comment.");
    }

    fn string(&mut self, diags: &mut DiagnosticSink) {
        while self.peek() != '"' && !self.is_at_end() {
            if self.peek() == '\n' {
                self.line += 1;
            }
            self.advance();
        }

        if self.is_at_end() {
            diags.lex_error(self.line, "Unterminated string.");
            return;
        }

        self.advance(); // the closing quote

        let value: String = self.chars[self.start + 1..self.current - 1]
            .iter()
            .collect();
        let lexeme = self.lexeme();
        self.tokens.push(Token::with_literal(
            TokenKind::StringLiteral,
            lexeme,
            Literal::String(value),
            self.line,
        ));
    }

    fn number(&mut self) {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        let mut floating = false;
        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            floating = true;
            self.advance(); // the dot
            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let lexeme = self.lexeme();
        if floating {
            let value: f64 = lexeme.parse().unwrap_or(0.0);
            self.tokens.push(Token::with_literal(
                TokenKind::FloatingLiteral,
                lexeme,
                Literal::Floating(value),
                self.line,
            ));
        } else {
            let value: i64 = lexeme.parse().unwrap_or(0);
            self.tokens.push(Token::with_literal(
                TokenKind::IntegerLiteral,
                lexeme,
                Literal::Integer(value),
                self.line,
            ));
        }
    }

    fn identifier(&mut self) {
        while self.peek().is_alphanumeric() || self.peek() == '_' {
            self.advance();
        }

        let lexeme = self.lexeme();
        let kind = keyword(&lexeme).unwrap_or(TokenKind::Identifier);
        match kind {
            TokenKind::True => self.tokens.push(Token::with_literal(
                kind,
                lexeme,
                Literal::Boolean(true),
                self.line,
            )),
            TokenKind::False => self.tokens.push(Token::with_literal(
                kind,
                lexeme,
                Literal::Boolean(false),
                self.line,
            )),
            TokenKind::Nil => {
                self.tokens
                    .push(Token::with_literal(kind, lexeme, Literal::Nil, self.line))
            }
            _ => self.tokens.push(Token::new(kind, lexeme, self.line)),
        }
    }

    fn lexeme(&self) -> String {
        self.chars[self.start..self.current].iter().collect()
    }

    fn add_token(&mut self, kind: TokenKind) {
        let lexeme = self.lexeme();
        self.tokens.push(Token::new(kind, lexeme, self.line));
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.chars[self.current] != expected {
            return false;
        }
        self.current += 1;
        true
    }

    fn peek(&self) -> char {
        if self.is_at_end() {
            '\0'
        } else {
            self.chars[self.current]
        }
    }

    fn peek_next(&self) -> char {
        if self.current + 1 >= self.chars.len() {
            '\0'
        } else {
            self.chars[self.current + 1]
        }
    }

    fn advance(&mut self) -> char {
        let c = self.chars[self.current];
        self.current += 1;
        c
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.chars.len()
    }

    /// The raw source this scanner was created over
    pub fn source(&self) -> &str {
        self.source
    }
}

fn keyword(name: &str) -> Option<TokenKind> {
    Some(match name {
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "var" => TokenKind::Var,
        "const" => TokenKind::Const,
        "fun" => TokenKind::Fun,
        "class" => TokenKind::Class,
        "operator" => TokenKind::Operator,
        "constructor" => TokenKind::Constructor,
        "this" => TokenKind::This,
        "base" => TokenKind::Base,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "for" => TokenKind::For,
        "foreach" => TokenKind::Foreach,
        "in" => TokenKind::In,
        "return" => TokenKind::Return,
        "print" => TokenKind::Print,
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "nil" => TokenKind::Nil,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::DiagnosticSink;

    fn scan(source: &str) -> (Vec<Token>, DiagnosticSink) {
        let mut diags = DiagnosticSink::new();
        let tokens = Lexer::new(source).scan_tokens(&mut diags);
        (tokens, diags)
    }

    fn kinds(source: &str) -> Vec<TokenKind> {
        scan(source).0.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("+ ++ - -- -> * ** ?:"),
            vec![
                TokenKind::Plus,
                TokenKind::PlusPlus,
                TokenKind::Minus,
                TokenKind::MinusMinus,
                TokenKind::Arrow,
                TokenKind::Star,
                TokenKind::StarStar,
                TokenKind::Question,
                TokenKind::Colon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_integer_and_floating_split() {
        let (tokens, _) = scan("42 3.5");
        assert_eq!(tokens[0].literal, Some(Literal::Integer(42)));
        assert_eq!(tokens[1].literal, Some(Literal::Floating(3.5)));
    }

    #[test]
    fn test_keywords_vs_identifiers() {
        let (tokens, _) = scan("foreach forty class classy");
        assert_eq!(tokens[0].kind, TokenKind::Foreach);
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
        assert_eq!(tokens[2].kind, TokenKind::Class);
        assert_eq!(tokens[3].kind, TokenKind::Identifier);
    }

    #[test]
    fn test_string_literal() {
        let (tokens, diags) = scan("\"hello\"");
        assert!(!diags.had_error());
        assert_eq!(tokens[0].literal, Some(Literal::String("hello".into())));
    }

    #[test]
    fn test_unterminated_string_is_logged() {
        let (_, diags) = scan("\"oops");
        assert!(diags.had_error());
    }

    #[test]
    fn test_block_comment_tracks_lines() {
        let (tokens, diags) = scan("/* line\nline */ var");
        assert!(!diags.had_error());
        assert_eq!(tokens[0].kind, TokenKind::Var);
        assert_eq!(tokens[0].line, 2);
    }

    #[test]
    fn test_unterminated_block_comment_is_logged() {
        let (_, diags) = scan("/* never closed");
        assert!(diags.had_error());
    }
}
