// A lexeme is the raw sequence of characters in the source code that represents a meaningful unit
// A token is a categorized representation of a lexeme, pairing it with its type

use crate::error::error;
use crate::token::{Token, TokenType, KEYWORDS};

pub struct Scanner {
    source: Vec<char>,
    tokens: Vec<Token>,
    start: usize,
    current: usize,
    line: i32,
    had_error: bool,
}

impl Scanner {
    pub fn new(source: String) -> Self {
        Self {
            source: source.chars().collect(),
            tokens: Vec::new(),
            start: 0,
            current: 0,
            line: 1,
            had_error: false,
        }
    }

    pub fn had_error(&self) -> bool {
        self.had_error
    }

    pub fn scan_tokens(&mut self) -> &Vec<Token> {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token()
        }

        self.tokens.push(Token::new(TokenType::Eof, "", self.line));
        &self.tokens
    }

    fn scan_token(&mut self) {
        let c: char = self.advance();
        match c {
            // single char
            '(' => self.add_token(TokenType::LeftParen),
            ')' => self.add_token(TokenType::RightParen),
            '{' => self.add_token(TokenType::LeftBrace),
            '}' => self.add_token(TokenType::RightBrace),
            ',' => self.add_token(TokenType::Comma),
            '.' => self.add_token(TokenType::Dot),
            '-' => self.add_token(TokenType::Minus),
            '+' => self.add_token(TokenType::Plus),
            ';' => self.add_token(TokenType::Semicolon),
            '*' => self.add_token(TokenType::Star),

            // can be double char
            '!' => {
                if self.r#match('=') {
                    self.add_token(TokenType::BangEqual);
                } else {
                    self.add_token(TokenType::Bang);
                }
            }
            '=' => {
                if self.r#match('=') {
                    self.add_token(TokenType::EqualEqual);
                } else {
                    self.add_token(TokenType::Equal);
                }
            }
            '<' => {
                if self.r#match('=') {
                    self.add_token(TokenType::LessEqual);
                } else {
                    self.add_token(TokenType::Less);
                }
            }
            '>' => {
                if self.r#match('=') {
                    self.add_token(TokenType::GreaterEqual);
                } else {
                    self.add_token(TokenType::Greater);
                }
            }

            // can be comment
            '/' => {
                if self.r#match('/') {
                    while self.peek() != '\n' && !self.is_at_end() {
                        self.advance();
                    }
                } else {
                    self.add_token(TokenType::Slash);
                }
            }

            // ignore whitespace
            ' ' | '\t' | '\r' => (),

            // handle new line
            '\n' => {
                self.line += 1;
            }

            '"' => self.string(),

            c => {
                if c.is_ascii_digit() {
                    self.number()
                } else if c.is_alphabetic() || c == '_' {
                    self.identifier()
                } else {
                    self.error(&format!("Unexpected character: \"{c}\""));
                }
            }
        }
    }

    // consume characters until we reach the closing "
    fn string(&mut self) {
        while self.peek() != '"' && !self.is_at_end() {
            if self.peek() == '\n' {
                self.line += 1;
            }
            self.advance();
        }

        if self.is_at_end() {
            self.error("Unterminated string");
            return;
        }

        // the closing "
        self.advance();

        // trim the surrounding quotes
        let literal: String = self.source[(self.start + 1)..(self.current - 1)]
            .iter()
            .collect();

        self.add_token(TokenType::String { literal });
    }

    fn number(&mut self) {
        while self.peek().is_ascii_digit() {
            self.advance();
        }

        // a trailing '.' not followed by a digit is not part of the number
        if self.peek() == '.' && self.peek_next().is_ascii_digit() {
            self.advance();

            while self.peek().is_ascii_digit() {
                self.advance();
            }
        }

        let literal: f64 = self.source[self.start..self.current]
            .iter()
            .collect::<String>()
            .parse()
            .expect("scanned number lexeme always parses as f64");

        self.add_token(TokenType::Number { literal });
    }

    fn identifier(&mut self) {
        while self.peek().is_alphanumeric() || self.peek() == '_' {
            self.advance();
        }

        let text: String = self.source[self.start..self.current].iter().collect();
        let tpe = KEYWORDS
            .get(text.as_str())
            .cloned()
            .unwrap_or(TokenType::Identifier);

        self.add_token(tpe);
    }

    fn advance(&mut self) -> char {
        self.current += 1;
        self.source[self.current - 1]
    }

    // it's like advance but doesn't consume the next character
    fn peek(&self) -> char {
        self.source.get(self.current).copied().unwrap_or('\0')
    }

    fn peek_next(&self) -> char {
        self.source.get(self.current + 1).copied().unwrap_or('\0')
    }

    fn add_token(&mut self, token_type: TokenType) {
        let text: String = self.source[self.start..self.current].iter().collect();
        self.tokens.push(Token::new(token_type, &text, self.line));
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source.len()
    }

    // we only consume the current character if that is what we are looking for
    fn r#match(&mut self, expected: char) -> bool {
        if self.is_at_end() || self.source[self.current] != expected {
            return false;
        }

        self.current += 1;
        true
    }

    fn error(&mut self, message: &str) {
        self.had_error = true;
        error(self.line, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(source: &str) -> Vec<Token> {
        let mut scanner = Scanner::new(source.to_string());
        scanner.scan_tokens().clone()
    }

    #[test]
    fn every_scan_ends_with_a_single_eof() {
        let tokens = scan("var a = 1;");
        assert_eq!(tokens.last().unwrap().token_type, TokenType::Eof);
        assert_eq!(
            tokens
                .iter()
                .filter(|t| t.token_type == TokenType::Eof)
                .count(),
            1
        );
    }

    #[test]
    fn greedy_two_character_operators() {
        let tokens = scan("!= == <= >= ! = < >");
        let kinds: Vec<_> = tokens.iter().map(|t| t.token_type.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                TokenType::BangEqual,
                TokenType::EqualEqual,
                TokenType::LessEqual,
                TokenType::GreaterEqual,
                TokenType::Bang,
                TokenType::Equal,
                TokenType::Less,
                TokenType::Greater,
                TokenType::Eof,
            ]
        );
    }

    #[test]
    fn string_literal_strips_quotes_and_tracks_newlines() {
        let tokens = scan("\"a\nb\"");
        match &tokens[0].token_type {
            TokenType::String { literal } => assert_eq!(literal, "a\nb"),
            other => panic!("expected a string token, got {other:?}"),
        }
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[1].line, 2); // EOF, after the embedded newline
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let mut scanner = Scanner::new("\"oops".to_string());
        scanner.scan_tokens();
        assert!(scanner.had_error());
    }

    #[test]
    fn trailing_dot_without_digit_is_not_consumed() {
        let tokens = scan("1.");
        match &tokens[0].token_type {
            TokenType::Number { literal } => assert_eq!(*literal, 1.0),
            other => panic!("expected a number token, got {other:?}"),
        }
        assert_eq!(tokens[1].token_type, TokenType::Dot);
    }

    #[test]
    fn keyword_vs_identifier() {
        let tokens = scan("class classy");
        assert_eq!(tokens[0].token_type, TokenType::Class);
        assert_eq!(tokens[1].token_type, TokenType::Identifier);
    }
}
