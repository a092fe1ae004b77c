use thiserror::Error as ThisError;

use crate::object::Object;
use crate::token::{Token, TokenType};

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    // The scanner/parser/resolver have already reported their own
    // `[line N] Error...` diagnostic(s) to stderr by the time this is
    // returned; it only tells the caller the pipeline can't continue.
    #[error("parse error")]
    Parse,

    #[error("[line {}] Error: {message}", token.line)]
    Runtime { token: Token, message: String },

    // The non-local control-transfer used to implement `return`. Never
    // printed and never meant to reach `main` - unwinding only through
    // user-function-call frames is asserted there.
    #[error("return")]
    Return { value: Object },
}

pub fn error(line: i32, message: &str) {
    report(line, "", message);
}

pub fn parser_error(token: &Token, message: &str) {
    if token.token_type == TokenType::Eof {
        report(token.line, " at end", message);
    } else {
        report(token.line, &format!(" '{}'", token.lexeme), message);
    }
}

pub fn runtime_error(error: &Error) {
    if let Error::Runtime { token, message } = error {
        report(token.line, "", message);
    }
}

fn report(line: i32, where_: &str, message: &str) {
    eprintln!("[line {line}] Error{where_}: {message}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_error_display_matches_diagnostic_format() {
        let err = Error::Runtime {
            token: Token::new(TokenType::Plus, "+", 3),
            message: "Operands must be two numbers or two strings.".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "[line 3] Error: Operands must be two numbers or two strings."
        );
    }
}
