use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::token::{Token, TokenKind};
use crate::value::Value;

/// Set by `error`/`parser_error` whenever the scan, parse, or resolve phase
/// of the current `run` call reports a diagnostic (the resolver reports
/// through `parser_error` too, since its errors use the same "at token"
/// format as parse errors). `Lox::run` resets it before scanning and checks
/// it after resolution, since any of the three stages can fail independently
/// but all three must jointly gate whether interpretation proceeds.
pub static HAD_ERROR: AtomicBool = AtomicBool::new(false);

#[derive(Debug)]
pub enum Error {
    /// A scan or parse error already reported to stderr by `error`/`parser_error`.
    Parse,
    Runtime { token: Token, message: String },
    /// Not a user-visible error: the control-flow signal a `return` statement
    /// raises, caught by `Function::call` at the matching invocation boundary.
    Return { value: Value },
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parse => write!(f, "parse error"),
            Error::Runtime { token, message } => write!(f, "{}\n[line {}]", message, token.line),
            Error::Return { .. } => write!(f, "return outside of a function call"),
            Error::Io(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

pub fn error(line: u32, message: &str) {
    report(line, "", message);
}

/// Static error reported at a specific token, used by the parser and the
/// resolver. `AT_CLAUSE` is " at end" for EOF, otherwise " at 'LEXEME'".
pub fn parser_error(token: &Token, message: &str) {
    if token.kind == TokenKind::Eof {
        report(token.line, " at end", message);
    } else {
        report(token.line, &format!(" at '{}'", token.lexeme), message);
    }
}

/// Reports an uncaught runtime error. Does not panic or exit; the caller
/// decides whether to abort the current `run` call.
pub fn runtime_error(err: &Error) {
    if let Error::Runtime { token, message } = err {
        eprintln!("{}\n[line {}]", message, token.line);
    }
}

fn report(line: u32, where_: &str, message: &str) {
    eprintln!("[line {line}] Error{where_}: {message}");
    HAD_ERROR.store(true, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_error_message_has_message_then_line() {
        let err = Error::Runtime {
            token: Token::new(TokenKind::Plus, "+", 3),
            message: "Operands must be numbers.".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Operands must be numbers.\n[line 3]"
        );
    }
}
