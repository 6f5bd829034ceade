pub mod class;
pub mod environment;
pub mod error;
pub mod function;
pub mod interpreter;
pub mod parser;
pub mod resolver;
pub mod scanner;
pub mod syntax;
pub mod token;
pub mod value;

use std::fs;
use std::io::{self, BufRead, Write};
use std::sync::atomic::Ordering;

pub use error::Error;
pub use interpreter::Interpreter;

use parser::Parser;
use resolver::Resolver;
use scanner::Scanner;

/// Drives one source through scan → parse → resolve → interpret, keeping the
/// interpreter (and therefore the global environment) alive across calls so
/// a REPL session can build on what came before.
pub struct Lox {
    interpreter: Interpreter,
}

impl Lox {
    pub fn new() -> Self {
        Lox {
            interpreter: Interpreter::new(),
        }
    }

    pub fn run_file(&mut self, path: &str) -> Result<(), Error> {
        let contents = fs::read_to_string(path)?;
        self.run(&contents)
    }

    pub fn run_prompt(&mut self) -> Result<(), Error> {
        let stdin = io::stdin();
        print!("> ");
        io::stdout().flush()?;

        for line in stdin.lock().lines() {
            let line = line?;
            // A runtime error in a REPL line shouldn't kill the session;
            // only propagate I/O errors reading the next line.
            if let Err(err) = self.run(&line) {
                if let Error::Io(_) = err {
                    return Err(err);
                }
            }
            print!("> ");
            io::stdout().flush()?;
        }

        Ok(())
    }

    pub fn run(&mut self, source: &str) -> Result<(), Error> {
        error::HAD_ERROR.store(false, Ordering::Relaxed);

        let tokens = Scanner::new(source.to_string()).scan_tokens().clone();

        let statements = Parser::new(&tokens).parse()?;

        // No point resolving or interpreting code that failed to parse.
        let mut resolver = Resolver::new(&mut self.interpreter);
        resolver.resolve_stmts(&statements);

        if error::HAD_ERROR.load(Ordering::Relaxed) {
            return Err(Error::Parse);
        }

        self.interpreter.interpret(&statements)
    }
}

impl Default for Lox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_accepts_a_clean_program() {
        let mut lox = Lox::new();
        assert!(lox.run("print 1 + 1;").is_ok());
    }

    #[test]
    fn run_reports_parse_error_without_interpreting() {
        let mut lox = Lox::new();
        assert!(matches!(lox.run("1 +;"), Err(Error::Parse)));
    }

    #[test]
    fn repl_session_shares_state_across_calls() {
        let mut lox = Lox::new();
        assert!(lox.run("var x = 1;").is_ok());
        assert!(lox.run("x = x + 1;").is_ok());
        assert!(lox.run("print x;").is_ok());
    }
}
