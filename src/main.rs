use std::env;
use std::process::exit;

use glox::{Error, Lox};

fn main() {
    let args: Vec<String> = env::args().collect();
    let mut lox = Lox::new();

    match &args[..] {
        [_, path] => match lox.run_file(path) {
            Ok(()) => (),
            Err(Error::Runtime { .. }) => exit(70),
            Err(Error::Parse) => exit(65),
            Err(Error::Return { .. }) => unreachable!("return never escapes a function call"),
            Err(Error::Io(e)) => {
                eprintln!("{e}");
                exit(65);
            }
        },
        [_] => {
            if let Err(Error::Io(e)) = lox.run_prompt() {
                eprintln!("{e}");
                exit(74);
            }
        }
        _ => {
            println!("Usage: glox [script]");
            exit(64);
        }
    }
}
