mod class;
mod environment;
mod error;
mod function;
mod interpreter;
mod object;
mod parser;
mod resolver;
mod scanner;
mod syntax;
mod token;

use std::env;
use std::fs;
use std::io::{self, Write};
use std::process::exit;

use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use error::Error;
use interpreter::Interpreter;
use parser::Parser;
use resolver::Resolver;
use scanner::Scanner;

struct Lox {
    interpreter: Interpreter,
}

impl Lox {
    fn new() -> Self {
        Lox {
            interpreter: Interpreter::new(),
        }
    }

    fn run_file(&mut self, file_path: &str) -> Result<(), Error> {
        let contents = fs::read_to_string(file_path)?;
        info!(file = file_path, bytes = contents.len(), "running script");
        self.run(contents)
    }

    fn run_prompt(&mut self) -> Result<(), Error> {
        let stdin = io::stdin();
        let mut line = String::new();

        loop {
            print!("lox> ");
            io::stdout().flush()?;

            line.clear();
            if stdin.read_line(&mut line)? == 0 {
                println!();
                return Ok(());
            }

            // A per-line error is reported to stderr but never ends the
            // session - the persistent Interpreter instance keeps its
            // globals across lines.
            if let Err(err) = self.run(line.clone()) {
                if let Error::Runtime { .. } = &err {
                    error::runtime_error(&err);
                }
            }
        }
    }

    fn run(&mut self, source: String) -> Result<(), Error> {
        let mut scanner = Scanner::new(source);
        let tokens = scanner.scan_tokens().clone();

        let mut parser = Parser::new(&tokens);
        let statements = parser.parse()?;

        if parser.had_error() {
            return Err(Error::Parse);
        }

        // We don't resolve code that failed to parse - it's never going to
        // run, so there's no value in walking it for variable distances.
        // The resolver holds a reference to the interpreter and pokes
        // distance data directly into it as it walks variable uses; by the
        // time the interpreter runs, it already has everything it needs.
        let mut resolver = Resolver::new(&mut self.interpreter);
        resolver.resolve_stmts(&statements);

        if resolver.had_error {
            return Err(Error::Parse);
        }

        debug!(statements = statements.len(), "interpreting");
        self.interpreter.interpret(&statements)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error + 'static>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let mut lox = Lox::new();
    match &args[..] {
        [_, file_path] => match lox.run_file(file_path) {
            Ok(_) => (),
            Err(err @ Error::Runtime { .. }) => {
                error::runtime_error(&err);
                exit(70)
            }
            Err(Error::Return { .. }) => unreachable!("return never escapes a call frame"),
            Err(Error::Parse) => exit(65),
            Err(Error::Io(err)) => {
                eprintln!("{err}");
                exit(74)
            }
        },
        [_] => lox.run_prompt()?,
        _ => {
            eprintln!("Usage: lox-rs [script]");
            exit(64)
        }
    }
    Ok(())
}
