use std::{
    env,
    error::Error,
    fs,
    io::{self, Write},
};

use tarn::{
    analyzer,
    environment::{self, Output},
    evaluator, generator, lexer, parser,
};

fn main() {
    if let Err(error) = run() {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let mut args = env::args().skip(1);

    // File mode
    if let Some(prog_path) = args.next() {
        let input = fs::read_to_string(prog_path)?;
        pipeline(&input);
        return Ok(());
    }

    // Interactive REPL mode
    println!("Welcome to interactive tarn.");
    println!("Enter code, finish with an empty line, or send Ctrl+D to exit.");

    let mut accumulated_input = String::new();

    loop {
        if accumulated_input.is_empty() {
            print!("> ");
        } else {
            print!("| ");
        }
        io::stdout().flush()?;

        let mut current_line = String::new();
        let n = io::stdin().read_line(&mut current_line)?;

        if n == 0 {
            println!();
            if !accumulated_input.trim().is_empty() {
                pipeline(&accumulated_input);
            }
            return Ok(());
        }

        // An empty line is the evaluation signal.
        if current_line.trim().is_empty() {
            if !accumulated_input.trim().is_empty() {
                pipeline(&accumulated_input);
                accumulated_input.clear();
            }
        } else {
            accumulated_input.push_str(&current_line);
        }
    }
}

fn pipeline(src: &str) {
    let tokens = match lexer::lex(src) {
        Ok(tokens) => tokens,
        Err(error) => {
            eprintln!("lex error: {error}");
            return;
        }
    };
    let source = match parser::parse(tokens) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("parse error: {error}");
            return;
        }
    };

    println!("=== Evaluation ===");
    match evaluator::evaluate(&source, environment::scope(&Output::stdout())) {
        Ok(value) => println!("=> {}", value.print()),
        Err(error) => eprintln!("evaluate error: {error}"),
    }

    match analyzer::analyze(&source, analyzer::environment()) {
        Ok(ir) => {
            println!();
            println!("=== Generated Java ===");
            println!("{}", generator::generate(&ir));
        }
        Err(error) => eprintln!("analyze error: {error}"),
    }
}
