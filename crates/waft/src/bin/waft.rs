use std::io::Read;

use clap::{Parser, Subcommand};
use waft::{Engine, Module};

#[derive(Parser)]
#[command(name = "waft", about = "Register-based WebAssembly translator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Translate a module and print each function's instruction listing.
    Inspect {
        /// Path to a .wat or .wasm file. Reads from stdin if omitted.
        file: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Inspect { file } => inspect(file),
    }
}

fn inspect(file: Option<String>) -> anyhow::Result<()> {
    let input = read_input(file)?;
    let engine = Engine::default();
    let module = if input.starts_with(b"\0asm") {
        Module::from_bytes(&engine, &input)?
    } else {
        Module::new(&engine, std::str::from_utf8(&input)?)?
    };
    for index in 0..module.num_functions() {
        print!("{}", module.dump_func(index)?);
    }
    Ok(())
}

fn read_input(file: Option<String>) -> anyhow::Result<Vec<u8>> {
    match file {
        Some(path) => Ok(std::fs::read(&path)?),
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            Ok(buf)
        }
    }
}
