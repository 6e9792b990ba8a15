//! Command-line front end: tokenize a source file, or inspect a saved
//! module binary.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use anf::arena::Arena;
use anf::diagnostics::Diagnostics;
use anf::lexer::{Lexer, TokKind};
use anf::serialize;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "anfc", about = "Hash-consed CPS IR tools")]
struct Cli {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Tokenize a source file and print the token stream.
  Lex { path: PathBuf },
  /// Load a saved module and print a summary of its contents.
  Inspect { path: PathBuf },
}

fn main() -> ExitCode {
  env_logger::init();
  let cli = Cli::parse();
  let mut diags = Diagnostics::new();

  let result = match cli.command {
    Command::Lex { path } => run_lex(&path, &mut diags),
    Command::Inspect { path } => run_inspect(&path, &mut diags),
  };

  for d in diags.iter() { eprintln!("{d}"); }

  match result {
    Ok(()) if !diags.has_errors() => ExitCode::SUCCESS,
    _ => ExitCode::FAILURE,
  }
}

fn run_lex(path: &PathBuf, diags: &mut Diagnostics) -> Result<(), ()> {
  let src = match std::fs::read_to_string(path) {
    Ok(s) => s,
    Err(e) => { diags.error(format!("{}: {e}", path.display()), None); return Err(()); }
  };
  for tok in Lexer::new(&src).tokenize() {
    if tok.kind == TokKind::Err { diags.error(format!("unrecognized token {:?}", tok.text), None); continue; }
    println!("{:>4}:{:<4} {:?} {:?}", tok.loc.row, tok.loc.col, tok.kind, tok.text);
  }
  Ok(())
}

fn run_inspect(path: &PathBuf, diags: &mut Diagnostics) -> Result<(), ()> {
  let file = match File::open(path) {
    Ok(f) => f,
    Err(e) => { diags.error(format!("{}: {e}", path.display()), None); return Err(()); }
  };
  let mut r = BufReader::new(file);
  let mut buf = Vec::new();
  if let Err(e) = r.read_to_end(&mut buf) { diags.error(format!("{}: {e}", path.display()), None); return Err(()); }

  let arena = Arena::new();
  match serialize::load(&arena, &mut &buf[..]) {
    Ok(m) => {
      println!("types: {}", m.types().len());
      println!("nodes: {}", m.nodes().len());
      println!("fns:   {}", m.fns().len());
      println!("arena: {} bytes", arena.allocated_bytes());
      Ok(())
    }
    Err(e) => { diags.error(format!("{}: {e}", path.display()), None); Err(()) }
  }
}
