//! Quad allocation inspector.
//!
//! Reads functions in the textual quad format and prints, per function, the
//! quad list with every variable replaced by the location the allocator chose.

use bumpalo::Bump;
use clap::Parser;
use log::info;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use quadc::{
    parse_module, print_allocation, print_function, Allocator, AllocatorConfig,
    CompilationSession, CompileError, FlowGraph, TargetPolicy, X64Policy,
};

#[derive(Parser)]
#[command(name = "quadc")]
#[command(about = "Allocate registers for quad IR functions on x86-64")]
struct Cli {
    /// Input file; standard input when omitted.
    file: Option<PathBuf>,

    /// Only allocate the named function.
    #[arg(short, long)]
    function: Option<String>,

    /// Print blocks and live sets before allocation.
    #[arg(long)]
    liveness: bool,

    /// Print the quads before allocation.
    #[arg(long)]
    quads: bool,

    /// Spill as soon as simplify gets stuck.
    #[arg(long)]
    no_optimistic: bool,

    /// Build/spill rounds per function before giving up.
    #[arg(long, default_value_t = 1000)]
    max_iterations: usize,

    /// Print session statistics at the end.
    #[arg(long)]
    stats: bool,
}

fn read_input(file: Option<&PathBuf>) -> io::Result<String> {
    match file {
        Some(path) => fs::read_to_string(path),
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let text = read_input(cli.file.as_ref())?;
    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let mut funcs = parse_module(&session, &text)?;

    if let Some(name) = &cli.function {
        funcs.retain(|f| f.name() == name.as_str());
        if funcs.is_empty() {
            return Err(CompileError::FunctionNotFound { name: name.clone() }.into());
        }
    }

    let policy = X64Policy::new();
    let config = AllocatorConfig {
        max_iterations: cli.max_iterations,
        optimistic: !cli.no_optimistic,
    };
    let allocator = Allocator::new(&policy, config);

    for func in funcs.iter_mut() {
        if cli.quads {
            print!("{}", print_function(func));
        }
        if cli.liveness {
            let flow = FlowGraph::build(func)?;
            println!("# {}", func.name());
            print!("{}", flow.describe(func));
        }

        let allocation = allocator.allocate(&session, func)?;
        info!("{} allocated in {} rounds", allocation.name, allocation.iterations);

        println!(
            "# {}: frame {} bytes, {} spilled, {} moves",
            allocation.name,
            allocation.frame_size,
            allocation.spilled.len(),
            allocation.moves_inserted
        );
        let saved: Vec<&str> = allocation
            .callee_saved
            .iter()
            .map(|r| policy.registers().name(r))
            .collect();
        if !saved.is_empty() {
            println!("# saves {}", saved.join(", "));
        }
        print!("{}", print_allocation(func, policy.registers()));
        println!();
    }

    if cli.stats {
        eprint!("{}", session.stats());
    }
    Ok(())
}
