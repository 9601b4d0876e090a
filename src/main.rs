use std::io::{BufReader, IsTerminal};

use anyhow::{Context, Result};
use binutils::{clap, verbose};
use bitlane::{circuits, load_circuit, repl::Repl, Dut};
use clap::Parser;

// Interactive testbench for bit-packed gate-level circuits
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = None,
    styles = binutils::get_styles(),
    arg_required_else_help = true,
)]
struct Args {
    /// Built-in circuit name (e.g. adder4, register16) or path to a wiring
    /// file (.wir, or .json with the serde feature)
    #[arg(required_unless_present = "list")]
    circuit: Option<String>,

    /// Read commands from a file instead of stdin
    #[arg(short, long)]
    script: Option<String>,

    /// List the built-in circuits and exit
    #[arg(long)]
    list: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    #[command(flatten)]
    verbose: verbose::Verbosity,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose.log_level() {
        Some(verbose::Level::Error) => &tracing::Level::WARN,
        Some(verbose::Level::Warn) => &tracing::Level::INFO,
        Some(verbose::Level::Info) => &tracing::Level::DEBUG,
        Some(verbose::Level::Debug) => &tracing::Level::TRACE,
        Some(verbose::Level::Trace) => &tracing::Level::TRACE,
        None => &tracing::Level::ERROR,
    };
    binutils::logging_setup(log_level, None::<&std::fs::File>);

    if args.list {
        for name in circuits::circuit_names() {
            println!("{name}");
        }
        return Ok(());
    }

    let name = args.circuit.context("no circuit given")?;
    let circuit = load_circuit(&name)?;
    tracing::info!(
        circuit = %circuit.name(),
        families = circuit.families().len(),
        "loaded"
    );
    let mut dut = Dut::new(circuit);

    let stdout = std::io::stdout();
    let color = !args.no_color && stdout.is_terminal();
    let mut repl = Repl::new(stdout.lock(), color);

    match args.script {
        Some(path) => {
            let file = std::fs::File::open(&path)
                .with_context(|| format!("could not read file `{path}`"))?;
            repl.run(&mut dut, BufReader::new(file), false)
        }
        None => {
            let stdin = std::io::stdin();
            let prompt = stdin.is_terminal();
            repl.run(&mut dut, stdin.lock(), prompt)
        }
    }
}
