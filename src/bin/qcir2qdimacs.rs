use clap::Parser;
use miette::Result;
use prenexium::{
    cli,
    nnf::to_nnf,
    prenex::{to_pnf, Strategy},
    qcir::{ExtendedParseError, QcirParser},
    qdimacs,
};
use std::{io::Cursor, path::PathBuf};

/// Convert a QCIR circuit into prenex-CNF QDIMACS.
#[derive(Debug, Parser)]
#[command(name = "qcir2qdimacs")]
struct Args {
    /// QCIR input file, stdin if omitted.
    input: Option<PathBuf>,

    /// QDIMACS output file, stdout if omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Prenexing strategy.
    #[arg(short, long, value_enum, default_value = "for-all-up-exists-up")]
    strategy: Strategy,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let contents = cli::read_input(args.input.as_deref())?;
    let reader = Cursor::new(&contents);

    let circuit = match QcirParser::new(reader).parse() {
        Ok(f) => f,
        Err(err) => Err(ExtendedParseError {
            source_code: String::from_utf8_lossy(&contents).into_owned(),
            related: vec![err],
        })?,
    };

    tracing::info!(strategy = ?args.strategy, "prenexing");
    let pnf = to_pnf(&to_nnf(&circuit), args.strategy);

    let qdimacs = qdimacs::to_string(&pnf)?;
    cli::write_output(args.output.as_deref(), qdimacs.as_bytes())?;
    Ok(())
}
