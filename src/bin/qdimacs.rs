use clap::Parser;
use miette::Result;
use prenexium::{
    cli,
    qdimacs::{self, ExtendedParseError, QdimacsParser},
};
use std::{io::Cursor, path::PathBuf};

/// Parse a QDIMACS file and print it back with a recomputed problem line.
#[derive(Debug, Parser)]
#[command(name = "qdimacs")]
struct Args {
    /// QDIMACS input file, stdin if omitted.
    input: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let contents = cli::read_input(args.input.as_deref())?;
    let reader = Cursor::new(&contents);

    let formula = match QdimacsParser::new(reader).parse() {
        Ok(f) => f,
        Err(err) => Err(ExtendedParseError {
            source_code: String::from_utf8_lossy(&contents).into_owned(),
            related: vec![err],
        })?,
    };

    print!("{}", qdimacs::to_string(&formula)?);
    Ok(())
}
