//! ucl CLI: reads a document in one format, optionally validates it against a
//! JSON Schema, and re-emits it in another.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use ucl::{emit_full, from_json, parse, validate_schema, Format};

// sysexits(3)-style exit codes; this crate has no dependency on the `sysexits`
// crate (not used anywhere in the corpus), so the handful of codes we need are
// just named constants.
const EX_OK: u8 = 0;
const EX_DATAERR: u8 = 65;
const EX_NOINPUT: u8 = 66;
const EX_CANTCREAT: u8 = 73;
const EX_IOERR: u8 = 74;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Ucl,
    Json,
    #[value(name = "compact_json")]
    CompactJson,
    Yaml,
}

impl From<OutputFormat> for Format {
    fn from(f: OutputFormat) -> Format {
        match f {
            OutputFormat::Ucl => Format::Config,
            OutputFormat::Json => Format::Json,
            OutputFormat::CompactJson => Format::CompactJson,
            OutputFormat::Yaml => Format::Yaml,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Print a shell completion script to stdout
    Completions { shell: Shell },
}

#[derive(Parser)]
#[command(name = "ucl", about = "Parse, validate, and re-emit UCL/JSON documents", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Input file; reads stdin if omitted
    #[arg(long = "in")]
    input: Option<PathBuf>,

    /// Output file; writes stdout if omitted
    #[arg(long = "out")]
    output: Option<PathBuf>,

    /// JSON Schema (draft-v4) to validate the parsed document against
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    if let Some(Command::Completions { shell }) = cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        let name = cmd.get_name().to_string();
        clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
        return ExitCode::from(EX_OK);
    }

    match run(&cli) {
        Ok(()) => ExitCode::from(EX_OK),
        Err(code) => ExitCode::from(code),
    }
}

fn run(cli: &Cli) -> Result<(), u8> {
    let source = read_input(cli.input.as_deref())?;

    log::debug!("parsing {} bytes of input", source.len());
    let document = parse(&source).map_err(|e| {
        eprintln!("ucl: parse error: {e}");
        EX_DATAERR
    })?;

    if let Some(schema_path) = &cli.schema {
        let schema_source = std::fs::read_to_string(schema_path).map_err(|e| {
            eprintln!("ucl: cannot read schema {}: {e}", schema_path.display());
            EX_NOINPUT
        })?;
        let schema_json: serde_json::Value = serde_json::from_str(&schema_source).map_err(|e| {
            eprintln!("ucl: schema {} is not valid JSON: {e}", schema_path.display());
            EX_DATAERR
        })?;
        let schema_value = from_json(&schema_json);
        validate_schema(&schema_value, &document).map_err(|e| {
            eprintln!("ucl: schema validation failed: {e}");
            EX_DATAERR
        })?;
        log::info!("document validated against {}", schema_path.display());
    }

    write_output(&document, cli.format.into(), cli.output.as_deref())
}

fn read_input(path: Option<&std::path::Path>) -> Result<String, u8> {
    match path {
        Some(p) => std::fs::read_to_string(p).map_err(|e| {
            eprintln!("ucl: cannot read {}: {e}", p.display());
            EX_NOINPUT
        }),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).map_err(|e| {
                eprintln!("ucl: cannot read stdin: {e}");
                EX_IOERR
            })?;
            Ok(buf)
        }
    }
}

/// Streams the rendered document straight to its sink via [`emit_full`] — a
/// file when `--out` is given, stdout otherwise — instead of building the
/// whole rendered document in a `String` first.
fn write_output(document: &ucl::Value, format: Format, path: Option<&std::path::Path>) -> Result<(), u8> {
    match path {
        Some(p) => {
            let mut f = std::fs::File::create(p).map_err(|e| {
                eprintln!("ucl: cannot create {}: {e}", p.display());
                EX_CANTCREAT
            })?;
            emit_full(document, format, &mut f).map_err(|e| {
                eprintln!("ucl: cannot write {}: {e}", p.display());
                EX_IOERR
            })
        }
        None => emit_full(document, format, &mut std::io::stdout()).map_err(|e| {
            eprintln!("ucl: cannot write stdout: {e}");
            EX_IOERR
        }),
    }
}
