//! `tomlc` CLI: check, format and convert TOML configuration files.
//!
//! ## Usage
//!
//! ```sh
//! # Validate a file, printing the failing line on error
//! tomlc check -i config.toml
//!
//! # Rewrite a file in canonical layout
//! tomlc fmt -i config.toml -o config.toml
//!
//! # Fail if a file is not already canonical
//! tomlc fmt --check -i config.toml
//!
//! # Convert TOML to pretty-printed JSON (stdin → stdout)
//! cat config.toml | tomlc decode
//!
//! # Convert JSON to TOML
//! tomlc encode -i config.json -o config.toml
//! ```
//!
//! Set `RUST_LOG=debug` to see what the codec is doing.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::io::{self, Read};
use std::process;
use toml_codec::{StringifyOptions, Table};

#[derive(Parser)]
#[command(name = "tomlc", version, about = "TOML configuration codec CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct IoArgs {
    /// Input file (reads from stdin if omitted)
    #[arg(short, long)]
    input: Option<String>,
    /// Output file (writes to stdout if omitted)
    #[arg(short, long)]
    output: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a TOML document and report the first error
    Check {
        /// Input file (reads from stdin if omitted)
        #[arg(short, long)]
        input: Option<String>,
    },
    /// Rewrite a TOML document in canonical layout
    Fmt {
        #[command(flatten)]
        io: IoArgs,
        /// Exit non-zero instead of writing when the input is not canonical
        #[arg(long)]
        check: bool,
        /// Wrap inline arrays longer than this many characters
        #[arg(long, default_value_t = StringifyOptions::default().array_wrap_width)]
        wrap_width: usize,
    },
    /// Convert TOML to pretty-printed JSON
    Decode {
        #[command(flatten)]
        io: IoArgs,
    },
    /// Convert a JSON object to TOML
    Encode {
        #[command(flatten)]
        io: IoArgs,
        /// Wrap inline arrays longer than this many characters
        #[arg(long, default_value_t = StringifyOptions::default().array_wrap_width)]
        wrap_width: usize,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { input } => {
            let text = read_input(input.as_deref())?;
            let doc = parse_or_exit(&text, input.as_deref());
            log::info!("[tomlc] {} top-level entries", doc.len());
            println!("ok");
        }
        Commands::Fmt {
            io,
            check,
            wrap_width,
        } => {
            let text = read_input(io.input.as_deref())?;
            let doc = parse_or_exit(&text, io.input.as_deref());
            let options = StringifyOptions {
                array_wrap_width: wrap_width,
            };
            let formatted =
                toml_codec::stringify_with(&doc, &options).context("Failed to format TOML")?;
            if check {
                if formatted != text {
                    eprintln!("{}: not in canonical format", display_name(io.input.as_deref()));
                    process::exit(1);
                }
                return Ok(());
            }
            write_output(io.output.as_deref(), &formatted)?;
        }
        Commands::Decode { io } => {
            let text = read_input(io.input.as_deref())?;
            let doc = parse_or_exit(&text, io.input.as_deref());
            let mut json =
                serde_json::to_string_pretty(&doc).context("Failed to convert TOML to JSON")?;
            json.push('\n');
            write_output(io.output.as_deref(), &json)?;
        }
        Commands::Encode { io, wrap_width } => {
            let text = read_input(io.input.as_deref())?;
            let json: serde_json::Value =
                serde_json::from_str(&text).context("Failed to parse JSON input")?;
            let doc = Table::try_from(json).context("Failed to convert JSON to TOML")?;
            let options = StringifyOptions {
                array_wrap_width: wrap_width,
            };
            let toml =
                toml_codec::stringify_with(&doc, &options).context("Failed to encode TOML")?;
            write_output(io.output.as_deref(), &toml)?;
        }
    }

    Ok(())
}

/// Parse `text`, or print the error with its source excerpt and exit with
/// status 1.
fn parse_or_exit(text: &str, path: Option<&str>) -> Table {
    match toml_codec::parse(text) {
        Ok(doc) => doc,
        Err(err) => {
            log::debug!("[tomlc] {} failed with a {} error", display_name(path), err.kind());
            eprintln!("{}: {}", display_name(path), err.pretty());
            process::exit(1);
        }
    }
}

fn display_name(path: Option<&str>) -> &str {
    path.unwrap_or("<stdin>")
}

fn read_input(path: Option<&str>) -> Result<String> {
    match path {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {}", path))
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            Ok(buf)
        }
    }
}

fn write_output(path: Option<&str>, content: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write file: {}", path))?;
        }
        None => {
            print!("{}", content);
        }
    }
    Ok(())
}
