mod commands;
mod convert;
mod elf;
mod error;
mod macho;
mod utils;
use clap::Parser;
use clap::error::ErrorKind;
use convert::Config;
use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use crate::utils::{note, uwriteln, warn};

/// Converts a Linux ELF core dump into a Mach-O core that macOS debuggers can load.
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// path to the ELF core file
    core: PathBuf,

    /// path to the Mach-O core to write [default: darlingcore-<core> next to the core]
    output: Option<PathBuf>,

    /// mapped files under this prefix may be found under the libexec root instead
    /// [default: ~/.darling]
    #[arg(long, env = "DPREFIX")]
    prefix: Option<String>,

    /// installation root used for files that can't be found under the prefix
    #[arg(
        long,
        env = "DARLING_LIBEXEC",
        default_value = "/usr/local/libexec/darling"
    )]
    libexec: PathBuf,

    /// architecture of the core
    #[arg(long, default_value = "x86_64")]
    arch: String,

    /// print the regions and threads that were written
    #[arg(long)]
    list: bool,

    /// with --list, explain what the columns mean
    #[arg(long)]
    explain: bool,
}

fn default_prefix() -> String {
    match dirs::home_dir() {
        Some(home) => home.join(".darling").to_string_lossy().into_owned(),
        None => {
            warn("couldn't find home directory: files will only be looked up by their recorded path");
            String::new()
        }
    }
}

fn parse_cli() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => process::exit(0),
                _ => process::exit(1),
            }
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = Config {
        prefix: cli.prefix.unwrap_or_else(default_prefix),
        alternate_root: cli.libexec,
        arch: macho::find_arch(&cli.arch)?,
    };
    let output = cli.output.unwrap_or_else(|| convert::default_output(&cli.core));

    let (conversion, summary) = convert::convert_file(cli.core, &output, &config)?;
    let mut mesg = format!(
        "Wrote {} segments and {} threads to {} ({} bytes)",
        summary.layout.segments.len(),
        summary.threads,
        output.display(),
        summary.layout.end_offset
    );
    if summary.contents.degraded > 0 {
        mesg.push_str(&format!(
            ", {} segments were zero filled",
            summary.contents.degraded
        ));
    }
    if summary.contents.devices > 0 {
        mesg.push_str(&format!(
            ", {} device mappings were skipped",
            summary.contents.devices
        ));
    }
    note(&mesg);

    if cli.list {
        let mut out = io::stdout().lock();
        uwriteln!(out);
        commands::list_header(&mut out, &conversion, &summary, cli.explain);
        uwriteln!(out);
        commands::list_vmas(&mut out, &conversion, &summary, cli.explain);
        uwriteln!(out);
        commands::list_threads(&mut out, &conversion, config.arch, cli.explain);
    }
    Ok(())
}

fn main() {
    utils::generate_style_file();

    let cli = parse_cli();
    if let Err(e) = run(cli) {
        warn(&format!("{e}"));
        process::exit(1);
    }
}
