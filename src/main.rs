// Copyright (c) 2026 ctfconv Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{ArgAction, CommandFactory, Parser};

use ctfconv::{logging, Conversion};

/// Convert DWARF debugging information into CTF.
#[derive(Parser, Debug)]
#[command(name = "ctfconv")]
#[command(version)]
#[command(about = "Convert DWARF debugging information into CTF", long_about = None)]
struct Cli {
    /// Dump the converted types, like ctfdump(1)
    #[arg(short = 'd', long = "dump", default_value_t = false)]
    dump: bool,

    /// Label stored in the CTF label section
    #[arg(short = 'l', long = "label")]
    label: Option<String>,

    /// Where to write the CTF data
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// More logging; repeat for more
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// ELF file with DWARF debugging information
    file: PathBuf,
}

fn run(cli: &Cli) -> Result<()> {
    let conv = Conversion::from_path(&cli.file).with_context(|| format!("{}", cli.file.display()))?;

    if cli.dump {
        let stdout = io::stdout();
        let mut out = BufWriter::new(stdout.lock());
        conv.dump(&mut out).context("dump failed")?;
        out.flush()?;
    }

    if let Some(output) = &cli.output {
        let label = cli.label.as_deref().unwrap_or_default();
        conv.write_ctf(label, output)
            .with_context(|| format!("{}", output.display()))?;
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    if !cli.dump && (cli.label.is_none() || cli.output.is_none()) {
        Cli::command()
            .error(ErrorKind::MissingRequiredArgument, "-l and -o are required unless -d is given")
            .exit();
    }

    let _logger = match logging::init(cli.verbose) {
        Ok(handle) => Some(handle),
        Err(err) => {
            eprintln!("ctfconv: cannot start logging: {}", err);
            None
        }
    };

    if let Err(err) = run(&cli) {
        eprintln!("ctfconv: {:#}", err);
        process::exit(1);
    }
}
