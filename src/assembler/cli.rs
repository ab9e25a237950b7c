// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Command-line interface parsing and argument validation.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::core::error::AsmError;

pub const VERSION: &str = "1.0";

const LONG_ABOUT: &str = "MOS 6502 assembler producing a raw binary image.

The output file defaults to the source path with a .bin extension; the
listing file (for -l/-L) defaults to the source path with .lst. Errors are
reported as <filename>(<line>): <message> on stderr and exit nonzero.";

#[derive(Parser, Debug)]
#[command(
    name = "asm65",
    version = VERSION,
    about = "MOS 6502 assembler with macros, conditional assembly and listing output",
    long_about = LONG_ABOUT
)]
pub struct Cli {
    /// Source file to assemble.
    pub sourcefile: PathBuf,
    /// Output file. Defaults to the source path with a .bin extension.
    pub outputfile: Option<PathBuf>,
    /// Listing file. Supplying it enables the listing like -l does.
    pub listfile: Option<PathBuf>,
    #[arg(
        short = 'l',
        long = "list",
        action = ArgAction::SetTrue,
        help = "Create a listing file"
    )]
    pub listing: bool,
    #[arg(
        short = 'L',
        long = "list-verbose",
        action = ArgAction::SetTrue,
        help = "Create a verbose listing (expand REPT and MACRO bodies)"
    )]
    pub verbose_listing: bool,
    #[arg(
        short = 'd',
        long = "define",
        value_name = "NAME[=VAL]",
        action = ArgAction::Append,
        help = "Predefine a symbol (repeatable; value defaults to 1)"
    )]
    pub defines: Vec<String>,
    #[arg(
        short = 'q',
        long = "quiet",
        action = ArgAction::SetTrue,
        help = "Quiet mode (no per-pass progress output)"
    )]
    pub quiet: bool,
    #[arg(short = '?', action = ArgAction::Help, help = "Print help")]
    pub help_alias: Option<bool>,
}

/// Validated configuration for one run.
#[derive(Debug)]
pub struct CliConfig {
    pub source: PathBuf,
    pub output: PathBuf,
    pub list: Option<PathBuf>,
    pub defines: Vec<(String, i32)>,
}

pub fn validate_cli(cli: &Cli) -> Result<CliConfig, AsmError> {
    let source = cli.sourcefile.clone();
    let output = cli
        .outputfile
        .clone()
        .unwrap_or_else(|| source.with_extension("bin"));

    let list_requested = cli.listing || cli.verbose_listing || cli.listfile.is_some();
    let list = if list_requested {
        Some(
            cli.listfile
                .clone()
                .unwrap_or_else(|| source.with_extension("lst")),
        )
    } else {
        None
    };

    let mut defines = Vec::new();
    for def in &cli.defines {
        let (name, value) = match def.split_once('=') {
            Some((name, text)) => (name, parse_define_value(text)?),
            None => (def.as_str(), 1),
        };
        if name.is_empty() {
            return Err(AsmError::Custom(
                "Empty symbol name in -d/--define".to_string(),
            ));
        }
        defines.push((name.to_string(), value));
    }

    Ok(CliConfig {
        source,
        output,
        list,
        defines,
    })
}

fn parse_define_value(text: &str) -> Result<i32, AsmError> {
    let parsed = if let Some(hex) = text.strip_prefix('$') {
        i64::from_str_radix(hex, 16).ok()
    } else {
        text.parse::<i64>().ok()
    };
    parsed
        .map(|value| value as i32)
        .ok_or_else(|| AsmError::Custom(format!("Invalid -d/--define value: {text}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_positionals_and_flags() {
        let cli = Cli::parse_from(["asm65", "-l", "-q", "prog.asm", "prog.nes"]);
        assert_eq!(cli.sourcefile, PathBuf::from("prog.asm"));
        assert_eq!(cli.outputfile, Some(PathBuf::from("prog.nes")));
        assert!(cli.listing);
        assert!(cli.quiet);
        assert!(!cli.verbose_listing);
    }

    #[test]
    fn output_defaults_to_bin_extension() {
        let cli = Cli::parse_from(["asm65", "game.asm"]);
        let config = validate_cli(&cli).unwrap();
        assert_eq!(config.output, PathBuf::from("game.bin"));
        assert!(config.list.is_none());
    }

    #[test]
    fn listing_defaults_to_lst_extension() {
        let cli = Cli::parse_from(["asm65", "-L", "game.asm"]);
        let config = validate_cli(&cli).unwrap();
        assert_eq!(config.list, Some(PathBuf::from("game.lst")));
    }

    #[test]
    fn explicit_listfile_enables_listing() {
        let cli = Cli::parse_from(["asm65", "game.asm", "game.bin", "out.lst"]);
        let config = validate_cli(&cli).unwrap();
        assert_eq!(config.list, Some(PathBuf::from("out.lst")));
    }

    #[test]
    fn defines_parse_names_and_values() {
        let cli = Cli::parse_from(["asm65", "-d", "NTSC", "-d", "LEVEL=$10", "game.asm"]);
        let config = validate_cli(&cli).unwrap();
        assert_eq!(
            config.defines,
            vec![("NTSC".to_string(), 1), ("LEVEL".to_string(), 0x10)]
        );
    }

    #[test]
    fn bad_define_value_is_rejected() {
        let cli = Cli::parse_from(["asm65", "-d", "X=nope", "game.asm"]);
        assert!(validate_cli(&cli).is_err());
    }
}
