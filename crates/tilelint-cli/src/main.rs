// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tilelint_config::Config;
use tilelint_core::{init_tracing, MessageCode};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Inspect and author tilelint configuration files",
    long_about = None
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the default configuration with every option documented.
    DumpConfig {
        /// Emit TOML instead of the line format.
        #[arg(long)]
        toml: bool,
        /// Write to a file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Load a configuration file and print the effective settings.
    CheckConfig {
        path: PathBuf,
        /// Parse the file as TOML.
        #[arg(long)]
        toml: bool,
    },
    /// List every message code.
    Codes,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    match args.command {
        Command::DumpConfig { toml, output } => dump_config(toml, output.as_deref()),
        Command::CheckConfig { path, toml } => check_config(&path, toml),
        Command::Codes => {
            print!("{}", code_table());
            Ok(())
        }
    }
}

fn render(cfg: &Config, toml: bool) -> Result<String> {
    if toml {
        cfg.to_toml_string().context("serialize config as TOML")
    } else {
        Ok(cfg.dump())
    }
}

fn dump_config(toml: bool, output: Option<&Path>) -> Result<()> {
    let text = render(&Config::default(), toml)?;
    match output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("write {}", path.display()))?;
            info!("default config written to {}", path.display());
        }
        None => print!("{text}"),
    }
    Ok(())
}

fn check_config(path: &Path, toml: bool) -> Result<()> {
    let cfg = if toml {
        Config::load_toml(path).with_context(|| format!("load {}", path.display()))?
    } else {
        let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let (cfg, issues) = Config::parse_with_report(&text);
        for issue in &issues {
            warn!("{}:{}: `{}`: {}", path.display(), issue.line, issue.text.trim(), issue.error);
        }
        let option_lines = text.lines().filter(|l| is_option_line(l)).count();
        if !issues.is_empty() && issues.len() == option_lines {
            bail!("{}: no option line could be applied", path.display());
        }
        cfg
    };
    info!("loaded {}", path.display());
    print!("{}", render(&cfg, toml)?);
    Ok(())
}

fn is_option_line(line: &str) -> bool {
    let line = line.trim();
    !line.is_empty() && !line.starts_with('#')
}

fn code_table() -> String {
    let mut out = String::new();
    for code in MessageCode::ALL {
        out.push_str(&format!(
            "{:>3}  {:<46} {:<48} {}\n",
            code.as_raw(),
            code.name(),
            code.toggle_name(),
            if code.enabled_by_default() { "on" } else { "off" }
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_subcommands() {
        let args =
            Args::try_parse_from(["tilelint", "dump-config", "--toml", "-o", "out.toml"]).unwrap();
        match args.command {
            Command::DumpConfig { toml, output } => {
                assert!(toml);
                assert_eq!(output.as_deref(), Some(Path::new("out.toml")));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(Args::try_parse_from(["tilelint", "check-config"]).is_err());
    }

    #[test]
    fn code_table_lists_every_code() {
        let table = code_table();
        assert_eq!(table.lines().count(), MessageCode::COUNT);
        assert!(table.contains("msgSamplerLodBias"));
        assert!(table.lines().any(|l| l.contains("PARTIAL_CLEAR") && l.trim_end().ends_with("on")));
    }

    #[test]
    fn option_lines_skip_comments() {
        assert!(is_option_line("minQueryCount 4"));
        assert!(!is_option_line("  # comment"));
        assert!(!is_option_line(""));
    }
}
