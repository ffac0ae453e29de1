//! Completion scripts for `bgd`.
//!
//! Scripts are rendered into memory first, so `--stdout`, `--dry-run` and
//! file output all share one generation path.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::{fs, io};

use anyhow::{Context, Result, anyhow};
use clap::CommandFactory;
use clap_complete::{Generator, Shell as CompletionShell, generate};

use crate::cli::{AppContext, Cli, CompletionsArgs, Shell};

/// Binary name the scripts complete for
const BIN_NAME: &str = "bgd";

impl From<Shell> for CompletionShell {
    fn from(shell: Shell) -> Self {
        match shell {
            Shell::Bash => CompletionShell::Bash,
            Shell::Zsh => CompletionShell::Zsh,
            Shell::Fish => CompletionShell::Fish,
            Shell::PowerShell => CompletionShell::PowerShell,
            Shell::Elvish => CompletionShell::Elvish,
        }
    }
}

/// Completion script for `shell`
pub fn render(shell: Shell) -> Vec<u8> {
    let mut cmd = Cli::command();
    let mut buf = Vec::new();
    generate(CompletionShell::from(shell), &mut cmd, BIN_NAME, &mut buf);
    buf
}

/// Where the script for `shell` lands inside `dir` (`bgd.bash`, `_bgd`, ...)
pub fn script_path(dir: &Path, shell: Shell) -> PathBuf {
    dir.join(CompletionShell::from(shell).file_name(BIN_NAME))
}

pub fn run(args: CompletionsArgs, ctx: &AppContext) -> Result<()> {
    let script = render(args.shell);

    if args.stdout {
        io::stdout()
            .write_all(&script)
            .context("Failed to write completion script")?;
        return Ok(());
    }

    let dir = args
        .out_dir
        .ok_or_else(|| anyhow!("--out-dir is required unless --stdout is set"))?;
    let dir = PathBuf::from(
        shellexpand::full(&dir.to_string_lossy())
            .with_context(|| format!("Failed to expand path {}", dir.display()))?
            .as_ref(),
    );
    let path = script_path(&dir, args.shell);

    if ctx.dry_run {
        println!("Would write {} bytes to {}", script.len(), path.display());
        return Ok(());
    }

    fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    fs::write(&path, &script).with_context(|| format!("Failed to write {}", path.display()))?;

    if !ctx.quiet {
        eprintln!("Wrote completion to {}", path.display());
    }
    Ok(())
}
