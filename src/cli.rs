use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Install a bundled game from the archives next to this binary
#[derive(Parser, Debug)]
#[command(name = "installer")]
#[command(about = "Extracts a packaged game and registers it with the desktop")]
#[command(version)]
pub struct InstallerCli {
    /// Installation config (relative paths resolve against the installer directory)
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// Install into `<DIR>/<game name>` instead of the configured install path
    #[arg(short, long, value_name = "DIR")]
    pub target_dir: Option<PathBuf>,

    /// Skip menu and desktop shortcuts
    #[arg(long)]
    pub no_shortcut: bool,

    /// Debug logging (RUST_LOG still takes precedence)
    #[arg(short, long)]
    pub verbose: bool,
}

impl InstallerCli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}

/// Remove games installed by the companion installer
#[derive(Parser, Debug)]
#[command(name = "uninstaller")]
#[command(about = "Lists and removes installed games")]
#[command(version)]
pub struct UninstallerCli {
    /// Directory holding install records (default: `logs` next to this binary)
    #[arg(long, global = true, value_name = "DIR")]
    pub logs_dir: Option<PathBuf>,

    /// Debug logging (RUST_LOG still takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<UninstallCommand>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum UninstallCommand {
    /// List installed games (default)
    List,
    /// Remove one installed game
    Remove {
        /// Game name or its slug (e.g. "my-game")
        name: String,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

impl UninstallerCli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}
