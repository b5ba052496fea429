//! Installer entry point
//!
//! Runs preflight on the main thread, then listens to the extraction worker
//! and prints its progress.

use anyhow::{Context, Result};
use gamepack::cli::InstallerCli;
use gamepack::logging;
use gamepack::{InstallContext, InstallEvent, InstallationConfig, Installer};
use std::path::Path;

fn main() {
    let cli = InstallerCli::parse_args();
    logging::init_tracing(cli.verbose);

    if let Err(e) = run(&cli) {
        tracing::error!("Installation failed: {:#}", e);
        eprintln!("✗ {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: &InstallerCli) -> Result<()> {
    let installer_path = std::env::current_exe().context("Cannot locate the installer binary")?;
    let installer_dir = installer_path.parent().unwrap_or(Path::new("."));
    let config_path = installer_dir.join(&cli.config);

    tracing::info!("Loading configuration from {}", config_path.display());
    let mut config = InstallationConfig::load_from_file(&config_path)?;
    if let Some(dir) = &cli.target_dir {
        config = config.with_target_dir(dir);
    }
    config.validate()?;
    // The record's install path is the uninstaller's only deletion key
    config.install_path = std::path::absolute(&config.install_path)
        .with_context(|| format!("Cannot resolve {}", config.install_path.display()))?;

    let name = config.desktop_entry.name.clone();
    let ctx = InstallContext::new(config, &installer_path).with_shortcuts(!cli.no_shortcut);

    let handle = Installer::new(ctx).preflight()?.spawn()?;
    let total = handle.total_entries();
    println!("Installing {} ({} entries)", name, total);

    for event in handle.events() {
        match event {
            InstallEvent::Progress(done) => {
                println!("{:3}% ({}/{})", done * 100 / total.max(1), done, total);
            }
            InstallEvent::Warning(message) => eprintln!("warning: {}", message),
            InstallEvent::Completed => println!("Installation complete"),
        }
    }

    let summary = handle.join()?;
    println!("✓ {} installed to {}", name, summary.install_root.display());
    if let Some(path) = &summary.manifest_path {
        println!("  install record: {}", path.display());
    }
    if !summary.warnings.is_empty() {
        println!("  {} warning(s), see log for details", summary.warnings.len());
    }
    Ok(())
}
