//! Uninstaller entry point

use anyhow::{Context, Result};
use gamepack::cli::{UninstallCommand, UninstallerCli};
use gamepack::logging;
use gamepack::{InstallRecord, ManifestStore, UninstallStep, Uninstaller};
use std::io::{self, Write};
use strum::EnumCount;

fn main() {
    let cli = UninstallerCli::parse_args();
    logging::init_tracing(cli.verbose);

    if let Err(e) = run(&cli) {
        tracing::error!("Uninstall failed: {:#}", e);
        eprintln!("✗ {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: &UninstallerCli) -> Result<()> {
    let store = match &cli.logs_dir {
        Some(dir) => ManifestStore::new(dir),
        None => ManifestStore::beside_executable()?,
    };
    let uninstaller = Uninstaller::new(store);

    match &cli.command {
        None | Some(UninstallCommand::List) => list(&uninstaller),
        Some(UninstallCommand::Remove { name, yes }) => remove(&uninstaller, name, *yes),
    }
}

fn list(uninstaller: &Uninstaller) -> Result<()> {
    let records = uninstaller.discover()?;
    if records.is_empty() {
        println!(
            "No installed games found in {}",
            uninstaller.store().logs_dir().display()
        );
        return Ok(());
    }

    for (_, record) in records {
        println!(
            "{} (installed: {})",
            record.app_name,
            record.install_date.format("%d.%m.%Y %H:%M:%S")
        );
    }
    Ok(())
}

fn remove(uninstaller: &Uninstaller, name: &str, yes: bool) -> Result<()> {
    let record = uninstaller
        .find(name)?
        .with_context(|| format!("No installed game named {:?}", name))?;

    if !yes && !confirm(&record)? {
        println!("Cancelled");
        return Ok(());
    }

    let report = uninstaller.uninstall(&record, |step| {
        println!("step {}/{}: {}", step.number(), UninstallStep::COUNT, step);
    })?;
    for warning in &report.warnings {
        eprintln!("warning: {}", warning);
    }
    println!("✓ {} removed", record.app_name);

    list(uninstaller)
}

fn confirm(record: &InstallRecord) -> Result<bool> {
    print!(
        "Remove {} from {}? [y/N] ",
        record.app_name,
        record.install_path.display()
    );
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
