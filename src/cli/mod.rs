//! CLI commands for Parley using clap.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::{
    get_settings_path, load_settings_from, load_settings_or_default, save_settings, Settings,
};
use crate::demo;

/// Parley - FIPA request conversations between agents on a single-threaded dispatch loop.
#[derive(Parser)]
#[command(name = "parley")]
#[command(version)]
#[command(about = "Parley - FIPA request protocol runtime", long_about = None)]
pub struct Commands {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the demo society: a sender, its recipients and a calculator
    Demo {
        /// Settings file (defaults to ~/.parley/settings.json)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Seconds before the sender starts asking
        #[arg(long)]
        delay: Option<u64>,

        /// Milliseconds of simulated blocking work per step
        #[arg(long = "work-ms")]
        work_ms: Option<u64>,

        /// Session timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Print the effective settings
    Settings {
        /// Settings file (defaults to ~/.parley/settings.json)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Write a default settings file
    Init {
        /// Overwrite an existing settings file
        #[arg(long)]
        force: bool,
    },
}

impl Commands {
    /// Run the command.
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Command::Demo {
                config,
                delay,
                work_ms,
                timeout,
            } => cmd_demo(config.as_deref(), *delay, *work_ms, *timeout).await,
            Command::Settings { config } => cmd_settings(config.as_deref()),
            Command::Init { force } => cmd_init(*force),
        }
    }
}

fn resolve_settings(config: Option<&Path>) -> Result<Settings> {
    match config {
        Some(path) => load_settings_from(path)
            .with_context(|| format!("loading settings from {}", path.display())),
        None => Ok(load_settings_or_default()),
    }
}

async fn cmd_demo(
    config: Option<&Path>,
    delay: Option<u64>,
    work_ms: Option<u64>,
    timeout: Option<u64>,
) -> Result<()> {
    let mut settings = resolve_settings(config)?;

    if let Some(delay) = delay {
        settings.demo.start_delay_secs = delay;
    }
    if let Some(work_ms) = work_ms {
        settings.demo.work_millis = work_ms;
    }
    if let Some(timeout) = timeout {
        anyhow::ensure!(timeout > 0, "--timeout must be greater than zero");
        settings.protocol.session_timeout_secs = timeout;
    }

    println!(
        "Starting demo: {} asks {} recipient(s), calculator at {}",
        settings.demo.sender,
        settings.demo.recipients.len(),
        settings.demo.calculator
    );

    let report = demo::run(&settings).await?;

    println!("\nOutcomes:");
    let mut outcomes = report.outcomes;
    outcomes.sort_by(|a, b| a.0.cmp(&b.0));
    for (recipient, outcome) in outcomes {
        println!("  {} | {}", recipient, outcome);
    }
    Ok(())
}

fn cmd_settings(config: Option<&Path>) -> Result<()> {
    let settings = resolve_settings(config)?;
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

fn cmd_init(force: bool) -> Result<()> {
    let path = get_settings_path()?;

    if path.exists() && !force {
        anyhow::bail!(
            "Settings already exist at {}. Use --force to overwrite.",
            path.display()
        );
    }

    save_settings(&Settings::default(), &path)?;
    println!("Wrote default settings to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_demo_flags() {
        let args = Commands::parse_from([
            "parley", "demo", "--delay", "0", "--work-ms", "10", "--timeout", "30",
        ]);
        match args.command {
            Command::Demo {
                config,
                delay,
                work_ms,
                timeout,
            } => {
                assert!(config.is_none());
                assert_eq!(delay, Some(0));
                assert_eq!(work_ms, Some(10));
                assert_eq!(timeout, Some(30));
            }
            _ => panic!("expected demo command"),
        }
    }

    #[test]
    fn test_parse_init() {
        let args = Commands::parse_from(["parley", "init", "--force"]);
        assert!(matches!(args.command, Command::Init { force: true }));
    }

    #[test]
    fn test_resolve_explicit_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "workers": { "max_concurrent": 2 } }"#).unwrap();

        let settings = resolve_settings(Some(&path)).unwrap();
        assert_eq!(settings.workers.max_concurrent, 2);

        assert!(resolve_settings(Some(&dir.path().join("missing.json"))).is_err());
    }

    #[tokio::test]
    async fn test_demo_command_runs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{}").unwrap();

        cmd_demo(Some(&path), Some(0), Some(1), None).await.unwrap();
    }
}
