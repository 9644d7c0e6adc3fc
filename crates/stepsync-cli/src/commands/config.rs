use std::path::Path;

use clap::Subcommand;
use stepsync_core::Config;

use super::{config_path, load_config, CommandResult};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the config file location
    Path,
    /// Write a starter config with one placeholder account
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Show the effective config (passwords hidden)
    Show,
}

pub fn run(action: ConfigAction, explicit: Option<&Path>) -> CommandResult {
    match action {
        ConfigAction::Path => {
            println!("{}", config_path(explicit)?.display());
        }
        ConfigAction::Init { force } => {
            let path = config_path(explicit)?;
            if path.exists() && !force {
                return Err(format!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                )
                .into());
            }
            Config::template().save_to(&path)?;
            println!("wrote {}", path.display());
        }
        ConfigAction::Show => {
            let config = load_config(explicit)?;
            print!("{}", toml::to_string_pretty(&config.redacted())?);
        }
    }
    Ok(())
}
