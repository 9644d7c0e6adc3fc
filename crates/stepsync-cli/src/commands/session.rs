use std::path::Path;

use chrono::{Local, TimeZone};
use clap::Subcommand;
use stepsync_core::account::normalize_identifier;
use stepsync_core::{SessionBundle, SessionState, SessionStore};

use super::{load_config, CommandResult};

#[derive(Subcommand)]
pub enum SessionAction {
    /// Show the cached session for an account (tokens are not printed)
    Show {
        /// Phone number or e-mail, as in the config
        user: String,
    },
    /// Delete the cached session so the next run logs in again
    Clear {
        user: String,
    },
}

fn describe(bundle: &SessionBundle) -> String {
    let expires = Local
        .timestamp_opt(bundle.expires_at, 0)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| bundle.expires_at.to_string());
    format!(
        "user_id {} | expires {expires} | last refreshed {}",
        bundle.user_id,
        bundle.last_refreshed_at.format("%Y-%m-%d %H:%M:%S")
    )
}

pub fn run(action: SessionAction, explicit: Option<&Path>) -> CommandResult {
    let config = load_config(explicit)?;
    let store = SessionStore::new(config.session_dir()?);

    match action {
        SessionAction::Show { user } => {
            let user = normalize_identifier(&user)?;
            match store.inspect(&user) {
                SessionState::Valid(bundle) => println!("{user}: valid | {}", describe(&bundle)),
                SessionState::Expired(bundle) => {
                    println!("{user}: expired | {}", describe(&bundle))
                }
                SessionState::Absent => println!("{user}: no cached session"),
            }
            println!("record: {}", store.path_for(&user).display());
        }
        SessionAction::Clear { user } => {
            let user = normalize_identifier(&user)?;
            if store.clear(&user)? {
                println!("cleared session for {user}");
            } else {
                println!("no cached session for {user}");
            }
        }
    }
    Ok(())
}
