use std::path::Path;

use super::{load_config, CommandResult};

pub fn run(explicit: Option<&Path>) -> CommandResult {
    let config = load_config(explicit)?;
    let set = config.accounts();

    for account in &set.accounts {
        let proxy = account.proxy.as_deref().unwrap_or("-");
        println!(
            "{}\t{}\tbaseline {}\tdevice {}\tproxy {proxy}",
            account.user,
            account.account_type(),
            account.baseline,
            account.device_id
        );
    }
    for rejected in &set.rejected {
        println!("entry #{}\tskipped\t{}", rejected.index + 1, rejected.error);
    }

    if set.accounts.is_empty() {
        return Err(stepsync_core::ConfigError::NoAccounts.into());
    }
    Ok(())
}
