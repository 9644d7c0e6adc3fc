use std::path::Path;

use stepsync_core::network::probe_dns;
use stepsync_core::{
    create_client, Config, NoopNotifier, Notifier, Orchestrator, SessionStore, WebhookNotifier,
};

use super::{config_path, CommandResult};

pub async fn run(explicit: Option<&Path>, no_notify: bool) -> CommandResult {
    let path = config_path(explicit)?;
    let config = Config::load_from(&path)?;
    let accounts = config.accounts();
    tracing::info!(
        config = %path.display(),
        accounts = accounts.accounts.len(),
        rejected = accounts.rejected.len(),
        "configuration loaded"
    );

    if config.network.dns_probe {
        probe_dns(&config.network.probe_host).await;
    }

    let notifier: Box<dyn Notifier> = match &config.notify.webhook_url {
        Some(url) if !no_notify => {
            let client = create_client(&config.http, None)?;
            Box::new(WebhookNotifier::new(url.clone(), client))
        }
        _ => Box::new(NoopNotifier),
    };
    tracing::debug!(notifier = notifier.name(), "summary delivery");

    let session_dir = config.session_dir()?;
    tracing::debug!(dir = %session_dir.display(), "session store");
    let orchestrator = Orchestrator::new(&config, SessionStore::new(session_dir), notifier);
    let summary = orchestrator.run(&accounts).await?;

    println!("{summary}");
    Ok(())
}
