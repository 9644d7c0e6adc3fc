//! One pass over the configured accounts.
//!
//! Each account moves through
//! `needs session -> (cached | login) -> has session -> submitting -> done`
//! on its own. Every error is caught at the account boundary and becomes a
//! line in the [`RunSummary`]; the next account always runs.

use std::fmt;

use chrono::NaiveDate;

use crate::account::Account;
use crate::auth::{Authenticator, LoginConfig};
use crate::endpoints::Endpoints;
use crate::error::ConfigError;
use crate::notify::Notifier;
use crate::session::{SessionBundle, SessionStore};
use crate::steps::{self, StepConfig};
use crate::storage::{AccountSet, Config, RejectedAccount};
use crate::submit::Submitter;
use crate::timestamp::TimestampSource;
use crate::transport::{create_client, HttpClient, HttpConfig};

/// How the account obtained the session it submitted with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSource {
    Cached,
    Refreshed,
    LoggedIn,
}

/// Where a failed account stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Client,
    Login,
    Submit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Client => write!(f, "client"),
            Stage::Login => write!(f, "login"),
            Stage::Submit => write!(f, "submit"),
        }
    }
}

/// Terminal state of one account (or config entry) in a run.
#[derive(Debug, Clone, PartialEq)]
pub enum AccountOutcome {
    Succeeded {
        user: String,
        steps: u32,
        date: NaiveDate,
        session: SessionSource,
        ack: serde_json::Value,
    },
    Failed {
        user: String,
        stage: Stage,
        reason: String,
    },
    Skipped {
        index: usize,
        reason: String,
    },
}

impl AccountOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AccountOutcome::Succeeded { .. })
    }
}

impl fmt::Display for AccountOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountOutcome::Succeeded {
                user, steps, date, ..
            } => write!(f, "[OK] {user} | steps {steps} | {date}"),
            AccountOutcome::Failed {
                user,
                stage,
                reason,
            } => write!(f, "[FAIL] {user} | {stage}: {reason}"),
            AccountOutcome::Skipped { index, reason } => {
                write!(f, "[SKIP] entry #{} | {reason}", index + 1)
            }
        }
    }
}

/// Ordered outcomes for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub outcomes: Vec<AccountOutcome>,
}

impl RunSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, AccountOutcome::Failed { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, AccountOutcome::Skipped { .. }))
            .count()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed, {} skipped",
            self.succeeded(),
            self.failed(),
            self.skipped()
        )?;
        for outcome in &self.outcomes {
            write!(f, "\n{outcome}")?;
        }
        Ok(())
    }
}

fn skip_outcome(entry: &RejectedAccount) -> AccountOutcome {
    AccountOutcome::Skipped {
        index: entry.index,
        reason: entry.error.to_string(),
    }
}

pub struct Orchestrator {
    http: HttpConfig,
    login: LoginConfig,
    steps: StepConfig,
    endpoints: Endpoints,
    store: SessionStore,
    timestamps: TimestampSource,
    notifier: Box<dyn Notifier>,
    title: String,
}

impl Orchestrator {
    pub fn new(config: &Config, store: SessionStore, notifier: Box<dyn Notifier>) -> Self {
        Self {
            http: config.http.clone(),
            login: config.login.clone(),
            steps: config.steps,
            endpoints: config.endpoints.clone(),
            store,
            timestamps: TimestampSource::from_endpoints(&config.endpoints),
            notifier,
            title: config.notify.title.clone(),
        }
    }

    /// Replace the timestamp provider chain.
    pub fn with_timestamps(mut self, timestamps: TimestampSource) -> Self {
        self.timestamps = timestamps;
        self
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Process every account once, then hand the summary to the notifier.
    ///
    /// # Errors
    /// `ConfigError::NoAccounts` when the set holds no usable account.
    pub async fn run(&self, set: &AccountSet) -> Result<RunSummary, ConfigError> {
        if set.accounts.is_empty() {
            return Err(ConfigError::NoAccounts);
        }

        tracing::info!(
            accounts = set.accounts.len(),
            skipped = set.rejected.len(),
            "starting run"
        );

        // Valid accounts fill the positions the rejected entries leave free.
        let mut summary = RunSummary::default();
        let mut accounts = set.accounts.iter();
        let mut rejected = set.rejected.iter().peekable();
        let mut position = 0;
        loop {
            let outcome = if let Some(entry) = rejected.next_if(|r| r.index <= position) {
                skip_outcome(entry)
            } else if let Some(account) = accounts.next() {
                self.process_account(account).await
            } else if let Some(entry) = rejected.next() {
                skip_outcome(entry)
            } else {
                break;
            };
            summary.outcomes.push(outcome);
            position += 1;
        }

        let body = summary.to_string();
        if let Err(e) = self.notifier.send(&self.title, &body).await {
            tracing::warn!(notifier = self.notifier.name(), error = %e, "summary delivery failed");
        }

        tracing::info!(
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            "run finished"
        );
        Ok(summary)
    }

    /// Drive one account to a terminal outcome.
    pub async fn process_account(&self, account: &Account) -> AccountOutcome {
        let fail = |stage: Stage, reason: String| {
            tracing::warn!(account = %account.user, %stage, %reason, "account failed");
            AccountOutcome::Failed {
                user: account.user.clone(),
                stage,
                reason,
            }
        };

        let client = match create_client(&self.http, account.proxy.as_deref()) {
            Ok(c) => c,
            Err(e) => return fail(Stage::Client, e.to_string()),
        };

        let (session, source) = match self.acquire_session(&client, account).await {
            Ok(found) => found,
            Err(reason) => return fail(Stage::Login, reason),
        };

        let steps = steps::generate(account, &self.steps);

        let submitter = Submitter::new(&client, &self.endpoints, &self.timestamps);
        match submitter.submit(&session, &account.device_id, steps).await {
            Ok(receipt) => {
                tracing::info!(
                    account = %account.user,
                    steps = receipt.steps,
                    date = %receipt.date,
                    session = ?source,
                    "steps submitted"
                );
                AccountOutcome::Succeeded {
                    user: account.user.clone(),
                    steps: receipt.steps,
                    date: receipt.date,
                    session: source,
                    ack: receipt.ack,
                }
            }
            Err(e) => fail(Stage::Submit, e.to_string()),
        }
    }

    /// Reuse a valid cached session (renewing it when enabled) or log in.
    async fn acquire_session(
        &self,
        client: &HttpClient,
        account: &Account,
    ) -> Result<(SessionBundle, SessionSource), String> {
        let auth = Authenticator::new(client, &self.endpoints, &self.login, &self.store);

        if let Some(cached) = self.store.load(&account.user) {
            tracing::info!(account = %account.user, "using cached session");
            if !self.login.refresh_cached {
                return Ok((cached, SessionSource::Cached));
            }
            let fallback = cached.clone();
            return match auth.refresh(account, cached).await {
                Ok(bundle) if bundle.login_token != fallback.login_token => {
                    Ok((bundle, SessionSource::Refreshed))
                }
                Ok(bundle) => Ok((bundle, SessionSource::Cached)),
                Err(e) => {
                    tracing::warn!(account = %account.user, error = %e, "session renewal failed, keeping cached session");
                    Ok((fallback, SessionSource::Cached))
                }
            };
        }

        auth.login(account)
            .await
            .map(|bundle| (bundle, SessionSource::LoggedIn))
            .map_err(|e| e.to_string())
    }
}
