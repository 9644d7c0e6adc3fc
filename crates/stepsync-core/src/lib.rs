//! # stepsync Core Library
//!
//! Submits a daily step count to the Zepp (Huami) cloud for any number of
//! accounts. All logic lives here; the `stepsync` binary only loads the
//! configuration, sets up logging and calls [`Orchestrator::run`].
//!
//! ## Architecture
//!
//! - **Transport**: per-account `reqwest` clients with fixed timeouts, an
//!   optional proxy and bounded retry on transient failures
//! - **Timestamp**: server-synchronized epoch milliseconds with a local-clock floor
//! - **Session store**: one JSON record per account, written atomically
//! - **Auth**: the two-step login handshake plus session renewal
//! - **Steps**: two-layer randomized step counts
//! - **Submit**: the daily band-data payload
//! - **Orchestrator**: drives every account independently and builds the run summary
//!
//! ## Key Components
//!
//! - [`Orchestrator`]: one pass over all accounts
//! - [`SessionStore`]: cached sessions keyed by [`storage_key`]
//! - [`Authenticator`]: credential exchange
//! - [`Config`]: TOML configuration and account loading
//! - [`Notifier`]: summary delivery capability

pub mod account;
pub mod auth;
pub mod endpoints;
pub mod error;
pub mod network;
pub mod notify;
pub mod orchestrator;
pub mod session;
pub mod steps;
pub mod storage;
pub mod submit;
pub mod timestamp;
pub mod transport;

pub use account::{Account, AccountType};
pub use auth::{Authenticator, LoginConfig};
pub use endpoints::Endpoints;
pub use error::{AuthError, ConfigError, CoreError, HttpError, NotifyError, StoreError, SubmitError};
pub use notify::{NoopNotifier, Notifier, WebhookNotifier};
pub use orchestrator::{AccountOutcome, Orchestrator, RunSummary, SessionSource, Stage};
pub use session::{storage_key, SessionBundle, SessionState, SessionStore};
pub use steps::StepConfig;
pub use storage::{AccountSet, Config};
pub use submit::{DailyActivityRecord, Submitter};
pub use timestamp::{TimestampProvider, TimestampSource};
pub use transport::{create_client, HttpClient, HttpConfig};
