//! Account configuration records.
//!
//! An [`Account`] is the validated, immutable form of one configured user.
//! Identifiers are normalized once here: 11-digit mainland phone numbers get
//! the `+86` country prefix, e-mail addresses are checked against a loose
//! pattern, and everything else is rejected.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::ConfigError;

pub const DEFAULT_BASELINE: u32 = 20_000;
pub const DEFAULT_DEVICE_ID: &str = "88CC5224060006C4";

const PHONE_PREFIX: &str = "+86";

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9.-]+$").expect("valid email regex")
});

/// How the login endpoint should treat an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountType {
    Phone,
    Email,
}

impl AccountType {
    /// Value of the `third_name` field in the session-issuance request.
    pub fn third_name(self) -> &'static str {
        match self {
            AccountType::Phone => "huami_phone",
            AccountType::Email => "huami",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountType::Phone => write!(f, "phone"),
            AccountType::Email => write!(f, "email"),
        }
    }
}

/// One configured account, immutable for the duration of a run.
#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    pub user: String,
    pub password: String,
    pub baseline: u32,
    pub device_id: String,
    pub proxy: Option<String>,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("baseline", &self.baseline)
            .field("device_id", &self.device_id)
            .field("proxy", &self.proxy)
            .finish()
    }
}

impl Account {
    /// Validate raw fields into an account.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidAccount` when the identifier is neither an
    /// e-mail address nor a phone number, or when the password is empty.
    pub fn new(
        user: &str,
        password: &str,
        baseline: u32,
        device_id: &str,
        proxy: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let user = normalize_identifier(user)?;
        let password = password.trim();
        if password.is_empty() {
            return Err(ConfigError::InvalidAccount {
                user,
                message: "password is empty".into(),
            });
        }
        let device_id = match device_id.trim() {
            "" => DEFAULT_DEVICE_ID.to_string(),
            d => d.to_string(),
        };
        let proxy = proxy
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from);

        Ok(Self {
            user,
            password: password.to_string(),
            baseline,
            device_id,
            proxy,
        })
    }

    pub fn account_type(&self) -> AccountType {
        account_type_of(&self.user)
    }
}

/// Phone identifiers carry a country-code prefix after normalization.
pub fn account_type_of(identifier: &str) -> AccountType {
    if identifier.starts_with('+') {
        AccountType::Phone
    } else {
        AccountType::Email
    }
}

/// Normalize a raw identifier into the form the login endpoint expects.
///
/// # Errors
/// Returns `ConfigError::InvalidAccount` for unrecognized identifiers.
pub fn normalize_identifier(raw: &str) -> Result<String, ConfigError> {
    let user = raw.trim();
    let invalid = |message: &str| ConfigError::InvalidAccount {
        user: user.to_string(),
        message: message.to_string(),
    };

    if user.is_empty() {
        return Err(invalid("identifier is empty"));
    }

    if user.contains('@') {
        if EMAIL_RE.is_match(user) {
            return Ok(user.to_string());
        }
        return Err(invalid("malformed e-mail address"));
    }

    let all_digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());

    if user.len() == 11 && all_digits(user) {
        return Ok(format!("{PHONE_PREFIX}{user}"));
    }

    if let Some(rest) = user.strip_prefix('+') {
        if all_digits(rest) && (8..=15).contains(&rest.len()) {
            return Ok(user.to_string());
        }
    }

    Err(invalid("must be an e-mail address or an 11-digit phone number"))
}
