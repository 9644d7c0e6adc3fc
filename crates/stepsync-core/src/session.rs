//! Per-account session cache.
//!
//! One JSON record per account lives under the configured session directory:
//!
//! ```json
//! {"login_token": "...", "user_id": "...", "app_token": "...",
//!  "expire_time": 1700086400, "last_update": "2023-11-15 22:13:20"}
//! ```
//!
//! Records are written to a sibling temp file and renamed into place, so a
//! reader sees either the old record or the new one. Anything that fails to
//! parse is treated as absent.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Lifetime of a freshly issued or refreshed session.
pub const SESSION_TTL_SECS: i64 = 86_400;

const RECORD_EXT: &str = "json";

/// Cached proof of authentication for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionBundle {
    pub login_token: String,
    pub user_id: String,
    pub app_token: String,
    /// Epoch seconds after which the bundle must not be used.
    #[serde(rename = "expire_time")]
    pub expires_at: i64,
    #[serde(rename = "last_update", with = "last_update_format")]
    pub last_refreshed_at: NaiveDateTime,
}

mod last_update_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    pub fn serialize<S: Serializer>(dt: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&dt.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveDateTime::parse_from_str(raw.trim(), FORMAT).map_err(serde::de::Error::custom)
    }
}

fn now_local() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

impl SessionBundle {
    /// A bundle valid for [`SESSION_TTL_SECS`] from now.
    pub fn issue(login_token: String, user_id: String, app_token: String) -> Self {
        Self {
            login_token,
            user_id,
            app_token,
            expires_at: Utc::now().timestamp() + SESSION_TTL_SECS,
            last_refreshed_at: now_local(),
        }
    }

    /// Swap in a renewed login token and restart the expiry clock.
    pub fn renew(&mut self, login_token: String) {
        self.login_token = login_token;
        self.expires_at = Utc::now().timestamp() + SESSION_TTL_SECS;
        self.last_refreshed_at = now_local();
    }

    pub fn is_valid_at(&self, epoch_secs: i64) -> bool {
        epoch_secs < self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now().timestamp())
    }
}

/// What the store holds for an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Absent,
    Valid(SessionBundle),
    Expired(SessionBundle),
}

/// Encode an account identifier into a filename-safe key.
///
/// ASCII letters, digits and `-` pass through; every other byte, including
/// `_` itself, becomes `_XX` (uppercase hex). The mapping is injective, so
/// `a@example.com` and `a_example_com` land on different keys.
pub fn storage_key(identifier: &str) -> String {
    let mut key = String::with_capacity(identifier.len());
    for byte in identifier.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            key.push(byte as char);
        } else {
            key.push_str(&format!("_{byte:02X}"));
        }
    }
    key
}

/// Directory-backed session records, one file per account.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, identifier: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{RECORD_EXT}", storage_key(identifier)))
    }

    /// Inspect the record without filtering on expiry.
    pub fn inspect(&self, identifier: &str) -> SessionState {
        let path = self.path_for(identifier);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return SessionState::Absent,
        };
        match serde_json::from_str::<SessionBundle>(&content) {
            Ok(bundle) if bundle.is_valid() => SessionState::Valid(bundle),
            Ok(bundle) => SessionState::Expired(bundle),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring malformed session record");
                SessionState::Absent
            }
        }
    }

    /// The cached bundle, only if it is still valid.
    pub fn load(&self, identifier: &str) -> Option<SessionBundle> {
        match self.inspect(identifier) {
            SessionState::Valid(bundle) => Some(bundle),
            SessionState::Expired(_) => {
                tracing::info!(account = identifier, "cached session expired");
                None
            }
            SessionState::Absent => None,
        }
    }

    /// Replace the account's record.
    ///
    /// # Errors
    /// Returns `StoreError::Io` if the directory, temp file or rename fails.
    pub fn save(&self, identifier: &str, bundle: &SessionBundle) -> Result<PathBuf, StoreError> {
        fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.path_for(identifier);
        let temp_path = path.with_extension(format!("{RECORD_EXT}.tmp"));
        let content = serde_json::to_string_pretty(bundle)?;

        fs::write(&temp_path, content).map_err(|source| StoreError::Io {
            path: temp_path.clone(),
            source,
        })?;
        fs::rename(&temp_path, &path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;

        Ok(path)
    }

    /// Delete the account's record. Returns whether one existed.
    ///
    /// # Errors
    /// Returns `StoreError::Io` if the file exists but cannot be removed.
    pub fn clear(&self, identifier: &str) -> Result<bool, StoreError> {
        let path = self.path_for(identifier);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn bundle(expires_at: i64) -> SessionBundle {
        SessionBundle {
            login_token: "login".into(),
            user_id: "1001".into(),
            app_token: "app".into(),
            expires_at,
            last_refreshed_at: NaiveDateTime::parse_from_str(
                "2026-10-16 07:30:00",
                "%Y-%m-%d %H:%M:%S",
            )
            .unwrap(),
        }
    }

    #[test]
    fn valid_bundle_round_trips_unchanged() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        let original = bundle(Utc::now().timestamp() + 3600);

        store.save("a@example.com", &original).unwrap();
        assert_eq!(store.load("a@example.com"), Some(original));
    }

    #[test]
    fn expired_bundle_is_absent() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        let stale = bundle(Utc::now().timestamp() - 1);

        store.save("+8613800138000", &stale).unwrap();
        assert_eq!(store.load("+8613800138000"), None);
        assert_eq!(store.inspect("+8613800138000"), SessionState::Expired(stale));
    }

    #[test]
    fn missing_record_is_absent() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("not-created"));
        assert_eq!(store.inspect("a@example.com"), SessionState::Absent);
    }

    #[test]
    fn malformed_record_is_absent() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        fs::write(store.path_for("a@example.com"), "{\"login_token\": \"x\"").unwrap();
        assert_eq!(store.inspect("a@example.com"), SessionState::Absent);
    }

    #[test]
    fn record_missing_fields_is_absent() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        let far_future = Utc::now().timestamp() + 3600;
        fs::write(
            store.path_for("a@example.com"),
            format!(r#"{{"login_token":"x","user_id":"1","expire_time":{far_future},"last_update":"2026-10-16 07:30:00"}}"#),
        )
        .unwrap();
        assert_eq!(store.load("a@example.com"), None);
    }

    #[test]
    fn record_uses_wire_field_names() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        let path = store.save("a@example.com", &bundle(1_800_000_000)).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(raw["expire_time"], 1_800_000_000);
        assert_eq!(raw["last_update"], "2026-10-16 07:30:00");
        assert_eq!(raw["app_token"], "app");
    }

    #[test]
    fn save_leaves_no_temp_file_and_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        let future = Utc::now().timestamp() + 3600;

        store.save("a@example.com", &bundle(future)).unwrap();
        let mut newer = bundle(future + 10);
        newer.app_token = "app-2".into();
        store.save("a@example.com", &newer).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![format!("{}.json", storage_key("a@example.com"))]);
        assert_eq!(store.load("a@example.com").unwrap().app_token, "app-2");
    }

    #[test]
    fn clear_reports_existence() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path());
        store
            .save("a@example.com", &bundle(Utc::now().timestamp() + 60))
            .unwrap();
        assert!(store.clear("a@example.com").unwrap());
        assert!(!store.clear("a@example.com").unwrap());
    }

    #[test]
    fn issue_and_renew_set_a_day_of_validity() {
        let now = Utc::now().timestamp();
        let mut b = SessionBundle::issue("l".into(), "u".into(), "a".into());
        assert!((b.expires_at - (now + SESSION_TTL_SECS)).abs() <= 2);
        assert!(b.is_valid());
        assert!(!b.is_valid_at(b.expires_at));

        b.expires_at = now - 5;
        b.renew("l2".into());
        assert_eq!(b.login_token, "l2");
        assert!(b.is_valid());
    }

    #[test]
    fn storage_key_escapes_separators() {
        assert_eq!(storage_key("a@example.com"), "a_40example_2Ecom");
        assert_eq!(storage_key("a_example_com"), "a_5Fexample_5Fcom");
        assert_eq!(storage_key("+8613800138000"), "_2B8613800138000");
        assert_ne!(storage_key("a@example.com"), storage_key("a_example_com"));
    }

    proptest! {
        #[test]
        fn storage_key_is_injective(a in "[a-z0-9_.@+-]{1,16}", b in "[a-z0-9_.@+-]{1,16}") {
            prop_assume!(a != b);
            prop_assert_ne!(storage_key(&a), storage_key(&b));
        }

        #[test]
        fn storage_key_is_filename_safe(id in "\\PC{1,24}") {
            let key = storage_key(&id);
            prop_assert!(key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
        }
    }
}
