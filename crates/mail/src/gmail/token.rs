//! On-disk OAuth credential store
//!
//! The store is the only owner of the token file. Callers ask for a valid
//! credential and get back either a fresh one (refreshed and persisted as a
//! side effect if it had expired) or nothing, meaning a new authorization
//! is required.
//!
//! Writes go to a private temp file that is renamed over the target, so a
//! concurrent reader sees either the old or the new token, never a torn one.
//! Refreshes within the process are serialized; across processes the last
//! writer wins.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::MailError;

/// Seconds before expiry at which a token is already treated as expired
const EXPIRY_BUFFER_SECS: i64 = 300;

/// A persisted OAuth credential
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
    /// `None` means the provider gave no lifetime
    pub expiry: Option<DateTime<Utc>>,
}

impl Credential {
    /// Whether the access token is expired or about to be
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry <= now + chrono::Duration::seconds(EXPIRY_BUFFER_SECS),
            None => false,
        }
    }
}

/// The provider's token endpoint
pub trait TokenEndpoint: Send + Sync {
    /// URL the user visits to grant access
    fn authorization_url(&self) -> String;

    /// Exchange an authorization code for a credential
    fn exchange_code(&self, code: &str) -> Result<Credential>;

    /// Obtain a new access token for `credential`
    ///
    /// A rejection by the provider is reported as [`MailError::AuthRequired`].
    fn refresh(&self, credential: &Credential) -> Result<Credential>;
}

/// File-backed credential store
pub struct TokenStore {
    path: PathBuf,
    endpoint: Arc<dyn TokenEndpoint>,
    refresh_lock: Mutex<()>,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>, endpoint: Arc<dyn TokenEndpoint>) -> Self {
        Self {
            path: path.into(),
            endpoint,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn authorization_url(&self) -> String {
        self.endpoint.authorization_url()
    }

    /// Load the stored credential
    ///
    /// A file that cannot be decoded is deleted and reported as absent.
    pub fn load(&self) -> Option<Credential> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read token file {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(credential) => Some(credential),
            Err(e) => {
                warn!(
                    "Token file {} is corrupt ({}), discarding it",
                    self.path.display(),
                    e
                );
                if let Err(e) = self.invalidate() {
                    warn!("Failed to delete corrupt token file: {:#}", e);
                }
                None
            }
        }
    }

    /// Persist a credential, replacing any previous one
    pub fn save(&self, credential: &Credential) -> Result<()> {
        let content = serde_json::to_vec_pretty(credential)?;
        write_private(&self.path, &content)
            .with_context(|| format!("Failed to save token file {}", self.path.display()))
    }

    /// Delete the stored credential; a no-op when none exists
    pub fn invalidate(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!("Removed stored credential");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to delete token file {}", self.path.display())),
        }
    }

    /// Whether `credential` is usable, refreshing it if it has expired
    pub fn is_valid(&self, credential: &Credential) -> bool {
        match self.ensure_fresh(credential.clone()) {
            Ok(fresh) => fresh.is_some(),
            Err(e) => {
                warn!("Credential check failed: {:#}", e);
                false
            }
        }
    }

    /// Get a valid credential, or `None` when authorization is required
    ///
    /// Errors only for transient failures talking to the token endpoint.
    pub fn valid_credential(&self) -> Result<Option<Credential>> {
        match self.load() {
            Some(credential) => self.ensure_fresh(credential),
            None => Ok(None),
        }
    }

    /// Complete the authorization-code flow and persist the result
    pub fn authorize(&self, code: &str) -> Result<Credential> {
        let credential = self.endpoint.exchange_code(code)?;
        self.save(&credential)?;
        info!("Stored new credential");
        Ok(credential)
    }

    fn ensure_fresh(&self, credential: Credential) -> Result<Option<Credential>> {
        if !credential.is_expired() {
            return Ok(Some(credential));
        }

        let _guard = self
            .refresh_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // Another caller may have refreshed while we waited
        if let Some(current) = self.load()
            && !current.is_expired()
        {
            debug!("Using credential refreshed by another caller");
            return Ok(Some(current));
        }

        if credential.refresh_token.is_none() {
            info!("Credential expired and has no refresh token");
            self.invalidate()?;
            return Ok(None);
        }

        match self.endpoint.refresh(&credential) {
            Ok(refreshed) => {
                self.save(&refreshed)?;
                debug!("Refreshed access token");
                Ok(Some(refreshed))
            }
            Err(e) => match e.downcast_ref::<MailError>() {
                Some(MailError::AuthRequired { .. }) => {
                    warn!("Refresh token rejected, authorization required");
                    self.invalidate()?;
                    Ok(None)
                }
                _ => Err(e.context("Failed to refresh access token")),
            },
        }
    }
}

/// Write `bytes` to `path` readable only by the owner, via temp file + rename
fn write_private(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp = config::temp_sibling(path);
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Token endpoint that hands out numbered tokens
    struct FakeEndpoint {
        refreshes: AtomicUsize,
        reject: bool,
        transient: bool,
    }

    impl FakeEndpoint {
        fn new() -> Self {
            Self {
                refreshes: AtomicUsize::new(0),
                reject: false,
                transient: false,
            }
        }
    }

    impl TokenEndpoint for FakeEndpoint {
        fn authorization_url(&self) -> String {
            "https://auth.example.com/authorize".to_string()
        }

        fn exchange_code(&self, code: &str) -> Result<Credential> {
            Ok(credential(&format!("access-{}", code), Some(3600)))
        }

        fn refresh(&self, previous: &Credential) -> Result<Credential> {
            if self.reject {
                return Err(MailError::AuthRequired { auth_url: None }.into());
            }
            if self.transient {
                return Err(MailError::upstream("token endpoint down").into());
            }
            let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
            let mut fresh = credential(&format!("refreshed-{}", n), Some(3600));
            fresh.refresh_token = previous.refresh_token.clone();
            Ok(fresh)
        }
    }

    fn credential(access: &str, expires_in_secs: Option<i64>) -> Credential {
        Credential {
            access_token: access.to_string(),
            refresh_token: Some("refresh".to_string()),
            token_uri: "https://auth.example.com/token".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            scopes: vec!["mail.readonly".to_string()],
            expiry: expires_in_secs.map(|s| Utc::now() + chrono::Duration::seconds(s)),
        }
    }

    fn store_with(endpoint: Arc<FakeEndpoint>) -> (TokenStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"), endpoint);
        (store, dir)
    }

    #[test]
    fn test_load_absent() {
        let (store, _dir) = store_with(Arc::new(FakeEndpoint::new()));
        assert!(store.load().is_none());
        assert!(store.valid_credential().unwrap().is_none());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let (store, _dir) = store_with(Arc::new(FakeEndpoint::new()));
        let cred = credential("abc", Some(3600));
        store.save(&cred).unwrap();
        assert_eq!(store.load(), Some(cred));
    }

    #[cfg(unix)]
    #[test]
    fn test_token_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let (store, _dir) = store_with(Arc::new(FakeEndpoint::new()));
        store.save(&credential("abc", Some(3600))).unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_corrupt_file_is_deleted() {
        let (store, _dir) = store_with(Arc::new(FakeEndpoint::new()));
        fs::write(store.path(), "not json").unwrap();

        assert!(store.load().is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_invalidate_is_idempotent() {
        let (store, _dir) = store_with(Arc::new(FakeEndpoint::new()));
        store.save(&credential("abc", Some(3600))).unwrap();

        store.invalidate().unwrap();
        store.invalidate().unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn test_unexpired_credential_is_valid_without_refresh() {
        let endpoint = Arc::new(FakeEndpoint::new());
        let (store, _dir) = store_with(endpoint.clone());
        let cred = credential("abc", Some(3600));

        assert!(store.is_valid(&cred));
        assert_eq!(endpoint.refreshes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_double_check_refreshes_once() {
        let endpoint = Arc::new(FakeEndpoint::new());
        let (store, _dir) = store_with(endpoint.clone());
        let expired = credential("stale", Some(-60));
        store.save(&expired).unwrap();

        assert!(store.is_valid(&expired));
        assert!(store.is_valid(&expired));

        assert_eq!(endpoint.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(store.load().unwrap().access_token, "refreshed-1");
    }

    #[test]
    fn test_concurrent_checks_refresh_once() {
        let endpoint = Arc::new(FakeEndpoint::new());
        let (store, _dir) = store_with(endpoint.clone());
        let store = Arc::new(store);
        store.save(&credential("stale", Some(-60))).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.valid_credential().unwrap())
            })
            .collect();

        for handle in handles {
            let cred = handle.join().unwrap().unwrap();
            assert_eq!(cred.access_token, "refreshed-1");
        }
        assert_eq!(endpoint.refreshes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_rejected_refresh_invalidates() {
        let endpoint = Arc::new(FakeEndpoint {
            reject: true,
            ..FakeEndpoint::new()
        });
        let (store, _dir) = store_with(endpoint);
        store.save(&credential("stale", Some(-60))).unwrap();

        assert!(store.valid_credential().unwrap().is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_transient_refresh_failure_keeps_file() {
        let endpoint = Arc::new(FakeEndpoint {
            transient: true,
            ..FakeEndpoint::new()
        });
        let (store, _dir) = store_with(endpoint);
        let stale = credential("stale", Some(-60));
        store.save(&stale).unwrap();

        assert!(store.valid_credential().is_err());
        assert!(!store.is_valid(&stale));
        assert_eq!(store.load(), Some(stale));
    }

    #[test]
    fn test_expired_without_refresh_token() {
        let (store, _dir) = store_with(Arc::new(FakeEndpoint::new()));
        let mut cred = credential("stale", Some(-60));
        cred.refresh_token = None;
        store.save(&cred).unwrap();

        assert!(store.valid_credential().unwrap().is_none());
        assert!(store.load().is_none());
    }

    #[test]
    fn test_authorize_persists() {
        let (store, _dir) = store_with(Arc::new(FakeEndpoint::new()));
        store.authorize("code123").unwrap();
        assert_eq!(store.load().unwrap().access_token, "access-code123");
    }

    #[test]
    fn test_expiry_buffer() {
        let cred = credential("abc", Some(EXPIRY_BUFFER_SECS - 10));
        assert!(cred.is_expired());
        let cred = credential("abc", None);
        assert!(!cred.is_expired());
    }
}
