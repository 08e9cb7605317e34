use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::{Error, PersistenceError, Result};
use crate::store::{write_atomic, ConfigStore, NSP_SECTION};

use super::acquire::TokenAcquirer;
use super::cache::{self, epoch_seconds};
use super::credentials::CredentialResolver;
use super::lock::{StoreLock, DEFAULT_LOCK_TIMEOUT};
use super::types::{
    Credentials, LifecycleState, TokenOrigin, TokenRecord, TokenResponse, ValidToken,
};

/// Key naming an optional file that receives the current access token
pub const TOKEN_FILE_KEY: &str = "token_file";

/// Token lifecycle manager
/// Serves the cached token when valid, otherwise refreshes or reacquires and persists
pub struct TokenLifecycleManager<A> {
    /// Path to the INI store
    config_path: PathBuf,

    /// Grant exchanges
    acquirer: A,

    /// Environment-over-store credential precedence
    resolver: CredentialResolver,

    /// Bound on waiting for another process holding the store lock
    lock_timeout: Duration,

    /// Last state reached; held for the whole call so one refresher runs at a time
    state: Mutex<LifecycleState>,
}

impl<A: TokenAcquirer> TokenLifecycleManager<A> {
    pub fn new(config_path: impl Into<PathBuf>, acquirer: A, resolver: CredentialResolver) -> Self {
        Self {
            config_path: config_path.into(),
            acquirer,
            resolver,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            state: Mutex::new(LifecycleState::NoToken),
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn acquirer(&self) -> &A {
        &self.acquirer
    }

    /// Last lifecycle state reached
    pub async fn state(&self) -> LifecycleState {
        *self.state.lock().await
    }

    /// Get a valid token, refreshing or reacquiring only when necessary
    ///
    /// Performs at most one refresh and one initial grant. Network-class
    /// refresh failures are returned without falling back to an initial grant.
    pub async fn get_valid_token(&self) -> Result<ValidToken> {
        let mut state = self.state.lock().await;

        let result = self.run_locked(&mut state).await;
        if let Err(ref e) = result {
            transition(&mut state, LifecycleState::Failed);
            tracing::error!(error = %e, "Failed to obtain a valid token");
        }
        result
    }

    /// Validate the store, take the store lock, then run the lifecycle on a fresh load
    ///
    /// Config and credential errors surface before any lock file is created. A lock
    /// file that cannot be opened is logged and the call proceeds unlocked.
    async fn run_locked(&self, state: &mut LifecycleState) -> Result<ValidToken> {
        let store = ConfigStore::load(&self.config_path)?;
        self.resolver.resolve(&store)?;

        let _lock = match StoreLock::acquire(&self.config_path, self.lock_timeout).await {
            Ok(lock) => Some(lock),
            Err(e @ PersistenceError::LockTimeout { .. }) => return Err(e.into()),
            Err(e) => {
                tracing::warn!(error = %e, "Store lock unavailable, continuing without it");
                None
            }
        };

        // Another holder may have rewritten the store while we waited
        let store = store.reload()?;
        self.run(store, state).await
    }

    async fn run(&self, mut store: ConfigStore, state: &mut LifecycleState) -> Result<ValidToken> {
        let creds = self.resolver.resolve(&store)?;

        match cache::get_cached(&store, Utc::now()) {
            Some(record) => {
                transition(state, LifecycleState::CachedValid);
                tracing::debug!("Found valid non-expired token in config");
                return Ok(ValidToken {
                    server: creds.server,
                    access_token: record.access_token,
                    origin: TokenOrigin::Cached,
                });
            }
            None if cache::read_record(&store).is_some() => {
                transition(state, LifecycleState::Expired)
            }
            None => transition(state, LifecycleState::NoToken),
        }

        if let Some(refresh_token) = cache::stored_refresh_token(&store) {
            transition(state, LifecycleState::Refreshing);
            tracing::info!("Token expired, attempting refresh");

            match self.acquirer.refresh(&creds.server, &refresh_token).await {
                Ok(response) => {
                    let token = self.commit(
                        &mut store,
                        &creds,
                        response,
                        &refresh_token,
                        TokenOrigin::Refreshed,
                    );
                    transition(state, LifecycleState::Valid);
                    return Ok(token);
                }
                Err(e) if e.is_network_class() => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Refresh token failed, will attempt to obtain a new initial token"
                    );
                }
            }
        }

        transition(state, LifecycleState::Reacquiring);
        let response = self
            .acquirer
            .request_initial(&creds.server, &creds.user, &creds.password)
            .await
            .map_err(Error::from)?;
        let token = self.commit(&mut store, &creds, response, "", TokenOrigin::Reacquired);
        transition(state, LifecycleState::Valid);
        Ok(token)
    }

    /// Persist a new record and build the returned token
    ///
    /// Persistence failures are logged; the freshly obtained token is still returned.
    fn commit(
        &self,
        store: &mut ConfigStore,
        creds: &Credentials,
        response: TokenResponse,
        presented_refresh: &str,
        origin: TokenOrigin,
    ) -> ValidToken {
        let record =
            TokenRecord::from_response(response, epoch_seconds(Utc::now()), presented_refresh);

        if let Err(e) = persist(store, &record) {
            tracing::error!(error = %e, "Could not write updated token to config");
        }

        ValidToken {
            server: creds.server.clone(),
            access_token: record.access_token,
            origin,
        }
    }
}

/// Write the record in one store rewrite, then export to `token_file` if configured
fn persist(
    store: &mut ConfigStore,
    record: &TokenRecord,
) -> std::result::Result<(), PersistenceError> {
    cache::write_record(store, record);
    store.save()?;
    tracing::info!(path = %store.path().display(), "Successfully updated config with new token");

    let token_file = store
        .get_opt(NSP_SECTION, TOKEN_FILE_KEY)
        .map(str::trim)
        .filter(|path| !path.is_empty());
    if let Some(token_file) = token_file {
        let path = crate::config::expand_tilde(token_file);
        write_atomic(&path, &record.access_token)?;
        tracing::debug!(path = %path.display(), "Exported access token");
    }

    Ok(())
}

fn transition(state: &mut LifecycleState, next: LifecycleState) {
    tracing::debug!(from = %state, to = %next, "Token state transition");
    *state = next;
}
