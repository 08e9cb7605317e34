// Authentication module
// Manages the NSP token lifecycle: cache, refresh, reacquire, persist

mod acquire;
mod cache;
mod credentials;
mod lock;
mod manager;
mod types;

pub use acquire::{HttpTokenAcquirer, TokenAcquirer};
pub use cache::{epoch_seconds, get_cached, read_record, write_record, EXPIRY_MARGIN_SECS};
pub use credentials::{CredentialResolver, EnvOverrides, ENV_PASSWORD, ENV_SERVER, ENV_USER};
pub use lock::{StoreLock, DEFAULT_LOCK_TIMEOUT};
pub use manager::TokenLifecycleManager;
pub use types::{
    token_preview, Credentials, LifecycleState, TokenOrigin, TokenRecord, TokenResponse,
    ValidToken, DEFAULT_EXPIRES_IN,
};
