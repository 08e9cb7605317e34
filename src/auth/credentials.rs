// Credential resolution
// Environment overrides take precedence over values persisted in the [NSP] section

use crate::error::{Error, Result};
use crate::store::{ConfigStore, NSP_SECTION};

use super::types::Credentials;

pub const ENV_SERVER: &str = "NSP_SERVER";
pub const ENV_USER: &str = "NSP_USER";
pub const ENV_PASSWORD: &str = "NSP_PASSWORD";

/// Environment overrides, captured once and injected into the resolver
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub server: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl EnvOverrides {
    /// Read `NSP_SERVER`, `NSP_USER` and `NSP_PASSWORD`; empty variables count as unset
    pub fn from_env() -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            server: read(ENV_SERVER),
            user: read(ENV_USER),
            password: read(ENV_PASSWORD),
        }
    }
}

/// Resolves server/user/password from overrides, then the store
#[derive(Debug, Clone, Default)]
pub struct CredentialResolver {
    overrides: EnvOverrides,
}

impl CredentialResolver {
    pub fn new(overrides: EnvOverrides) -> Self {
        Self { overrides }
    }

    pub fn from_env() -> Self {
        Self::new(EnvOverrides::from_env())
    }

    /// Resolve credentials
    ///
    /// Absent from both sources is a configuration error; blank after
    /// trimming is a credential error.
    pub fn resolve(&self, store: &ConfigStore) -> Result<Credentials> {
        let server = self.field(store, "server", self.overrides.server.as_deref())?;
        let user = self.field(store, "user", self.overrides.user.as_deref())?;
        let password = self.field(store, "password", self.overrides.password.as_deref())?;

        Ok(Credentials {
            server,
            user,
            password,
        })
    }

    fn field(&self, store: &ConfigStore, key: &str, overridden: Option<&str>) -> Result<String> {
        let value = match overridden {
            Some(value) => {
                tracing::debug!(field = key, "Using environment override");
                value
            }
            None => store.get(NSP_SECTION, key).map_err(Error::Config)?,
        };

        let value = value.trim();
        if value.is_empty() {
            return Err(Error::Credential(format!(
                "Required configuration field '{}' is empty",
                key
            )));
        }

        Ok(value.to_string())
    }
}
