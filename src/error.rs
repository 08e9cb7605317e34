// Error handling module
// Defines the error taxonomy for configuration, credentials, grants and persistence

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or reading the INI store
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Store file does not exist
    #[error("Configuration file '{}' not found", .0.display())]
    NotFound(PathBuf),

    /// Store file exists but could not be read
    #[error("Failed to read configuration file '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Line that is neither a section, a key/value pair nor a comment
    #[error("Malformed line {line} in configuration file '{}': {content}", .path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        content: String,
    },

    /// Section absent from the store
    #[error("No [{0}] section in configuration")]
    MissingSection(String),

    /// Key absent from a section
    #[error("Required field '{key}' missing in section [{section}]")]
    MissingField { section: String, key: String },

    /// Value present but unusable
    #[error("Invalid value for '{key}': {reason}")]
    Invalid { key: String, reason: String },
}

/// Failures of a grant exchange against the auth endpoint
#[derive(Error, Debug)]
pub enum TokenAcquisitionError {
    /// Connection could not be established (no route, refused)
    #[error("Cannot reach NSP server at {server}: {message}")]
    NetworkUnreachable { server: String, message: String },

    /// Request exceeded the bounded timeout
    #[error("Timeout connecting to NSP server at {server}")]
    Timeout { server: String },

    /// Server answered with a non-2xx status
    #[error("Authentication rejected: {status} - {message}")]
    AuthRejected { status: u16, message: String },

    /// Any other transport or decoding failure
    #[error("Transport error: {0}")]
    Transport(String),
}

impl TokenAcquisitionError {
    /// Operator/network-class failures that will fail identically on an immediate retry
    pub fn is_network_class(&self) -> bool {
        matches!(
            self,
            TokenAcquisitionError::NetworkUnreachable { .. } | TokenAcquisitionError::Timeout { .. }
        )
    }
}

/// Failures writing the store, the exported token file, or taking the store lock
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Failed to write '{}': {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to lock '{}': {source}", .path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out after {waited_secs}s waiting for lock '{}'", .path.display())]
    LockTimeout { path: PathBuf, waited_secs: u64 },
}

/// Top-level error returned by the token lifecycle manager
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Required credential empty after resolution
    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Token acquisition failed: {0}")]
    Acquisition(#[from] TokenAcquisitionError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Result type alias for token manager operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::Config(ConfigError::NotFound(PathBuf::from("nsp_config.ini")));
        assert_eq!(
            err.to_string(),
            "Configuration error: Configuration file 'nsp_config.ini' not found"
        );

        let err = Error::Credential("'password' is empty".to_string());
        assert_eq!(err.to_string(), "Credential error: 'password' is empty");

        let err = Error::Acquisition(TokenAcquisitionError::AuthRejected {
            status: 401,
            message: "invalid_client".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "Token acquisition failed: Authentication rejected: 401 - invalid_client"
        );
    }

    #[test]
    fn test_missing_field_message() {
        let err = ConfigError::MissingField {
            section: "NSP".to_string(),
            key: "server".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Required field 'server' missing in section [NSP]"
        );
    }

    #[test]
    fn test_network_class() {
        assert!(TokenAcquisitionError::NetworkUnreachable {
            server: "10.0.0.1".to_string(),
            message: "No route to host".to_string(),
        }
        .is_network_class());
        assert!(TokenAcquisitionError::Timeout {
            server: "10.0.0.1".to_string()
        }
        .is_network_class());
        assert!(!TokenAcquisitionError::AuthRejected {
            status: 400,
            message: "invalid_grant".to_string(),
        }
        .is_network_class());
        assert!(!TokenAcquisitionError::Transport("decode".to_string()).is_network_class());
    }

    #[test]
    fn test_lock_timeout_message() {
        let err = PersistenceError::LockTimeout {
            path: PathBuf::from("/tmp/nsp_config.ini.lock"),
            waited_secs: 90,
        };
        assert_eq!(
            err.to_string(),
            "Timed out after 90s waiting for lock '/tmp/nsp_config.ini.lock'"
        );
    }
}
