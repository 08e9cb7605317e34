// Token cache over the persisted [NSP] token fields

use chrono::{DateTime, Utc};

use crate::store::{ConfigStore, NSP_SECTION};

use super::types::TokenRecord;

/// Seconds before expiry at which a cached token stops being served
pub const EXPIRY_MARGIN_SECS: f64 = 60.0;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const TOKEN_EXPIRY_KEY: &str = "token_expiry";

/// Seconds since the Unix epoch, with sub-second precision
pub fn epoch_seconds(now: DateTime<Utc>) -> f64 {
    now.timestamp_micros() as f64 / 1_000_000.0
}

/// Read the persisted record regardless of validity
///
/// Missing or unparsable fields yield `None`; this never fails.
pub fn read_record(store: &ConfigStore) -> Option<TokenRecord> {
    let expiry = store
        .get_opt(NSP_SECTION, TOKEN_EXPIRY_KEY)?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|expiry| expiry.is_finite())?;

    let access_token = store.get_opt(NSP_SECTION, ACCESS_TOKEN_KEY)?.trim();
    if access_token.is_empty() {
        return None;
    }

    let refresh_token = store
        .get_opt(NSP_SECTION, REFRESH_TOKEN_KEY)
        .unwrap_or_default()
        .trim();

    Some(TokenRecord {
        access_token: access_token.to_string(),
        refresh_token: refresh_token.to_string(),
        expiry_epoch_seconds: expiry,
    })
}

/// Return the persisted record if it is still valid at `now`
pub fn get_cached(store: &ConfigStore, now: DateTime<Utc>) -> Option<TokenRecord> {
    let record = read_record(store)?;
    if epoch_seconds(now) < record.expiry_epoch_seconds - EXPIRY_MARGIN_SECS {
        Some(record)
    } else {
        tracing::debug!(
            expiry = record.expiry_epoch_seconds,
            "Cached token expired or inside safety margin"
        );
        None
    }
}

/// Non-blank refresh token from the store, independent of expiry validity
pub fn stored_refresh_token(store: &ConfigStore) -> Option<String> {
    store
        .get_opt(NSP_SECTION, REFRESH_TOKEN_KEY)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Set all three token fields; the caller saves the store in one rewrite
pub fn write_record(store: &mut ConfigStore, record: &TokenRecord) {
    store.set(NSP_SECTION, ACCESS_TOKEN_KEY, record.access_token.as_str());
    store.set(NSP_SECTION, REFRESH_TOKEN_KEY, record.refresh_token.as_str());
    store.set(
        NSP_SECTION,
        TOKEN_EXPIRY_KEY,
        format!("{:.6}", record.expiry_epoch_seconds),
    );
}
