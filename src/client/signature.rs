//! RPC request signing (signature version 1.0, HMAC-SHA1).

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha1::Sha1;

use super::{Action, ApiError, Method};

/// Everything except `A-Z a-z 0-9 - _ . ~` is escaped, spaces as `%20`.
const RPC_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub(super) const SIGNATURE_METHOD: &str = "HMAC-SHA1";
pub(super) const SIGNATURE_VERSION: &str = "1.0";

pub(super) fn percent_encode(raw: &str) -> String {
    utf8_percent_encode(raw, RPC_ENCODE_SET).to_string()
}

pub(super) fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", percent_encode(key), percent_encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

pub(super) fn string_to_sign(method: Method, params: &BTreeMap<String, String>) -> String {
    format!(
        "{}&{}&{}",
        method.as_str(),
        percent_encode("/"),
        percent_encode(&canonical_query(params))
    )
}

pub(super) fn sign(secret_key: &str, string_to_sign: &str) -> Result<String, ApiError> {
    let mut mac = Hmac::<Sha1>::new_from_slice(format!("{secret_key}&").as_bytes())
        .map_err(|err| ApiError::Signing {
            message: err.to_string(),
        })?;
    mac.update(string_to_sign.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// Adds the parameters every RPC call carries besides its own.
pub(super) fn add_common_params(
    params: &mut BTreeMap<String, String>,
    action: &Action,
    access_key: &str,
    timestamp: DateTime<Utc>,
    nonce: &str,
) {
    let common = [
        ("Action", action.name),
        ("Version", action.version),
        ("Format", "JSON"),
        ("AccessKeyId", access_key),
        ("SignatureMethod", SIGNATURE_METHOD),
        ("SignatureVersion", SIGNATURE_VERSION),
        ("SignatureNonce", nonce),
    ];
    for (key, value) in common {
        params.insert(key.to_owned(), value.to_owned());
    }
    params.insert(
        "Timestamp".to_owned(),
        timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
    );
}
