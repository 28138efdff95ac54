use base64::{engine::general_purpose::STANDARD, Engine};
use lazy_static::lazy_static;
use num_bigint::BigUint;
use regex::Regex;
use url::{form_urlencoded, Url};

use crate::types::{ErrorKind, OpenIdError, OpenIdReturnType};

lazy_static! {
    static ref NONCE_TIMESTAMP_REGEX: Regex =
        Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}Z").unwrap();
}

/// Parses `url` and requires it to be an absolute http(s) url with a host
pub(crate) fn validate_url(url: &str) -> Option<Url> {
    let parsed = Url::parse(url).ok()?;

    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return None;
    }

    Some(parsed)
}

pub(crate) fn string_map_to_form_url_encoded(map: &[(String, String)]) -> String {
    let mut form_urlencoded = form_urlencoded::Serializer::new(String::new());
    for (k, v) in map {
        form_urlencoded.append_pair(k, v);
    }

    form_urlencoded.finish()
}

pub(crate) fn form_url_encoded_to_string_map(string: &str) -> Vec<(String, String)> {
    form_urlencoded::parse(string.as_bytes())
        .map(|(x, y)| (x.to_string(), y.to_string()))
        .collect()
}

/// Big endian two's complement representation of a non negative integer.
pub(crate) fn btwoc(value: &BigUint) -> Vec<u8> {
    let mut bytes = value.to_bytes_be();

    if bytes.first().is_some_and(|b| b & 0x80 != 0) {
        bytes.insert(0, 0);
    }

    bytes
}

pub(crate) fn base64_btwoc(value: &BigUint) -> String {
    STANDARD.encode(btwoc(value))
}

pub(crate) fn base64_decode(value: &str, what: &str) -> OpenIdReturnType<Vec<u8>> {
    STANDARD.decode(value.trim()).map_err(|_| {
        Box::new(OpenIdError::new_message_parse_error(
            crate::types::codes::INVALID_PARAMETER,
            format!("{what} is not valid base64"),
        ))
    })
}

pub(crate) fn base64_to_biguint(value: &str, what: &str) -> OpenIdReturnType<BigUint> {
    let bytes = base64_decode(value, what)?;

    if bytes.is_empty() {
        return Err(Box::new(OpenIdError::new_association_error(
            ErrorKind::Protocol,
            crate::types::codes::INVALID_DH_PARAMETERS,
            format!("{what} is empty"),
        )));
    }

    Ok(BigUint::from_bytes_be(&bytes))
}

/// Splits a `response_nonce` into its timestamp (unix seconds) and the remainder.
pub(crate) fn parse_nonce_timestamp(nonce: &str) -> Option<i64> {
    let stamp = NONCE_TIMESTAMP_REGEX.find(nonce)?.as_str();

    chrono::NaiveDateTime::parse_from_str(stamp, "%Y-%m-%dT%H:%M:%SZ")
        .ok()
        .map(|dt| dt.and_utc().timestamp())
}

pub(crate) fn format_nonce_timestamp(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .unwrap_or_default()
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}
