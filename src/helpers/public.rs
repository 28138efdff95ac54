use std::time::{SystemTime, UNIX_EPOCH};

use rand::{distributions::Alphanumeric, Rng};
use subtle::ConstantTimeEq;

/// Gets a Unix Timestamp in seconds. Uses [`SystemTime::now`]
pub fn now() -> i64 {
    let start = SystemTime::now();
    start
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Generates a random alphanumeric string of `len` characters
pub fn generate_alphanumeric(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Compares two byte strings in time that only depends on their length.
///
/// Empty inputs and inputs of different lengths are rejected without comparing.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return false;
    }

    a.ct_eq(b).into()
}
