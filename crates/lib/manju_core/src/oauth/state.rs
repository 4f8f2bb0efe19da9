//! Anti-CSRF transaction state for a single login attempt.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use subtle::ConstantTimeEq;

/// Random bytes in a state token.
pub const STATE_BYTES: usize = 16;

/// Lifetime of the state cookie, in seconds.
pub const STATE_TTL_SECS: i64 = 600;

/// Generate a state token (URL-safe base64, no padding).
pub fn generate_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// True only when both values are present, non-empty and byte-identical.
pub fn states_match(expected: Option<&str>, received: Option<&str>) -> bool {
    match (expected, received) {
        (Some(expected), Some(received)) if !expected.is_empty() && !received.is_empty() => {
            expected.as_bytes().ct_eq(received.as_bytes()).into()
        }
        _ => false,
    }
}
