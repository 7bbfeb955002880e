/// Password-reset token utilities
///
/// A reset token is an HMAC-SHA256 (keyed with the application key) over 40
/// random alphanumeric characters, hex encoded. Only its SHA-256 digest is
/// stored in `password_resets`; the plaintext goes out in the reset mail.
///
/// # Lifetime
///
/// - A token is valid for [`RESET_TOKEN_TTL_SECS`] after it was issued
/// - A new token for the same email can be requested only
///   [`RESEND_THROTTLE_SECS`] after the previous one
///
/// # Example
///
/// ```
/// use todo_shared::auth::reset_token::{generate_reset_token, hash_token, verify_token};
///
/// let token = generate_reset_token("app-key-at-least-32-characters-long");
/// assert_eq!(token.len(), 64);
///
/// let stored = hash_token(&token);
/// assert!(verify_token(&token, &stored));
/// assert!(!verify_token("guess", &stored));
/// ```

use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Seconds a reset token stays valid
pub const RESET_TOKEN_TTL_SECS: i64 = 600;

/// Seconds before another reset mail may be sent to the same address
pub const RESEND_THROTTLE_SECS: i64 = 60;

/// Random characters fed into the HMAC
const TOKEN_SEED_LENGTH: usize = 40;

/// Generates a random alphanumeric string
///
/// Uses base62 (A-Z, a-z, 0-9) so the result is URL-safe.
///
/// ```
/// use todo_shared::auth::reset_token::generate_random_string;
///
/// let s = generate_random_string(32);
/// assert_eq!(s.len(), 32);
/// assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
/// ```
pub fn generate_random_string(length: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();

    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Generates a fresh plaintext reset token (64 hex chars)
pub fn generate_reset_token(app_key: &str) -> String {
    let seed = generate_random_string(TOKEN_SEED_LENGTH);

    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(app_key.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts keys of any size"),
    };
    mac.update(seed.as_bytes());

    hex::encode(mac.finalize().into_bytes())
}

/// Hex-encoded SHA-256 of arbitrary input
///
/// Also used for token revocation keys and rate-limit keys.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Hashes a plaintext reset token for storage
pub fn hash_token(token: &str) -> String {
    sha256_hex(token)
}

/// Checks a plaintext token against a stored digest
///
/// Compares in constant time.
pub fn verify_token(token: &str, stored_hash: &str) -> bool {
    let computed = hash_token(token);

    if computed.len() != stored_hash.len() {
        return false;
    }

    computed
        .bytes()
        .zip(stored_hash.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Whether a token issued at `created_at` has expired at `now`
pub fn is_expired(created_at: i64, now: i64) -> bool {
    now - created_at > RESET_TOKEN_TTL_SECS
}

/// Seconds until another reset mail may be sent, or `None` if allowed now
pub fn throttle_remaining(created_at: i64, now: i64) -> Option<i64> {
    let elapsed = now - created_at;
    if elapsed < RESEND_THROTTLE_SECS {
        Some(RESEND_THROTTLE_SECS - elapsed)
    } else {
        None
    }
}
