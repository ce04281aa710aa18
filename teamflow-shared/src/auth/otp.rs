/// One-time registration codes
///
/// Registration is two-step: the user submits name + email, receives a
/// six-digit code by email, and proves control of the address by submitting
/// the code back. Codes are single-use and time-limited; only a SHA-256
/// digest is stored at rest.
///
/// # Example
///
/// ```
/// use teamflow_shared::auth::otp::{generate_otp, hash_otp, verify_otp};
/// use chrono::{Duration, Utc};
///
/// let otp = generate_otp();
/// let hash = hash_otp(&otp);
/// let expiry = Utc::now() + Duration::minutes(10);
///
/// assert!(verify_otp(&otp, &hash, expiry));
/// assert!(!verify_otp("000000", &hash, expiry));
/// ```

use chrono::{DateTime, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Number of digits in a generated code
const OTP_LENGTH: u32 = 6;

/// Generates a random numeric one-time code
///
/// Always exactly six digits, zero-padded.
pub fn generate_otp() -> String {
    let mut rng = rand::thread_rng();
    let code: u32 = rng.gen_range(0..10u32.pow(OTP_LENGTH));
    format!("{:06}", code)
}

/// Hashes a one-time code for storage
///
/// Returns the hex-encoded SHA-256 digest (64 characters). Codes are low
/// entropy but short-lived and single-use; hashing keeps them out of the
/// database in plaintext.
pub fn hash_otp(otp: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(otp.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Verifies a submitted code against the stored digest and expiry
///
/// Returns false if the code is wrong or the expiry has passed. The
/// comparison is constant-time over the fixed-length digests.
pub fn verify_otp(otp: &str, stored_hash: &str, expiry: DateTime<Utc>) -> bool {
    if Utc::now() > expiry {
        return false;
    }

    constant_time_compare(&hash_otp(otp), stored_hash)
}

/// Constant-time string comparison
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_generate_otp_format() {
        for _ in 0..100 {
            let otp = generate_otp();
            assert_eq!(otp.len(), 6);
            assert!(otp.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_hash_is_deterministic() {
        let hash1 = hash_otp("123456");
        let hash2 = hash_otp("123456");
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_verify_correct_code() {
        let otp = generate_otp();
        let hash = hash_otp(&otp);
        let expiry = Utc::now() + Duration::minutes(10);

        assert!(verify_otp(&otp, &hash, expiry));
    }

    #[test]
    fn test_verify_wrong_code() {
        let hash = hash_otp("123456");
        let expiry = Utc::now() + Duration::minutes(10);

        assert!(!verify_otp("654321", &hash, expiry));
    }

    #[test]
    fn test_verify_expired_code() {
        let otp = generate_otp();
        let hash = hash_otp(&otp);
        let expiry = Utc::now() - Duration::seconds(1);

        assert!(!verify_otp(&otp, &hash, expiry));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("hello", "hello"));
        assert!(!constant_time_compare("hello", "world"));
        assert!(!constant_time_compare("hello", "hello there"));
    }
}
