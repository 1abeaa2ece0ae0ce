//! TOTP secret generation and verification shared by the server's auth gate
//! and the `genSecret` CLI utility. See spec.md §4.7.
//!
//! Every code in this system is SHA-512, 8 digits, issuer `camouflage`,
//! account `client`, with a configurable period (default 60s).

use thiserror::Error;
use totp_rs::{Algorithm, Secret, TOTP};

/// Default TOTP period in seconds, used by `genSecret` when `--period` is
/// omitted and as the default for both client/server TOML schemas.
pub const DEFAULT_PERIOD: u64 = 60;

const ISSUER: &str = "camouflage";
const ACCOUNT: &str = "client";
const DIGITS: usize = 8;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid TOTP secret: {0}")]
    InvalidSecret(String),
    #[error("system clock error: {0}")]
    Clock(#[from] std::time::SystemTimeError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A configured TOTP verifier/generator bound to one secret and period.
#[derive(Debug, Clone)]
pub struct Verifier {
    totp: TOTP,
}

impl Verifier {
    /// `secret` is a base32-encoded string, as produced by [`generate_secret`].
    pub fn new(secret: &str, period: u64) -> Result<Self> {
        let bytes = Secret::Encoded(secret.to_string())
            .to_bytes()
            .map_err(|e| Error::InvalidSecret(e.to_string()))?;
        let totp = TOTP::new(Algorithm::SHA512, DIGITS, 1, period, bytes, Some(ISSUER.to_string()), ACCOUNT.to_string())
            .map_err(|e| Error::InvalidSecret(e.to_string()))?;
        Ok(Self { totp })
    }

    /// Generates the code for "now", used by the client when sending
    /// `totp-code` (WebSocket) or the handshake stream payload (QUIC).
    pub fn current_code(&self) -> Result<String> {
        Ok(self.totp.generate_current()?)
    }

    /// Verifies `code` against the current time step (and the library's
    /// configured skew tolerance, per spec.md §4.7's "MAY allow one step").
    pub fn verify(&self, code: &str) -> Result<bool> {
        Ok(self.totp.check_current(code)?)
    }
}

/// Generates a fresh random TOTP secret (base32-encoded), for the
/// `genSecret` CLI utility and for operators provisioning new client/server
/// pairs. The returned string is what both TOML configs' `secret` field holds.
#[must_use]
pub fn generate_secret() -> String {
    Secret::generate_secret().to_encoded().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_secret_round_trips_through_verifier() {
        let secret = generate_secret();
        let verifier = Verifier::new(&secret, DEFAULT_PERIOD).expect("valid verifier");
        let code = verifier.current_code().expect("generate code");
        assert_eq!(code.len(), DIGITS);
        assert!(verifier.verify(&code).expect("verify"));
    }

    #[test]
    fn wrong_secret_rejects_code() {
        let secret_a = generate_secret();
        let secret_b = generate_secret();
        let verifier_a = Verifier::new(&secret_a, DEFAULT_PERIOD).expect("valid verifier");
        let verifier_b = Verifier::new(&secret_b, DEFAULT_PERIOD).expect("valid verifier");
        let code = verifier_a.current_code().expect("generate code");
        assert!(!verifier_b.verify(&code).expect("verify"));
    }

    #[test]
    fn rejects_malformed_secret() {
        assert!(Verifier::new("not valid base32!!", DEFAULT_PERIOD).is_err());
    }
}
