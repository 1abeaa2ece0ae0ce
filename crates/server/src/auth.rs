//! Auth Gate (A): TOTP verification shared by both carrier handshakes. See
//! spec.md §4.7.

use duskmux_totp::Verifier;
use salvo_core::http::StatusError;
use salvo_core::Request;

pub const TOTP_HEADER: &str = "totp-code";

/// Reads the `totp-code` upgrade header and checks it against `verifier`.
/// Returns `403 Forbidden` (not 401 — there is no WWW-Authenticate challenge
/// to offer an unauthenticated client) on a missing or wrong code.
pub fn check_websocket_upgrade(req: &Request, verifier: &Verifier) -> Result<(), StatusError> {
    let code = req
        .headers()
        .get(TOTP_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(StatusError::forbidden)?;
    if verifier.verify(code).unwrap_or(false) {
        Ok(())
    } else {
        Err(StatusError::forbidden())
    }
}

/// Builds the closure `duskmux_carrier::quic::accept_with_auth` calls with the
/// freshly-read handshake-stream code. A verification error (clock/library
/// fault) fails closed, same as a wrong code.
pub fn quic_verify(verifier: Verifier) -> impl Fn(&str) -> bool {
    move |code: &str| verifier.verify(code).unwrap_or(false)
}
