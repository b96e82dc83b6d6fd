//! Authentication-plugin scramble math. A thin, sans-I/O wrapper over
//! `bytes::{xor, sha1, sha256, encrypt_password}` — those stay byte-in/
//! byte-out and don't need to change to serve the new handshake algorithm.

use common::err::decode_error::ReError;
use common::err::CResult;

const MY_SQL_NATIVE_PASSWORD: &str = "mysql_native_password";
const CACHING_SHA2_PASSWORD: &str = "caching_sha2_password";

/// The authentication plugins the handshake algorithm knows how to answer.
/// `sha256_password` (plaintext-only RSA variant) isn't supported — only
/// `caching_sha2_password`'s cached fast-auth path is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPlugin {
    MySqlNativePassword,
    CachingSha2Password,
}

impl AuthPlugin {
    pub fn name(&self) -> &'static str {
        match self {
            AuthPlugin::MySqlNativePassword => MY_SQL_NATIVE_PASSWORD,
            AuthPlugin::CachingSha2Password => CACHING_SHA2_PASSWORD,
        }
    }
}

pub fn resolve(auth_plugin_name: &str) -> CResult<AuthPlugin> {
    if auth_plugin_name == MY_SQL_NATIVE_PASSWORD {
        return Ok(AuthPlugin::MySqlNativePassword);
    }
    if auth_plugin_name == CACHING_SHA2_PASSWORD {
        return Ok(AuthPlugin::CachingSha2Password);
    }
    Err(ReError::Precondition(format!(
        "unsupported authentication plugin: {auth_plugin_name}"
    )))
}

/// The initial scrambled-password response sent in the handshake response
/// packet, per the chosen plugin's algorithm.
pub fn initial_response(plugin: AuthPlugin, password: &str, scramble: &str) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    crate::bytes::encrypt_password(&password.to_string(), &scramble.to_string(), &plugin)
}

/// Whether a `caching_sha2_password` fast-auth reply (`0x01 0x03`) signals
/// success without a full-auth round trip.
pub fn is_fast_auth_success(packet: &[u8]) -> bool {
    packet.len() >= 2 && packet[0] == 0x01 && packet[1] == 0x03
}

/// XORs the NUL-terminated cleartext password with the scramble, the first
/// step of `caching_sha2_password` full authentication over a plaintext
/// channel (the RSA envelope is applied by the caller afterward).
pub fn xor_password_with_scramble(password: &str, scramble: &str) -> Vec<u8> {
    let mut pw = password.as_bytes().to_vec();
    pw.push(0);
    crate::bytes::xor(&pw, scramble.as_bytes())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn resolve_rejects_unknown_plugin() {
        assert!(resolve("sha256_password").is_err());
        assert!(resolve("mysql_native_password").is_ok());
        assert!(resolve("caching_sha2_password").is_ok());
    }

    #[test]
    fn empty_password_yields_empty_response() {
        assert!(initial_response(AuthPlugin::MySqlNativePassword, "", "scramble").is_empty());
    }

    #[test]
    fn fast_auth_success_marker() {
        assert!(is_fast_auth_success(&[0x01, 0x03]));
        assert!(!is_fast_auth_success(&[0x01, 0x04]));
        assert!(!is_fast_auth_success(&[0x00]));
    }
}
