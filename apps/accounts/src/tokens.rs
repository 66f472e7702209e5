use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::Rng;

/// Random bytes behind a session token.
pub const SESSION_TOKEN_BYTES: usize = 32;

/// Generate an opaque random token with the given prefix and byte length.
pub fn generate_opaque_token(prefix: &str, bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill(&mut buf[..]);
    format!("{}_{}", prefix, URL_SAFE_NO_PAD.encode(&buf))
}

/// Generate a session token (`sid_` prefix) suitable for `sid_s`.
pub fn generate_session_token() -> String {
    generate_opaque_token("sid", SESSION_TOKEN_BYTES)
}
