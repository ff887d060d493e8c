//! Opaque key generation
//!
//! Keys are raw OS entropy encoded as unpadded URL-safe base64, so they can be
//! embedded in links without further escaping.

use crate::config::MIN_KEY_BYTES;
use crate::error::{EphemkvError, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::TryRngCore;

/// Draw `byte_len` bytes from the OS CSPRNG and encode them as a key.
///
/// Entropy failures are returned as-is and never retried.
pub fn generate_key(byte_len: usize) -> Result<String> {
    if byte_len < MIN_KEY_BYTES {
        return Err(EphemkvError::Config(format!(
            "refusing to generate a {}-byte key, minimum is {}",
            byte_len, MIN_KEY_BYTES
        )));
    }

    let mut bytes = vec![0u8; byte_len];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| EphemkvError::KeyGeneration(e.to_string()))?;

    Ok(URL_SAFE_NO_PAD.encode(&bytes))
}
