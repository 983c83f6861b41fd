//! Secure random strings for secrets and salts.

use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;

const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Largest multiple of the alphabet size that fits in a byte; bytes at or
/// above it are rejected so every character is equally likely.
const ACCEPT_BELOW: u8 = (256 / ALPHABET.len() * ALPHABET.len()) as u8;

/// The operating system's random source failed.
#[derive(Debug, Error)]
#[error("secure random source failed: {0}")]
pub struct RandomError(#[from] rand::Error);

/// Returns `len` characters drawn uniformly from `[0-9A-Za-z]` using the OS CSPRNG.
///
/// There is no fallback generator: if the OS source fails, so does this.
pub fn random_alphanumeric(len: usize) -> Result<String, RandomError> {
    let mut out = String::with_capacity(len);
    let mut buf = [0u8; 64];

    while out.len() < len {
        OsRng.try_fill_bytes(&mut buf)?;
        for &byte in &buf {
            if byte >= ACCEPT_BELOW {
                continue;
            }
            out.push(char::from(ALPHABET[usize::from(byte) % ALPHABET.len()]));
            if out.len() == len {
                break;
            }
        }
    }

    Ok(out)
}
