//! Root password generation for new instances.
//!
//! Passwords contain at least one lowercase letter, uppercase letter, digit,
//! and symbol. Every random draw comes from an [`EntropySource`]; the default
//! source is the operating system CSPRNG and failures are surfaced rather than
//! replaced by a weaker generator.

use thiserror::Error;

/// Shortest password the generator will produce.
pub const MIN_PASSWORD_LENGTH: usize = 8;

const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const SYMBOLS: &[u8] = b"!@#$*={}";
const CHARSETS: [&[u8]; 4] = [LOWERCASE, UPPERCASE, DIGITS, SYMBOLS];

/// Errors raised while generating a password.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PasswordError {
    /// Raised when the requested length is below [`MIN_PASSWORD_LENGTH`].
    #[error("password length must be at least {min}, got {length}")]
    TooShort {
        /// Requested length.
        length: usize,
        /// Minimum accepted length.
        min: usize,
    },
    /// Raised when the entropy source fails.
    #[error("entropy source failed: {0}")]
    Entropy(String),
}

/// Source of cryptographically secure random bytes.
pub trait EntropySource {
    /// Fills `dest` with random bytes.
    ///
    /// # Errors
    ///
    /// Returns [`PasswordError::Entropy`] when no randomness is available.
    fn fill(&mut self, dest: &mut [u8]) -> Result<(), PasswordError>;
}

/// [`EntropySource`] backed by the operating system CSPRNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&mut self, dest: &mut [u8]) -> Result<(), PasswordError> {
        getrandom::getrandom(dest).map_err(|err| PasswordError::Entropy(err.to_string()))
    }
}

/// Generates a password of `length` characters from the OS CSPRNG.
///
/// # Errors
///
/// Returns [`PasswordError::TooShort`] when `length` is below
/// [`MIN_PASSWORD_LENGTH`] and [`PasswordError::Entropy`] when the operating
/// system cannot supply random bytes.
pub fn generate_password(length: usize) -> Result<String, PasswordError> {
    generate_password_with(length, &mut OsEntropy)
}

/// Generates a password of `length` characters drawing from `source`.
///
/// # Errors
///
/// See [`generate_password`].
pub fn generate_password_with(
    length: usize,
    source: &mut impl EntropySource,
) -> Result<String, PasswordError> {
    if length < MIN_PASSWORD_LENGTH {
        return Err(PasswordError::TooShort {
            length,
            min: MIN_PASSWORD_LENGTH,
        });
    }

    let all_chars: Vec<u8> = CHARSETS.concat();
    let mut password = Vec::with_capacity(length);

    for charset in CHARSETS {
        password.push(pick(charset, source)?);
    }
    while password.len() < length {
        password.push(pick(&all_chars, source)?);
    }

    // Fisher–Yates, walking down from the last position.
    for upper in (1..password.len()).rev() {
        let other = uniform_index(upper + 1, source)?;
        password.swap(upper, other);
    }

    String::from_utf8(password).map_err(|err| PasswordError::Entropy(err.to_string()))
}

fn pick(charset: &[u8], source: &mut impl EntropySource) -> Result<u8, PasswordError> {
    let index = uniform_index(charset.len(), source)?;
    charset
        .get(index)
        .copied()
        .ok_or_else(|| PasswordError::Entropy(format!("index {index} out of range")))
}

/// Draws an index in `0..bound` without modulo bias.
fn uniform_index(bound: usize, source: &mut impl EntropySource) -> Result<usize, PasswordError> {
    let bound_u32 = u32::try_from(bound)
        .map_err(|_| PasswordError::Entropy(format!("bound {bound} exceeds u32")))?;
    if bound_u32 == 0 {
        return Err(PasswordError::Entropy(String::from("empty range")));
    }
    let slack = u32::MAX.checked_rem(bound_u32).unwrap_or_default();
    let zone = u32::MAX - slack;
    loop {
        let mut buf = [0_u8; 4];
        source.fill(&mut buf)?;
        let value = buf
            .iter()
            .fold(0_u32, |acc, byte| (acc << 8) | u32::from(*byte));
        if value < zone {
            let index = value.checked_rem(bound_u32).unwrap_or_default();
            return usize::try_from(index).map_err(|err| PasswordError::Entropy(err.to_string()));
        }
    }
}
