//! Password strength rules.
//!
//! Applied to candidate plaintext passwords before hashing, never to
//! hashes. The broker itself only ever transports bcrypt hashes; this
//! predicate exists for front-ends that hash server-side.

use crate::error::{ValidationError, ValidationResult};

/// Minimum password length.
const MIN_LEN: usize = 8;
/// Maximum password length (bcrypt truncates beyond 72 bytes anyway).
const MAX_LEN: usize = 128;

/// Trivial words that must not appear anywhere in a password.
const TRIVIAL_WORDS: &[&str] = &[
    "password", "passwort", "qwerty", "letmein", "welcome", "abc123", "123456", "iloveyou",
    "admin", "login", "secret", "dragon", "monkey", "master", "shadow",
];

/// Validate password strength.
///
/// Requires length 8-128; at least one lowercase letter, uppercase
/// letter, digit, and non-alphanumeric character; no occurrence of the
/// username (case-insensitive); none of a small trivial-word dictionary.
///
/// # Errors
///
/// Returns [`ValidationError::WeakPassword`] naming the first failed rule.
pub fn validate_password_strength(password: &str, username: &str) -> ValidationResult<()> {
    let weak = |reason: &str| Err(ValidationError::WeakPassword(reason.to_string()));

    let len = password.chars().count();
    if len < MIN_LEN {
        return weak("must be at least 8 characters");
    }
    if len > MAX_LEN {
        return weak("must be at most 128 characters");
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return weak("must contain a lowercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return weak("must contain an uppercase letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return weak("must contain a digit");
    }
    if password.chars().all(char::is_alphanumeric) {
        return weak("must contain a non-alphanumeric character");
    }

    let lowered = password.to_lowercase();
    if !username.is_empty() && lowered.contains(&username.to_lowercase()) {
        return weak("must not contain the username");
    }
    if let Some(word) = TRIVIAL_WORDS.iter().find(|w| lowered.contains(*w)) {
        return Err(ValidationError::WeakPassword(format!(
            "must not contain trivial word {word:?}"
        )));
    }
    Ok(())
}
