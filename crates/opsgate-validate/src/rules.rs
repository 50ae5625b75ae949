//! Format predicates and the forbidden-character screen.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{ValidationError, ValidationResult};

/// Characters that must never appear in any wrapper-bound value.
///
/// Covers shell metacharacters, globbing, quoting, redirection, and
/// control characters. This is the superset variant; the gateway
/// re-screens every argv string against the same table before spawn.
pub const FORBIDDEN_CHARS: &[char] = &[
    ';', '|', '&', '$', '(', ')', '`', ' ', '>', '<', '*', '?', '{', '}', '[', ']', '\\', '\'',
    '"', '\n', '\r', '\t', '\0',
];

/// Shells a managed account may be assigned.
pub const ALLOWED_SHELLS: &[&str] = &[
    "/bin/bash",
    "/bin/sh",
    "/usr/bin/zsh",
    "/usr/sbin/nologin",
    "/bin/false",
];

static USERNAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z_][a-z0-9_-]{0,31}$").expect("username pattern is valid")
});

static BCRYPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\$2[aby]\$[0-9]{2}\$.{53}$").expect("bcrypt pattern is valid"));

/// Find the first forbidden character in a value, if any.
#[must_use]
pub fn forbidden_char_in(value: &str) -> Option<char> {
    value.chars().find(|c| FORBIDDEN_CHARS.contains(c))
}

/// Reject a value that contains any forbidden character.
///
/// # Errors
///
/// Returns [`ValidationError::ForbiddenCharacter`] naming the field and
/// the first offending character.
pub fn validate_forbidden_char_free(field: &str, value: &str) -> ValidationResult<()> {
    match forbidden_char_in(value) {
        Some(ch) => Err(ValidationError::ForbiddenCharacter {
            field: field.to_string(),
            ch,
        }),
        None => Ok(()),
    }
}

/// Validate a username against `^[a-z_][a-z0-9_-]{0,31}$`.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidUsername`] on mismatch.
pub fn validate_username(username: &str) -> ValidationResult<()> {
    if USERNAME_RE.is_match(username) {
        Ok(())
    } else {
        Err(ValidationError::InvalidUsername(username.to_string()))
    }
}

/// Validate a groupname. Same pattern as usernames.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidGroupname`] on mismatch.
pub fn validate_groupname(groupname: &str) -> ValidationResult<()> {
    if USERNAME_RE.is_match(groupname) {
        Ok(())
    } else {
        Err(ValidationError::InvalidGroupname(groupname.to_string()))
    }
}

/// Validate the shape of a bcrypt hash (`$2a$`/`$2b$`/`$2y$`, cost, 53
/// salt+digest characters). Shape only; this never verifies a password.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidBcryptHash`] on mismatch.
pub fn validate_bcrypt_hash(hash: &str) -> ValidationResult<()> {
    if BCRYPT_RE.is_match(hash) {
        Ok(())
    } else {
        Err(ValidationError::InvalidBcryptHash)
    }
}

/// Validate a login shell against the allowed-shell list.
///
/// # Errors
///
/// Returns [`ValidationError::ShellNotAllowed`] unless the shell is an
/// exact match in [`ALLOWED_SHELLS`].
pub fn validate_shell(shell: &str) -> ValidationResult<()> {
    if ALLOWED_SHELLS.contains(&shell) {
        Ok(())
    } else {
        Err(ValidationError::ShellNotAllowed(shell.to_string()))
    }
}

/// Validate a home directory: `/home/<segment>`, exactly one extra
/// segment, no `..`, no trailing slash.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidHomeDir`] naming the failed rule.
pub fn validate_home_dir(path: &str) -> ValidationResult<()> {
    let reject = |reason: &str| {
        Err(ValidationError::InvalidHomeDir {
            path: path.to_string(),
            reason: reason.to_string(),
        })
    };

    let Some(rest) = path.strip_prefix("/home/") else {
        return reject("must start with /home/");
    };
    if rest.is_empty() {
        return reject("missing user segment");
    }
    if rest.ends_with('/') {
        return reject("trailing slash");
    }
    if rest.contains('/') {
        return reject("must be exactly one segment under /home");
    }
    if rest.contains("..") {
        return reject("path traversal");
    }
    validate_forbidden_char_free("home", rest)?;
    Ok(())
}

/// Validate a free-text reason: 1-1000 characters, forbidden-char free
/// except that plain spaces and tabs are tolerated in prose.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidReason`] on length violations or
/// non-whitespace forbidden characters.
pub fn validate_reason(reason: &str) -> ValidationResult<()> {
    if reason.is_empty() {
        return Err(ValidationError::InvalidReason("must not be empty".into()));
    }
    if reason.chars().count() > 1000 {
        return Err(ValidationError::InvalidReason(
            "must be at most 1000 characters".into(),
        ));
    }
    if let Some(ch) = reason
        .chars()
        .find(|c| FORBIDDEN_CHARS.contains(c) && *c != ' ' && *c != '\t')
    {
        return Err(ValidationError::InvalidReason(format!(
            "contains forbidden character {ch:?}"
        )));
    }
    Ok(())
}
