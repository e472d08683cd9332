// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `${VAR}` placeholder expansion, applied only at connection time.
//!
//! Persisted configs keep the placeholder; nothing in the catalog or the
//! store ever holds an expanded secret.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("environment variable {0} is not set")]
    Unset(String),

    #[error("unclosed ${{...}} placeholder in {0:?}")]
    Unclosed(String),
}

/// Expand every `${VAR}` in `input` using `lookup`.
///
/// A `$` not followed by `{` is passed through verbatim. An unset variable
/// or an unterminated placeholder is an error; callers surface it as an
/// authentication failure for the spell being connected.
pub fn expand_placeholders(
    input: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String, SecretError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(SecretError::Unclosed(input.to_string()));
        };
        let name = &after[..end];
        match lookup(name) {
            Some(value) => out.push_str(&value),
            None => return Err(SecretError::Unset(name.to_string())),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Expand placeholders from the process environment.
pub fn expand_env(input: &str) -> Result<String, SecretError> {
    expand_placeholders(input, |name| std::env::var(name).ok())
}

#[cfg(test)]
#[path = "secret_tests.rs"]
mod tests;
