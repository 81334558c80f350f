//! Contact data validation and normalisation. Pure functions, no I/O.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

pub const MIN_FULL_NAME_LENGTH: usize = 3;
pub const MAX_FULL_NAME_LENGTH: usize = 200;
pub const MIN_PHONE_DIGITS: usize = 10;
pub const MAX_PHONE_DIGITS: usize = 15;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~.-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$",
    )
    .expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationCode {
    Required,
    TooShort,
    TooLong,
    Invalid,
    /// Accepted after truncation; advisory only.
    Truncated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub valid: bool,
    pub error: Option<ValidationCode>,
    pub normalized: Option<String>,
}

impl Validation {
    fn ok(normalized: String) -> Self {
        Self {
            valid: true,
            error: None,
            normalized: Some(normalized),
        }
    }

    fn rejected(code: ValidationCode) -> Self {
        Self {
            valid: false,
            error: Some(code),
            normalized: None,
        }
    }

    /// Advisory code on an accepted value.
    pub fn notice(&self) -> Option<ValidationCode> {
        if self.valid {
            self.error
        } else {
            None
        }
    }
}

/// Trimmed, 3..=200 characters; longer names are cut to 200 and flagged [`ValidationCode::Truncated`].
pub fn validate_full_name(input: &str) -> Validation {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Validation::rejected(ValidationCode::Required);
    }
    let length = trimmed.chars().count();
    if length < MIN_FULL_NAME_LENGTH {
        return Validation::rejected(ValidationCode::TooShort);
    }
    if length > MAX_FULL_NAME_LENGTH {
        warn!(
            original_length = length,
            max_length = MAX_FULL_NAME_LENGTH,
            "Full name too long, truncating"
        );
        let truncated: String = trimmed.chars().take(MAX_FULL_NAME_LENGTH).collect();
        return Validation {
            valid: true,
            error: Some(ValidationCode::Truncated),
            normalized: Some(truncated.trim_end().to_string()),
        };
    }
    Validation::ok(trimmed.to_string())
}

/// Keeps digits and `+`; accepts 10..=15 digits with an optional leading `+`, normalised to `+<digits>`.
pub fn validate_phone(input: &str) -> Validation {
    if input.trim().is_empty() {
        return Validation::rejected(ValidationCode::Required);
    }
    let kept: String = input
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();
    let digits = kept.strip_prefix('+').unwrap_or(&kept);
    if digits.is_empty() || digits.contains('+') {
        return Validation::rejected(ValidationCode::Invalid);
    }
    let count = digits.len();
    if count < MIN_PHONE_DIGITS {
        return Validation::rejected(ValidationCode::TooShort);
    }
    if count > MAX_PHONE_DIGITS {
        return Validation::rejected(ValidationCode::TooLong);
    }
    Validation::ok(format!("+{}", digits))
}

/// Trimmed, syntactically valid address, lowercased.
pub fn validate_email(input: &str) -> Validation {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Validation::rejected(ValidationCode::Required);
    }
    let local = trimmed.split('@').next().unwrap_or_default();
    let dots_ok = !local.starts_with('.') && !local.ends_with('.') && !local.contains("..");
    if trimmed.len() > 254 || local.len() > 64 || !dots_ok || !EMAIL_RE.is_match(trimmed) {
        return Validation::rejected(ValidationCode::Invalid);
    }
    Validation::ok(trimmed.to_lowercase())
}
