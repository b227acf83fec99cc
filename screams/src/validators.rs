//! Payload checks for signup/login and profile-detail normalisation.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::{ValidationIssue, ValidationReport};

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(([^<>()\[\]\\.,;:\s@"]+(\.[^<>()\[\]\\.,;:\s@"]+)*)|(".+"))@((\[[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\])|(([a-zA-Z\-0-9]+\.)+[a-zA-Z]{2,}))$"#,
    )
    .expect("email pattern compiles")
});

const MUST_NOT_BE_EMPTY: &str = "Must not be empty";

/// Returns `true` if the provided string is a syntactically valid email address.
pub fn is_valid_email(value: &str) -> bool {
    EMAIL_PATTERN.is_match(value)
}

/// Returns `true` when the value carries an explicit `http`/`https` scheme.
pub fn has_web_scheme(value: &str) -> bool {
    Url::parse(value).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
    #[serde(default)]
    pub handle: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Raw profile fields as posted by clients.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserDetailsRequest {
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

/// Profile fields worth storing; empty inputs are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

pub fn validate_signup_data(data: &SignupRequest) -> ValidationReport {
    let mut issues = Vec::new();

    if is_blank(&data.email) {
        issues.push(ValidationIssue::new("email", MUST_NOT_BE_EMPTY));
    } else if !is_valid_email(&data.email) {
        issues.push(ValidationIssue::new("email", "Must be a valid email address"));
    }

    if is_blank(&data.password) {
        issues.push(ValidationIssue::new("password", MUST_NOT_BE_EMPTY));
    }
    if data.password != data.confirm_password {
        issues.push(ValidationIssue::new("confirmPassword", "Passwords must match"));
    }
    if is_blank(&data.handle) {
        issues.push(ValidationIssue::new("handle", MUST_NOT_BE_EMPTY));
    }

    ValidationReport::from(issues)
}

pub fn validate_login_data(data: &LoginRequest) -> ValidationReport {
    let mut issues = Vec::new();
    if is_blank(&data.email) {
        issues.push(ValidationIssue::new("email", MUST_NOT_BE_EMPTY));
    }
    if is_blank(&data.password) {
        issues.push(ValidationIssue::new("password", MUST_NOT_BE_EMPTY));
    }
    ValidationReport::from(issues)
}

pub fn reduce_user_details(data: &UserDetailsRequest) -> UserDetails {
    fn non_empty(value: &Option<String>) -> Option<String> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|trimmed| !trimmed.is_empty())
            .map(str::to_string)
    }

    let website = non_empty(&data.website).map(|site| {
        if has_web_scheme(&site) {
            site
        } else {
            format!("http://{site}")
        }
    });

    UserDetails {
        bio: non_empty(&data.bio),
        website,
        location: non_empty(&data.location),
    }
}
