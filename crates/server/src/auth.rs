//! Bearer credentials for the HTTP surface.
//!
//! Callers send `Authorization: Bearer <password>|<subdomain>|<crm_token>`. The password
//! is checked here and the subdomain must be a bare DNS label; the CRM validates the token
//! on first use.

use std::sync::OnceLock;

use axum::http::{header::AUTHORIZATION, HeaderMap};
use kommo_core::config::subdomain_base_url;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

/// Account resolved from a valid bearer token.
#[derive(Debug)]
pub struct Credentials {
    pub subdomain: String,
    pub access_token: SecretString,
}

impl Credentials {
    pub fn base_url(&self) -> String {
        subdomain_base_url(&self.subdomain)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingHeader,
    #[error("authorization scheme must be Bearer")]
    NotBearer,
    #[error("invalid token format, expected password|subdomain|token")]
    Malformed,
    #[error("invalid password")]
    InvalidPassword,
}

impl AuthError {
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::MissingHeader => "missing_header",
            Self::NotBearer => "not_bearer",
            Self::Malformed => "malformed_token",
            Self::InvalidPassword => "invalid_password",
        }
    }
}

pub const UNAUTHORIZED_MESSAGE: &str =
    "Unauthorized. Use Authorization: Bearer <password>|<subdomain>|<kommo_token>";

pub fn authenticate(headers: &HeaderMap, password: &SecretString) -> Result<Credentials, AuthError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AuthError::MissingHeader)?;
    parse_bearer(header, password)
}

/// Only a single lowercase label, so the account URL can never name another host.
fn is_account_label(subdomain: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[a-z0-9-]+$").ok())
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(subdomain))
}

pub fn parse_bearer(header: &str, password: &SecretString) -> Result<Credentials, AuthError> {
    let token = header.trim().strip_prefix("Bearer ").ok_or(AuthError::NotBearer)?.trim();

    let parts: Vec<&str> = token.split('|').collect();
    let [given_password, subdomain, access_token] = parts.as_slice() else {
        return Err(AuthError::Malformed);
    };
    let subdomain = subdomain.trim().to_ascii_lowercase();
    if !is_account_label(&subdomain) || access_token.trim().is_empty() {
        return Err(AuthError::Malformed);
    }
    if *given_password != password.expose_secret() {
        return Err(AuthError::InvalidPassword);
    }

    Ok(Credentials {
        subdomain,
        access_token: SecretString::from(access_token.trim().to_string()),
    })
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderMap;
    use secrecy::{ExposeSecret, SecretString};

    use super::{authenticate, parse_bearer, AuthError};

    fn password() -> SecretString {
        SecretString::from("s3cret".to_string())
    }

    #[test]
    fn valid_token_resolves_account() {
        let credentials =
            parse_bearer("Bearer s3cret|acme|kommo-token", &password()).expect("token should parse");

        assert_eq!(credentials.subdomain, "acme");
        assert_eq!(credentials.base_url(), "https://acme.kommo.com");
        assert_eq!(credentials.access_token.expose_secret(), "kommo-token");
    }

    #[test]
    fn wrong_password_and_shapes_are_rejected() {
        assert_eq!(
            parse_bearer("Bearer nope|acme|token", &password()).err(),
            Some(AuthError::InvalidPassword)
        );
        assert_eq!(parse_bearer("Basic s3cret|acme|token", &password()).err(), Some(AuthError::NotBearer));
        assert_eq!(parse_bearer("Bearer s3cret|acme", &password()).err(), Some(AuthError::Malformed));
        assert_eq!(parse_bearer("Bearer s3cret|acme|a|b", &password()).err(), Some(AuthError::Malformed));
        assert_eq!(parse_bearer("Bearer s3cret||token", &password()).err(), Some(AuthError::Malformed));
    }

    #[test]
    fn subdomain_must_be_a_single_label() {
        let hostile = [
            "Bearer s3cret|169.254.169.254/latest/meta-data?x=|tok",
            "Bearer s3cret|evil.example.com#|tok",
            "Bearer s3cret|acme.kommo.com@attacker|tok",
            "Bearer s3cret|ac me|tok",
        ];
        for header in hostile {
            assert_eq!(parse_bearer(header, &password()).err(), Some(AuthError::Malformed), "{header}");
        }

        let credentials = parse_bearer("Bearer s3cret| Acme-2 |tok", &password()).expect("label is fine");
        assert_eq!(credentials.subdomain, "acme-2");
        assert_eq!(credentials.base_url(), "https://acme-2.kommo.com");
    }

    #[test]
    fn missing_header_is_reported() {
        assert_eq!(authenticate(&HeaderMap::new(), &password()).err(), Some(AuthError::MissingHeader));
    }
}
