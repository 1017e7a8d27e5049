//! Bearer access tokens
//!
//! [`TokenMaker`] issues and verifies signed tokens carrying a [`Payload`].
//! [`JwtMaker`] is the HS256 JWT implementation.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Minimum HMAC secret length accepted by [`JwtMaker::new`]
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("token is not valid yet")]
    NotYetValid,

    #[error("token is invalid: {0}")]
    Invalid(String),

    #[error("invalid key size: secret must be at least {MIN_SECRET_LEN} characters")]
    KeyTooShort,

    #[error("failed to sign token: {0}")]
    Signing(String),
}

/// Verified token contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub id: Uuid,
    /// Username the token was issued to
    pub subject: String,
    pub audience: String,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub issued_at: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
}

/// Inputs for a new token
#[derive(Debug, Clone)]
pub struct PayloadParams {
    pub subject: String,
    pub audience: String,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub duration: Duration,
}

impl PayloadParams {
    /// Token valid from now for `duration`
    pub fn new(
        subject: impl Into<String>,
        audience: impl Into<String>,
        issuer: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            subject: subject.into(),
            audience: audience.into(),
            issuer: issuer.into(),
            not_before: Utc::now(),
            duration,
        }
    }
}

impl Payload {
    pub fn new(params: PayloadParams) -> Self {
        // JWT timestamps carry whole seconds
        let now = truncate_secs(Utc::now());
        Self {
            id: Uuid::new_v4(),
            subject: params.subject,
            audience: params.audience,
            issuer: params.issuer,
            not_before: truncate_secs(params.not_before),
            issued_at: now,
            expired_at: now + params.duration,
        }
    }
}

fn truncate_secs(t: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(t.timestamp(), 0).single().unwrap_or(t)
}

/// Issues and verifies access tokens
pub trait TokenMaker: Send + Sync {
    fn create_token(&self, params: PayloadParams) -> Result<(String, Payload), TokenError>;

    fn verify_token(&self, token: &str) -> Result<Payload, TokenError>;
}

/// Registered-claim wire form of [`Payload`]
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    jti: Uuid,
    sub: String,
    aud: String,
    iss: String,
    nbf: i64,
    iat: i64,
    exp: i64,
}

impl From<&Payload> for Claims {
    fn from(p: &Payload) -> Self {
        Self {
            jti: p.id,
            sub: p.subject.clone(),
            aud: p.audience.clone(),
            iss: p.issuer.clone(),
            nbf: p.not_before.timestamp(),
            iat: p.issued_at.timestamp(),
            exp: p.expired_at.timestamp(),
        }
    }
}

impl TryFrom<Claims> for Payload {
    type Error = TokenError;

    fn try_from(c: Claims) -> Result<Self, Self::Error> {
        let ts = |secs: i64, name: &str| {
            Utc.timestamp_opt(secs, 0)
                .single()
                .ok_or_else(|| TokenError::Invalid(format!("bad {} timestamp", name)))
        };
        Ok(Self {
            id: c.jti,
            subject: c.sub,
            audience: c.aud,
            issuer: c.iss,
            not_before: ts(c.nbf, "nbf")?,
            issued_at: ts(c.iat, "iat")?,
            expired_at: ts(c.exp, "exp")?,
        })
    }
}

/// HS256 JSON Web Tokens
pub struct JwtMaker {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtMaker {
    /// `audience` and `issuer` are the values every verified token must carry.
    pub fn new(secret: &str, audience: &str, issuer: &str) -> Result<Self, TokenError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(TokenError::KeyTooShort);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_nbf = true;
        validation.set_audience(&[audience]);
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "nbf", "sub", "aud", "iss"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }
}

impl TokenMaker for JwtMaker {
    fn create_token(&self, params: PayloadParams) -> Result<(String, Payload), TokenError> {
        let payload = Payload::new(params);
        let token = encode(
            &Header::new(Algorithm::HS256),
            &Claims::from(&payload),
            &self.encoding,
        )
        .map_err(|e| TokenError::Signing(e.to_string()))?;
        Ok((token, payload))
    }

    fn verify_token(&self, token: &str) -> Result<Payload, TokenError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::ImmatureSignature => TokenError::NotYetValid,
                _ => TokenError::Invalid(e.to_string()),
            }
        })?;
        Payload::try_from(data.claims)
    }
}
