//! Identity and access: password policy, password hashing, access tokens.
//!
//! Stored hash format: `pbkdf2_sha256$<rounds>$<salt b64>$<hash b64>`.
//! Tokens are HS256 JWTs whose `sub` is the user id and which carry an
//! `is_admin` claim.

use crate::{
    config::AuthConfig,
    error::{AcledError, AcledResult},
    store::UserRow,
    types::UserId,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::Hmac;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

const HASH_SCHEME: &str = "pbkdf2_sha256";
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

pub const MIN_USERNAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 8;

// ── Credential rules ──────────────────────────────────────────────

pub fn validate_username(username: &str) -> AcledResult<()> {
    if username.chars().count() < MIN_USERNAME_LEN {
        return Err(AcledError::validation(format!(
            "Username must be at least {MIN_USERNAME_LEN} characters long."
        )));
    }
    if !username.chars().all(char::is_alphanumeric) {
        return Err(AcledError::validation("Username must be alphanumeric."));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> AcledResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AcledError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long."
        )));
    }
    if !password.contains('#') {
        return Err(AcledError::validation(
            "Password must contain at least one hashtag (#).",
        ));
    }
    Ok(())
}

// ── Password hashing ──────────────────────────────────────────────

fn derive(password: &str, salt: &[u8], rounds: u32) -> AcledResult<[u8; HASH_LEN]> {
    let mut out = [0u8; HASH_LEN];
    pbkdf2::pbkdf2::<Hmac<Sha256>>(password.as_bytes(), salt, rounds, &mut out)
        .map_err(|e| AcledError::Other(anyhow::anyhow!("pbkdf2 failed: {e}")))?;
    Ok(out)
}

/// Salt and hash a plaintext password.
pub fn hash_password(password: &str, rounds: u32) -> AcledResult<String> {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let hash = derive(password, &salt, rounds)?;
    Ok(format!(
        "{HASH_SCHEME}${rounds}${}${}",
        STANDARD.encode(salt),
        STANDARD.encode(hash)
    ))
}

/// Check a plaintext password against a stored hash. Malformed hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(HASH_SCHEME), Some(rounds), Some(salt), Some(expected), None) =
        (parts.next(), parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    let (Ok(rounds), Ok(salt), Ok(expected)) =
        (rounds.parse::<u32>(), STANDARD.decode(salt), STANDARD.decode(expected))
    else {
        return false;
    };
    match derive(password, &salt, rounds) {
        Ok(actual) => actual[..].ct_eq(&expected[..]).into(),
        Err(_) => false,
    }
}

// ── Access tokens ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default)]
    pub is_admin: bool,
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub is_admin: bool,
}

impl Principal {
    pub fn require_admin(&self) -> AcledResult<()> {
        if self.is_admin {
            Ok(())
        } else {
            Err(AcledError::Forbidden)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            ttl: Duration::seconds(config.token_ttl_secs),
        }
    }

    pub fn issue(&self, user: &UserRow, now: DateTime<Utc>) -> AcledResult<TokenResponse> {
        let claims = Claims {
            sub: user.id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            is_admin: user.is_admin,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok(TokenResponse {
            access_token: token,
            token_type: "Bearer".into(),
        })
    }

    /// Decode and check a token. Any defect (signature, expiry, subject)
    /// is reported as `Unauthorized`.
    pub fn verify(&self, token: &str) -> AcledResult<Principal> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|e| {
                log::debug!("auth: rejected token: {e}");
                AcledError::Unauthorized
            })?;
        let user_id = data.claims.sub.parse::<UserId>().map_err(|_| {
            log::debug!("auth: token subject '{}' is not a user id", data.claims.sub);
            AcledError::Unauthorized
        })?;
        Ok(Principal {
            user_id,
            is_admin: data.claims.is_admin,
        })
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
        Some(token.trim())
    } else {
        None
    }
}
