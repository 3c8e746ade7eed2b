//! EdDSA (Ed25519) JWT issuance and verification for access and refresh
//! tokens.
//!
//! Both token kinds are signed with the same key pair and carry a `typ`
//! claim so one can never be accepted in place of the other. Refresh
//! tokens embed a random token id; sessions only ever store its SHA-256.

use std::collections::BTreeSet;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tollgate_core::models::auth_context::{AuthContext, AuthMethod};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Claims embedded in every access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject: account id.
    pub sub: String,
    pub tenant_id: String,
    /// Session id.
    pub sid: String,
    pub scopes: Vec<String>,
    pub typ: TokenType,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl AccessTokenClaims {
    pub fn to_auth_context(&self) -> Result<AuthContext, AuthError> {
        let parse = |field: &str, raw: &str| {
            Uuid::parse_str(raw).map_err(|_| AuthError::TokenInvalid(format!("malformed {field}")))
        };
        Ok(AuthContext {
            account_id: parse("sub", &self.sub)?,
            tenant_id: parse("tenant_id", &self.tenant_id)?,
            session_id: Some(parse("sid", &self.sid)?),
            api_key_id: None,
            scopes: self.scopes.iter().cloned().collect::<BTreeSet<_>>(),
            method: AuthMethod::AccessToken,
        })
    }
}

/// Claims embedded in every refresh token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    /// Subject: account id.
    pub sub: String,
    pub tenant_id: String,
    pub sid: String,
    /// Random refresh-token id; rotated on every refresh.
    pub rti: String,
    pub typ: TokenType,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

impl RefreshTokenClaims {
    /// `(tenant_id, session_id, account_id)`.
    pub fn ids(&self) -> Result<(Uuid, Uuid, Uuid), AuthError> {
        let parse = |raw: &str| {
            Uuid::parse_str(raw).map_err(|_| AuthError::TokenInvalid("malformed id".into()))
        };
        Ok((parse(&self.tenant_id)?, parse(&self.sid)?, parse(&self.sub)?))
    }
}

/// Parsed signing material plus token lifetimes. Build once at startup.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    access_lifetime_secs: i64,
}

impl std::fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtKeys")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl JwtKeys {
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        let encoding = EncodingKey::from_ed_pem(config.jwt_private_key_pem.as_bytes())
            .map_err(|e| AuthError::Crypto(format!("bad private key: {e}")))?;
        let decoding = DecodingKey::from_ed_pem(config.jwt_public_key_pem.as_bytes())
            .map_err(|e| AuthError::Crypto(format!("bad public key: {e}")))?;
        Ok(Self {
            encoding,
            decoding,
            issuer: config.jwt_issuer.clone(),
            access_lifetime_secs: config.access_token_lifetime_secs as i64,
        })
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["sub", "exp", "iat", "iss"]);
        validation
    }

    fn decode<T: serde::de::DeserializeOwned>(&self, token: &str) -> Result<T, AuthError> {
        jsonwebtoken::decode::<T>(token, &self.decoding, &self.validation())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::TokenInvalid(e.to_string()),
            })
    }

    fn encode<T: Serialize>(&self, claims: &T) -> Result<String, AuthError> {
        jsonwebtoken::encode(&Header::new(Algorithm::EdDSA), claims, &self.encoding)
            .map_err(|e| AuthError::Crypto(format!("JWT encode: {e}")))
    }

    pub fn access_lifetime_secs(&self) -> i64 {
        self.access_lifetime_secs
    }

    /// Issue a signed access token for a session.
    pub fn issue_access_token(
        &self,
        account_id: Uuid,
        tenant_id: Uuid,
        session_id: Uuid,
        scopes: &[String],
    ) -> Result<String, AuthError> {
        let now = Utc::now().timestamp();
        let claims = AccessTokenClaims {
            sub: account_id.to_string(),
            tenant_id: tenant_id.to_string(),
            sid: session_id.to_string(),
            scopes: scopes.to_vec(),
            typ: TokenType::Access,
            iss: self.issuer.clone(),
            iat: now,
            exp: now + self.access_lifetime_secs,
            jti: Uuid::new_v4().to_string(),
        };
        self.encode(&claims)
    }

    /// Verify signature, expiry and issuer of an access token.
    /// Stateless: no store lookup.
    pub fn decode_access_token(&self, token: &str) -> Result<AccessTokenClaims, AuthError> {
        let claims: AccessTokenClaims = self.decode(token)?;
        if claims.typ != TokenType::Access {
            return Err(AuthError::TokenInvalid("not an access token".into()));
        }
        Ok(claims)
    }

    /// Issue a signed refresh token carrying `token_id`.
    pub fn issue_refresh_token(
        &self,
        account_id: Uuid,
        tenant_id: Uuid,
        session_id: Uuid,
        token_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let claims = RefreshTokenClaims {
            sub: account_id.to_string(),
            tenant_id: tenant_id.to_string(),
            sid: session_id.to_string(),
            rti: token_id.to_string(),
            typ: TokenType::Refresh,
            iss: self.issuer.clone(),
            iat: Utc::now().timestamp(),
            exp: expires_at.timestamp(),
        };
        self.encode(&claims)
    }

    pub fn decode_refresh_token(&self, token: &str) -> Result<RefreshTokenClaims, AuthError> {
        let claims: RefreshTokenClaims = self.decode(token)?;
        if claims.typ != TokenType::Refresh {
            return Err(AuthError::TokenInvalid("not a refresh token".into()));
        }
        Ok(claims)
    }
}

/// Generate a random refresh-token id (32 bytes, base64url, no padding).
pub fn generate_token_id() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rand::Rng::random(&mut rng);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 of a refresh-token id, hex-encoded. This is what the session
/// stores.
pub fn hash_token_id(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}
