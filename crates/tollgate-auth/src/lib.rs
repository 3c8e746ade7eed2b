//! Tollgate Auth — credential verification, JWT issuance and validation,
//! session lifecycle, the tenant directory and the tenant isolation
//! guard.

pub mod config;
pub mod credentials;
pub mod directory;
pub mod error;
pub mod guard;
pub mod password;
pub mod service;
pub mod session;
pub mod token;

pub use config::AuthConfig;
pub use credentials::CredentialVerifier;
pub use directory::TenantDirectory;
pub use error::AuthError;
pub use guard::{TenantGuard, TenantScope};
pub use service::{AuthService, LoginInput, RegisterInput};
pub use session::{IssuedSession, SessionManager, TokenPair};
pub use token::{AccessTokenClaims, JwtKeys, RefreshTokenClaims};
