//! Credential vault: tokens at rest and access-token freshness.

pub mod cipher;
pub mod endpoints;
pub mod vault;

pub use cipher::TokenCipher;
pub use endpoints::{GoogleOauthEndpoints, TokenGrant};
pub use vault::{AccessTokenProvider, CredentialVault};
