#![warn(missing_docs)]
//!
//! This crate provides the security core of an [LTI 1.3](https://www.imsglobal.org/spec/lti/v1p3) integration: validation of signed launch messages on both the platform and the tool side, and OIDC third party login initiation.
//!
//! See the IMS [Security Framework](https://www.imsglobal.org/spec/security/v1p0) for the underlying protocol. Storage, key retrieval and the clock are supplied by the host application through the [RegistrationRepository], [NonceRepository], [KeyFetcher] and [Clock] traits; in memory implementations are provided for the first two and an HTTP key fetcher is available behind the `http` feature.
//!
//! ## Usage
//!
//! Add `lti1p3-security` to your dependencies in your project's Cargo.toml.
//!
//! ```toml
//! [dependencies]
//! lti1p3-security = "latest"
//! ```
//!
//! A tool validating a platform launch:
//!
//! ```rust,no_run
//! use lti1p3_security::{
//!     InMemoryNonceRepository, InMemoryRegistrationRepository, KeyChain, KeyError, KeyFetcher,
//!     LaunchMessage, LaunchValidator, Party, Platform, Registration, SecurityConfig, SystemClock,
//!     Tool,
//! };
//! use std::sync::Arc;
//!
//! // Platform keys are configured locally, nothing is ever fetched.
//! struct NoFetch;
//!
//! impl KeyFetcher for NoFetch {
//!     fn fetch_key(&self, url: &str, kid: &str) -> Result<jsonwebkey::JsonWebKey, KeyError> {
//!         Err(KeyError::KeyNotFound { url: url.to_owned(), kid: kid.to_owned() })
//!     }
//! }
//!
//! // The platform's public JWK, as published on its key set endpoint.
//! let platform_pub_jwk = r#"{ "kty": "RSA", "e": "AQAB", "n": "..." }"#;
//!
//! let registration = Registration::new(
//!     "registration",
//!     "client-id",
//!     Platform {
//!         identifier: "platform".to_owned(),
//!         name: "Platform".to_owned(),
//!         audience: "https://platform.example.com".to_owned(),
//!         oidc_authentication_url: "https://platform.example.com/oidc/auth".to_owned(),
//!     },
//!     Tool {
//!         identifier: "tool".to_owned(),
//!         name: "Tool".to_owned(),
//!         audience: "https://tool.example.com".to_owned(),
//!         oidc_initiation_url: "https://tool.example.com/oidc/init".to_owned(),
//!         launch_url: Some("https://tool.example.com/launch".to_owned()),
//!     },
//!     vec!["deployment".to_owned()],
//! )
//! .with_key_chain(
//!     Party::Platform,
//!     KeyChain::from_jwk("platform-kid", "platform-keys", platform_pub_jwk, None).unwrap(),
//! );
//!
//! let validator = LaunchValidator::tool(
//!     Arc::new(InMemoryRegistrationRepository::new([registration]).unwrap()),
//!     Arc::new(InMemoryNonceRepository::new()),
//!     Arc::new(NoFetch),
//!     Arc::new(SystemClock),
//!     SecurityConfig::default(),
//! );
//!
//! // The form post body received on the launch endpoint
//! let body = "JWT=...";
//!
//! let result = validator.validate_request(&LaunchMessage::from_query(body));
//!
//! match result.error() {
//!     None => println!("Launch is valid: {:?}", result.successes()),
//!     Some(reason) => println!("Launch rejected: {}", reason),
//! }
//! ```

mod config;
mod error;
mod key;
mod launch;
mod message;
mod nonce;
mod oidc;
mod registration;

#[cfg(test)]
mod test_support;

pub use config::{Clock, SecurityConfig, SystemClock, DEFAULT_NONCE_TTL, DEFAULT_STATE_TTL};
pub use error::{KeyError, LaunchError, OidcError, RepositoryError, TokenError};
#[cfg(feature = "http")]
pub use key::HttpKeyFetcher;
pub use key::{KeyChain, KeyFetcher, KeyResolver, KeySet};
pub use launch::{LaunchValidationResult, LaunchValidator};
pub use message::{
    claim, DeepLinkingSettingsClaim, LaunchMessage, LtiMessagePayload, MessageType,
    ResourceLinkClaim, SignedToken, LTI_VERSION,
};
pub use nonce::{
    InMemoryNonceRepository, Nonce, NonceClaim, NonceGenerator, NonceRepository,
    UuidNonceGenerator,
};
pub use oidc::{OidcAuthenticationRequest, OidcLoginInitiator, OidcLoginRequest, OidcState};
pub use registration::{
    InMemoryRegistrationRepository, Party, Platform, Registration, RegistrationRepository, Tool,
};
