//! Error types for every fallible concern of the crate.
//!
//! The `Display` output of [LaunchError] and [OidcError] is the reason string
//! surfaced to callers, so the wording is part of the public contract.

use jsonwebtoken as jwt;
use thiserror::Error;

/// Failure to parse or sign a compact signed token.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The token is not made of three dot separated segments.
    #[error("JWT is not a compact serialized token")]
    Malformed,

    /// The token header cannot be decoded.
    #[error("JWT header cannot be decoded: {0}")]
    Header(#[source] jwt::errors::Error),

    /// The claim set is not base64url encoded JSON object.
    #[error("JWT claims cannot be decoded: {0}")]
    Claims(String),

    /// The key chain cannot sign.
    #[error("JWT cannot be signed: {0}")]
    Key(#[from] KeyError),

    /// Signing the claim set failed.
    #[error("JWT cannot be signed: {0}")]
    Signing(#[source] jwt::errors::Error),
}

/// Failure to produce a key for signing or verification.
#[derive(Debug, Error, PartialEq)]
pub enum KeyError {
    /// A JWK document could not be parsed.
    #[error("key cannot be parsed: {0}")]
    Parsing(String),

    /// The key chain carries no private key.
    #[error("key chain {0} has no private key")]
    MissingPrivateKey(String),

    /// Neither a key chain nor a key set URL is configured for the party.
    #[error("no key chain or key set URL configured for registration {0}")]
    NoKeySource(String),

    /// The remote key set could not be retrieved.
    #[error("key set {url} cannot be fetched: {reason}")]
    Fetch {
        /// Key set endpoint
        url: String,
        /// Underlying transport or decoding failure
        reason: String,
    },

    /// The key set does not contain the requested key id.
    #[error("key {kid} not found in key set {url}")]
    KeyNotFound {
        /// Key set endpoint
        url: String,
        /// Requested key id
        kid: String,
    },
}

/// Failure reported by a registration or nonce store.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{message}")]
pub struct RepositoryError {
    message: String,
}

impl RepositoryError {
    /// Creates a new [RepositoryError] carrying the store's message.
    pub fn new(message: impl Into<String>) -> Self {
        RepositoryError {
            message: message.into(),
        }
    }
}

/// The reason a launch validation attempt was rejected.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// A mandatory transport parameter is absent.
    #[error("Mandatory parameter {0} cannot be found")]
    MissingParameter(String),

    /// The raw token cannot be turned into a message payload.
    #[error("JWT payload cannot be constructed: {0}")]
    InvalidPayload(#[source] TokenError),

    /// A claim the payload cannot do without is absent.
    #[error("JWT {0} claim is missing")]
    MissingClaim(&'static str),

    /// No registration matches the (issuer, audience) pair.
    #[error("No matching registration found {0} side")]
    RegistrationNotFound(&'static str),

    /// The `exp` claim is in the past.
    #[error("JWT is expired")]
    TokenExpired,

    /// The `kid` header is absent.
    #[error("JWT kid header is missing")]
    MissingKeyId,

    /// The version claim differs from the protocol version.
    #[error("JWT version claim is invalid")]
    InvalidVersion,

    /// The message type claim is absent or empty.
    #[error("JWT id_token message_type claim is missing")]
    MissingMessageType,

    /// The message type is not handled by this validator role.
    #[error("JWT id_token message_type claim {0} is not supported")]
    UnsupportedMessageType(String),

    /// The verification key could not be resolved.
    #[error("JWT signature key cannot be resolved: {0}")]
    KeyResolution(#[source] KeyError),

    /// The signature does not match the resolved key.
    #[error("JWT signature validation failure")]
    SignatureFailure,

    /// The nonce was already used and its record has not expired.
    #[error("JWT nonce claim already used")]
    NonceReplayed,

    /// The deployment id is not known to the registration.
    #[error("JWT deployment_id claim not valid for this registration")]
    DeploymentNotFound,

    /// A message type specific claim is absent or malformed.
    #[error("JWT {0} claim is invalid")]
    InvalidMessageTypeClaim(&'static str),

    /// A collaborator store failed.
    #[error("{0}")]
    Repository(#[from] RepositoryError),
}

/// Failure to initiate an OIDC login.
#[derive(Debug, Error)]
pub enum OidcError {
    /// A mandatory login initiation parameter is absent.
    #[error("Mandatory parameter {0} cannot be found")]
    MissingParameter(&'static str),

    /// No registration matches the (issuer, client id) pair.
    #[error("Cannot find registration for OIDC request")]
    RegistrationNotFound,

    /// The supplied deployment id is not known to the registration.
    #[error("Cannot find deployment for OIDC request")]
    DeploymentNotFound,

    /// Any other failure, wrapping its cause.
    #[error("OIDC login initiation failed: {0}")]
    LoginInitiationFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The state token of the return leg cannot be trusted.
    #[error("OIDC state is invalid: {0}")]
    InvalidState(String),
}

impl OidcError {
    pub(crate) fn failed(cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        OidcError::LoginInitiationFailed(Box::new(cause))
    }
}
