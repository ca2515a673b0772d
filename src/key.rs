//! Key chains, key sets and resolution of verification keys.

use crate::error::KeyError;
use crate::registration::{Party, Registration};
use jsonwebkey as jwk;
use jsonwebtoken as jwt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// A named public key with its optional private counterpart.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyChain {
    identifier: String,
    key_set_name: String,
    public_key: jwk::JsonWebKey,
    private_key: Option<jwk::JsonWebKey>,
    algorithm: jwt::Algorithm,
}

impl KeyChain {
    /// Creates a key chain from already parsed keys. The signing algorithm is
    /// derived from the key type: RS256 for RSA, ES256 for EC, HS256 for
    /// symmetric keys.
    pub fn new(
        identifier: impl Into<String>,
        key_set_name: impl Into<String>,
        public_key: jwk::JsonWebKey,
        private_key: Option<jwk::JsonWebKey>,
    ) -> Result<Self, KeyError> {
        let identifier = identifier.into();

        if let Some(private_key) = &private_key {
            if !private_key.key.is_private() {
                return Err(KeyError::Parsing(format!(
                    "private key of key chain {identifier} holds no private material"
                )));
            }
        }

        let algorithm = match *public_key.key {
            jwk::Key::EC { .. } => jwt::Algorithm::ES256,
            jwk::Key::RSA { .. } => jwt::Algorithm::RS256,
            jwk::Key::Symmetric { .. } => jwt::Algorithm::HS256,
        };

        Ok(KeyChain {
            identifier,
            key_set_name: key_set_name.into(),
            public_key,
            private_key,
            algorithm,
        })
    }

    /// Creates a key chain from JWK JSON documents.
    pub fn from_jwk(
        identifier: impl Into<String>,
        key_set_name: impl Into<String>,
        public_jwk: &str,
        private_jwk: Option<&str>,
    ) -> Result<Self, KeyError> {
        let public_key = parse_jwk(public_jwk)?;
        let private_key = private_jwk.map(parse_jwk).transpose()?;

        Self::new(identifier, key_set_name, public_key, private_key)
    }

    /// Overrides the algorithm used when signing with this chain.
    pub fn with_algorithm(mut self, algorithm: jwt::Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Key chain identifier, used as `kid` of tokens it signs.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Name of the key set this chain is published in.
    pub fn key_set_name(&self) -> &str {
        &self.key_set_name
    }

    /// The public key.
    pub fn public_key(&self) -> &jwk::JsonWebKey {
        &self.public_key
    }

    /// The private key, if held.
    pub fn private_key(&self) -> Option<&jwk::JsonWebKey> {
        self.private_key.as_ref()
    }

    /// Signing algorithm.
    pub fn algorithm(&self) -> jwt::Algorithm {
        self.algorithm
    }

    pub(crate) fn encoding_key(&self) -> Result<jwt::EncodingKey, KeyError> {
        self.private_key
            .as_ref()
            .map(|key| key.key.to_encoding_key())
            .ok_or_else(|| KeyError::MissingPrivateKey(self.identifier.clone()))
    }
}

fn parse_jwk(raw: &str) -> Result<jwk::JsonWebKey, KeyError> {
    raw.parse::<jwk::JsonWebKey>()
        .map_err(|e| KeyError::Parsing(e.to_string()))
}

/// A JSON Web Key Set document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeySet {
    /// Published keys
    pub keys: Vec<jwk::JsonWebKey>,
}

impl KeySet {
    /// Publishes the public keys of `key_chains`, each under its chain
    /// identifier as `kid`.
    pub fn from_key_chains<'a>(key_chains: impl IntoIterator<Item = &'a KeyChain>) -> Self {
        let keys = key_chains
            .into_iter()
            .map(|chain| {
                let mut key = chain.public_key.clone();
                key.key_id = Some(chain.identifier.clone());
                key
            })
            .collect();

        KeySet { keys }
    }

    /// Finds the key published under `kid`.
    pub fn find(&self, kid: &str) -> Option<&jwk::JsonWebKey> {
        self.keys.iter().find(|key| key.key_id.as_deref() == Some(kid))
    }
}

/// Retrieves a single key from a remote key set endpoint.
///
/// Implementations must fail with [KeyError::Fetch] on transport errors and
/// [KeyError::KeyNotFound] when the set lacks the key id. No retries are
/// expected; callers layer their own policy on top.
pub trait KeyFetcher: Send + Sync {
    /// Fetches the key `key_id` from the key set at `jwks_url`.
    fn fetch_key(&self, jwks_url: &str, key_id: &str) -> Result<jwk::JsonWebKey, KeyError>;
}

/// Produces the key that verifies messages signed by one party of a
/// registration.
#[derive(Clone)]
pub struct KeyResolver {
    fetcher: Arc<dyn KeyFetcher>,
}

impl KeyResolver {
    /// Creates a resolver falling back to `fetcher` for remote key sets.
    pub fn new(fetcher: Arc<dyn KeyFetcher>) -> Self {
        KeyResolver { fetcher }
    }

    /// Resolves the public key of `signer`.
    ///
    /// A locally configured key chain wins and `key_id` is ignored for it;
    /// otherwise the key is fetched from the signer's key set URL.
    pub fn resolve(
        &self,
        registration: &Registration,
        signer: Party,
        key_id: &str,
    ) -> Result<jwk::JsonWebKey, KeyError> {
        if let Some(chain) = registration.key_chain(signer) {
            debug!(
                registration = registration.identifier(),
                key_chain = chain.identifier(),
                "Using locally configured key chain"
            );
            return Ok(chain.public_key().clone());
        }

        let url = registration
            .jwks_url(signer)
            .ok_or_else(|| KeyError::NoKeySource(registration.identifier().to_owned()))?;

        debug!(registration = registration.identifier(), jwks_url = url, kid = key_id, "Fetching key");
        self.fetcher.fetch_key(url, key_id)
    }
}

#[cfg(feature = "http")]
pub use http::HttpKeyFetcher;

#[cfg(feature = "http")]
mod http {
    use super::{KeyFetcher, KeySet};
    use crate::error::KeyError;
    use jsonwebkey as jwk;
    use std::time::Duration;
    use tracing::{info, warn};

    /// [KeyFetcher] downloading key sets over HTTP(S).
    ///
    /// Every request is bounded by the timeout given at construction and is
    /// attempted exactly once.
    #[derive(Debug, Clone)]
    pub struct HttpKeyFetcher {
        client: reqwest::blocking::Client,
    }

    impl HttpKeyFetcher {
        /// Creates a fetcher whose requests give up after `timeout`.
        pub fn new(timeout: Duration) -> Result<Self, KeyError> {
            let client = reqwest::blocking::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| KeyError::Fetch {
                    url: String::new(),
                    reason: e.to_string(),
                })?;

            Ok(HttpKeyFetcher { client })
        }
    }

    impl KeyFetcher for HttpKeyFetcher {
        fn fetch_key(&self, jwks_url: &str, key_id: &str) -> Result<jwk::JsonWebKey, KeyError> {
            info!(jwks_url, "Fetching key set");

            let fetch_error = |e: reqwest::Error| {
                warn!(jwks_url, error = %e, "Key set fetch failed");
                KeyError::Fetch {
                    url: jwks_url.to_owned(),
                    reason: e.to_string(),
                }
            };

            let key_set: KeySet = self
                .client
                .get(jwks_url)
                .send()
                .and_then(|response| response.error_for_status())
                .map_err(fetch_error)?
                .json()
                .map_err(fetch_error)?;

            key_set.find(key_id).cloned().ok_or_else(|| KeyError::KeyNotFound {
                url: jwks_url.to_owned(),
                kid: key_id.to_owned(),
            })
        }
    }
}
