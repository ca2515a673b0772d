//! OIDC third party login initiation.
//!
//! The [OidcLoginInitiator] answers a platform's login initiation request
//! with an [OidcAuthenticationRequest]: a redirect back to the platform
//! authentication endpoint carrying a fresh nonce and a signed state token.
//! The state token carries every initiation parameter, so the return leg can
//! recover the original request context without server side sessions.

use crate::config::{Clock, SecurityConfig};
use crate::error::{KeyError, OidcError};
use crate::message::{parse_form, SignedToken};
use crate::nonce::NonceGenerator;
use crate::registration::{Party, Registration, RegistrationRepository};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

/// An inbound login initiation request.
#[derive(Debug, Clone, PartialEq)]
pub struct OidcLoginRequest {
    issuer: String,
    client_id: String,
    login_hint: Option<String>,
    target_link_uri: Option<String>,
    deployment_id: Option<String>,
    message_hint: Option<String>,
    parameters: BTreeMap<String, String>,
}

impl OidcLoginRequest {
    /// Builds a request from already decoded parameters.
    ///
    /// Only `iss` and `client_id` are required here. `login_hint` and
    /// `target_link_uri` are required by [OidcLoginInitiator::initiate] once
    /// the registration and deployment are known. Every parameter, known or
    /// not, is kept for forwarding.
    pub fn from_parameters<K, V>(parameters: impl IntoIterator<Item = (K, V)>) -> Result<Self, OidcError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let parameters: BTreeMap<String, String> = parameters
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();

        let mandatory = |name: &'static str| {
            parameters
                .get(name)
                .filter(|value| !value.is_empty())
                .cloned()
                .ok_or(OidcError::MissingParameter(name))
        };
        let optional = |name: &str| parameters.get(name).filter(|value| !value.is_empty()).cloned();

        Ok(OidcLoginRequest {
            issuer: mandatory("iss")?,
            client_id: mandatory("client_id")?,
            login_hint: optional("login_hint"),
            target_link_uri: optional("target_link_uri"),
            deployment_id: optional("lti_deployment_id"),
            message_hint: optional("lti_message_hint"),
            parameters,
        })
    }

    /// Decodes an `application/x-www-form-urlencoded` query or body.
    pub fn from_query(query: &str) -> Result<Self, OidcError> {
        Self::from_parameters(parse_form(query))
    }

    /// `iss`
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// `client_id`
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// `login_hint`
    pub fn login_hint(&self) -> Option<&str> {
        self.login_hint.as_deref()
    }

    /// `target_link_uri`
    pub fn target_link_uri(&self) -> Option<&str> {
        self.target_link_uri.as_deref()
    }

    /// `lti_deployment_id`
    pub fn deployment_id(&self) -> Option<&str> {
        self.deployment_id.as_deref()
    }

    /// `lti_message_hint`
    pub fn message_hint(&self) -> Option<&str> {
        self.message_hint.as_deref()
    }

    /// Every received parameter.
    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }
}

/// The redirect answering a login initiation.
#[derive(Debug, Clone, PartialEq)]
pub struct OidcAuthenticationRequest {
    url: String,
    redirect_uri: String,
    client_id: String,
    login_hint: String,
    nonce: String,
    state: String,
    lti_message_hint: Option<String>,
}

impl OidcAuthenticationRequest {
    /// Platform OIDC authentication endpoint.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// `redirect_uri`
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// `client_id`
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// `login_hint`
    pub fn login_hint(&self) -> &str {
        &self.login_hint
    }

    /// `nonce`
    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    /// `state`, the signed state token
    pub fn state(&self) -> &str {
        &self.state
    }

    /// `lti_message_hint`
    pub fn lti_message_hint(&self) -> Option<&str> {
        self.lti_message_hint.as_deref()
    }

    /// Every redirect parameter, in emission order.
    pub fn parameters(&self) -> Vec<(&'static str, &str)> {
        let mut parameters = vec![
            ("scope", "openid"),
            ("response_type", "id_token"),
            ("response_mode", "form_post"),
            ("prompt", "none"),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.client_id.as_str()),
            ("login_hint", self.login_hint.as_str()),
            ("nonce", self.nonce.as_str()),
            ("state", self.state.as_str()),
        ];
        if let Some(hint) = &self.lti_message_hint {
            parameters.push(("lti_message_hint", hint.as_str()));
        }
        parameters
    }

    /// The full redirect URL.
    pub fn to_url(&self) -> Result<Url, OidcError> {
        let mut url = Url::parse(&self.url).map_err(OidcError::failed)?;
        url.query_pairs_mut().extend_pairs(self.parameters());
        Ok(url)
    }
}

/// Claims of the signed state token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OidcState {
    /// Registration identifier
    pub sub: String,
    /// Tool audience
    pub iss: String,
    /// Platform audience
    pub aud: String,
    /// The nonce sent alongside the state
    pub nonce: String,
    /// Issued at, seconds since epoch
    pub iat: i64,
    /// Expiry, seconds since epoch
    pub exp: i64,
    /// Every login initiation parameter
    pub parameters: BTreeMap<String, String>,
}

impl OidcState {
    /// Verifies a state token returned by the platform and recovers its
    /// claims. The token must be signed by the tool key chain of
    /// `registration`, bound to it and not expired at `now`.
    pub fn verify(raw: &str, registration: &Registration, now: DateTime<Utc>) -> Result<Self, OidcError> {
        let invalid = |reason: &str| OidcError::InvalidState(reason.to_owned());

        let token = SignedToken::parse(raw).map_err(|e| OidcError::InvalidState(e.to_string()))?;
        let key_chain = registration
            .key_chain(Party::Tool)
            .ok_or_else(|| invalid("no tool key chain"))?;

        if !token.verify(key_chain.public_key()) {
            return Err(invalid("signature mismatch"));
        }
        if token.is_expired(now) {
            return Err(invalid("expired"));
        }

        let state: OidcState = serde_json::from_value(token.claims().clone().into())
            .map_err(|e| OidcError::InvalidState(e.to_string()))?;

        if state.sub != registration.identifier()
            || state.iss != registration.tool().audience
            || state.aud != registration.platform().audience
        {
            return Err(invalid("issued for another registration"));
        }

        Ok(state)
    }
}

/// Turns login initiation requests into signed authentication requests.
pub struct OidcLoginInitiator {
    registrations: Arc<dyn RegistrationRepository>,
    generator: Arc<dyn NonceGenerator>,
    clock: Arc<dyn Clock>,
    config: SecurityConfig,
}

impl OidcLoginInitiator {
    /// Creates an initiator.
    pub fn new(
        registrations: Arc<dyn RegistrationRepository>,
        generator: Arc<dyn NonceGenerator>,
        clock: Arc<dyn Clock>,
        config: SecurityConfig,
    ) -> Self {
        OidcLoginInitiator {
            registrations,
            generator,
            clock,
            config,
        }
    }

    /// Parses `query` and initiates the login it describes.
    pub fn initiate_query(&self, query: &str) -> Result<OidcAuthenticationRequest, OidcError> {
        self.initiate(&OidcLoginRequest::from_query(query)?)
    }

    /// Initiates the login described by `request`.
    ///
    /// The registration, then the deployment, then the `login_hint` and
    /// `target_link_uri` parameters are checked, in that order. Unknown
    /// registrations and deployments and missing parameters are reported as
    /// such; any other failure is wrapped in [OidcError::LoginInitiationFailed].
    pub fn initiate(&self, request: &OidcLoginRequest) -> Result<OidcAuthenticationRequest, OidcError> {
        let result = self.build(request);

        match &result {
            Ok(auth) => info!(
                issuer = request.issuer(),
                client_id = request.client_id(),
                nonce = auth.nonce(),
                "OIDC login initiated"
            ),
            Err(error) => warn!(
                issuer = request.issuer(),
                client_id = request.client_id(),
                reason = %error,
                "OIDC login initiation rejected"
            ),
        }

        result
    }

    fn build(&self, request: &OidcLoginRequest) -> Result<OidcAuthenticationRequest, OidcError> {
        let registration = self
            .registrations
            .find_by_platform_issuer(request.issuer(), request.client_id())
            .map_err(OidcError::failed)?
            .ok_or(OidcError::RegistrationNotFound)?;

        if let Some(deployment_id) = request.deployment_id() {
            if !registration.has_deployment_id(deployment_id) {
                return Err(OidcError::DeploymentNotFound);
            }
        }

        let login_hint = request
            .login_hint()
            .ok_or(OidcError::MissingParameter("login_hint"))?;
        let target_link_uri = request
            .target_link_uri()
            .ok_or(OidcError::MissingParameter("target_link_uri"))?;

        let nonce = self.generator.generate();
        let now = self.clock.now();

        let state = OidcState {
            sub: registration.identifier().to_owned(),
            iss: registration.tool().audience.clone(),
            aud: registration.platform().audience.clone(),
            nonce: nonce.value().to_owned(),
            iat: now.timestamp(),
            exp: (now + self.config.state_lifetime()).timestamp(),
            parameters: request.parameters().clone(),
        };

        let key_chain = registration
            .key_chain(Party::Tool)
            .ok_or_else(|| OidcError::failed(KeyError::NoKeySource(registration.identifier().to_owned())))?;
        let token = SignedToken::sign(&state, key_chain).map_err(OidcError::failed)?;

        Ok(OidcAuthenticationRequest {
            url: registration.platform().oidc_authentication_url.clone(),
            redirect_uri: target_link_uri.to_owned(),
            client_id: registration.client_id().to_owned(),
            login_hint: login_hint.to_owned(),
            nonce: nonce.value().to_owned(),
            state: token.to_string(),
            lti_message_hint: request.message_hint().map(str::to_owned),
        })
    }
}
