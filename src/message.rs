//! Signed tokens and the claim level view of LTI messages.

use crate::error::{LaunchError, TokenError};
use crate::key::KeyChain;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use jsonwebkey as jwk;
use jsonwebtoken as jwt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Protocol version carried by every LTI 1.3 message.
pub const LTI_VERSION: &str = "1.3.0";

/// Claim names of the LTI vocabulary. Matching is case sensitive.
pub mod claim {
    /// Issuer
    pub const ISS: &str = "iss";
    /// Audience
    pub const AUD: &str = "aud";
    /// Subject
    pub const SUB: &str = "sub";
    /// Expiration time
    pub const EXP: &str = "exp";
    /// Issued at
    pub const IAT: &str = "iat";
    /// Nonce
    pub const NONCE: &str = "nonce";
    /// Forwarded OIDC login parameters, carried by state tokens
    pub const PARAMETERS: &str = "parameters";

    /// LTI version
    pub const VERSION: &str = "https://purl.imsglobal.org/spec/lti/claim/version";
    /// LTI message type
    pub const MESSAGE_TYPE: &str = "https://purl.imsglobal.org/spec/lti/claim/message_type";
    /// Deployment id
    pub const DEPLOYMENT_ID: &str = "https://purl.imsglobal.org/spec/lti/claim/deployment_id";
    /// Target link URI
    pub const TARGET_LINK_URI: &str = "https://purl.imsglobal.org/spec/lti/claim/target_link_uri";
    /// Resource link
    pub const RESOURCE_LINK: &str = "https://purl.imsglobal.org/spec/lti/claim/resource_link";

    /// Deep linking settings
    pub const DEEP_LINKING_SETTINGS: &str =
        "https://purl.imsglobal.org/spec/lti-dl/claim/deep_linking_settings";
    /// Deep linking returned content items
    pub const CONTENT_ITEMS: &str = "https://purl.imsglobal.org/spec/lti-dl/claim/content_items";

    /// Proctoring session data
    pub const PROCTORING_SESSION_DATA: &str =
        "https://purl.imsglobal.org/spec/lti-ap/claim/session_data";
    /// Proctoring attempt number
    pub const PROCTORING_ATTEMPT_NUMBER: &str =
        "https://purl.imsglobal.org/spec/lti-ap/claim/attempt_number";
    /// Proctoring start assessment URL
    pub const PROCTORING_START_ASSESSMENT_URL: &str =
        "https://purl.imsglobal.org/spec/lti-ap/claim/start_assessment_url";
}

/// A compact signed token, with its header and unverified claims decoded.
#[derive(Debug, Clone)]
pub struct SignedToken {
    raw: String,
    header: jwt::Header,
    claims: Map<String, Value>,
}

impl SignedToken {
    /// Decodes `raw` without verifying its signature.
    pub fn parse(raw: &str) -> Result<Self, TokenError> {
        let mut segments = raw.split('.');
        let (Some(_), Some(encoded_claims), Some(_), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(TokenError::Malformed);
        };

        let header = jwt::decode_header(raw).map_err(TokenError::Header)?;

        let decoded = URL_SAFE_NO_PAD
            .decode(encoded_claims.trim_end_matches('='))
            .map_err(|e| TokenError::Claims(e.to_string()))?;
        let claims = serde_json::from_slice::<Map<String, Value>>(&decoded)
            .map_err(|e| TokenError::Claims(e.to_string()))?;

        Ok(SignedToken {
            raw: raw.to_owned(),
            header,
            claims,
        })
    }

    /// Signs `claims` with the private key of `key_chain`. The token `kid`
    /// header is the key chain identifier.
    pub fn sign<T: Serialize>(claims: &T, key_chain: &KeyChain) -> Result<Self, TokenError> {
        let mut header = jwt::Header::new(key_chain.algorithm());
        header.kid = Some(key_chain.identifier().to_owned());

        let raw = jwt::encode(&header, claims, &key_chain.encoding_key()?)
            .map_err(TokenError::Signing)?;

        Self::parse(&raw)
    }

    /// The compact serialization.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Decoded header.
    pub fn header(&self) -> &jwt::Header {
        &self.header
    }

    /// The `kid` header, if present.
    pub fn key_id(&self) -> Option<&str> {
        self.header.kid.as_deref()
    }

    /// Unverified claims.
    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// Whether the `exp` claim lies before `now`. Tokens without `exp` never
    /// expire; an `exp` that is not a NumericDate counts as expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.claims.get(claim::EXP) {
            None => false,
            Some(exp) => match exp.as_f64() {
                Some(exp) => exp < now.timestamp() as f64,
                None => true,
            },
        }
    }

    /// Checks the signature against `key`, using the header algorithm.
    /// Only the signature is judged; claim checks are left to the caller.
    pub fn verify(&self, key: &jwk::JsonWebKey) -> bool {
        let mut validation = jwt::Validation::new(self.header.alg);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_nbf = false;

        jwt::decode::<Value>(&self.raw, &key.key.to_decoding_key(), &validation).is_ok()
    }
}

impl fmt::Display for SignedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// LTI message types this crate knows how to validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Platform to tool resource launch
    ResourceLinkRequest,
    /// Platform to tool content selection launch
    DeepLinkingRequest,
    /// Tool to platform content selection result
    DeepLinkingResponse,
    /// Platform to proctoring tool launch
    StartProctoring,
    /// Proctoring tool to platform assessment start
    StartAssessment,
}

impl MessageType {
    /// The message type literal used in the `message_type` claim.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::ResourceLinkRequest => "LtiResourceLinkRequest",
            MessageType::DeepLinkingRequest => "LtiDeepLinkingRequest",
            MessageType::DeepLinkingResponse => "LtiDeepLinkingResponse",
            MessageType::StartProctoring => "LtiStartProctoring",
            MessageType::StartAssessment => "LtiStartAssessment",
        }
    }

    /// Maps a `message_type` claim value, case sensitively.
    pub fn from_claim(value: &str) -> Option<Self> {
        [
            MessageType::ResourceLinkRequest,
            MessageType::DeepLinkingRequest,
            MessageType::DeepLinkingResponse,
            MessageType::StartProctoring,
            MessageType::StartAssessment,
        ]
        .into_iter()
        .find(|message_type| message_type.as_str() == value)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `resource_link` claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLinkClaim {
    /// Opaque resource link id
    pub id: String,
    /// Title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The `deep_linking_settings` claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeepLinkingSettingsClaim {
    /// Where the tool posts its deep linking response
    pub deep_link_return_url: String,
    /// Accepted content item types
    #[serde(default)]
    pub accept_types: Vec<String>,
    /// Accepted presentation targets
    #[serde(default)]
    pub accept_presentation_document_targets: Vec<String>,
    /// Opaque value to echo back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

/// Claim level view of an inbound LTI message.
#[derive(Debug, Clone)]
pub struct LtiMessagePayload {
    token: SignedToken,
    issuer: String,
    audience: String,
}

impl LtiMessagePayload {
    /// Builds the payload of `raw`. Fails when the token cannot be decoded
    /// or lacks `iss` or `aud`.
    pub fn parse(raw: &str) -> Result<Self, LaunchError> {
        let token = SignedToken::parse(raw).map_err(LaunchError::InvalidPayload)?;

        let issuer = token
            .claims()
            .get(claim::ISS)
            .and_then(Value::as_str)
            .ok_or(LaunchError::MissingClaim(claim::ISS))?
            .to_owned();

        // `aud` may be a single string or an array, the first entry wins
        let audience = match token.claims().get(claim::AUD) {
            Some(Value::String(aud)) => Some(aud.clone()),
            Some(Value::Array(auds)) => auds.first().and_then(Value::as_str).map(str::to_owned),
            _ => None,
        }
        .ok_or(LaunchError::MissingClaim(claim::AUD))?;

        Ok(LtiMessagePayload {
            token,
            issuer,
            audience,
        })
    }

    /// The underlying token.
    pub fn token(&self) -> &SignedToken {
        &self.token
    }

    /// Any claim by name.
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.token.claims().get(name)
    }

    fn str_claim(&self, name: &str) -> Option<&str> {
        self.claim(name).and_then(Value::as_str)
    }

    fn typed_claim<T: serde::de::DeserializeOwned>(&self, name: &str) -> Option<T> {
        self.claim(name)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// `iss`
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// `aud`, or its first entry
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// `nonce`
    pub fn nonce(&self) -> Option<&str> {
        self.str_claim(claim::NONCE)
    }

    /// LTI version claim.
    pub fn version(&self) -> Option<&str> {
        self.str_claim(claim::VERSION)
    }

    /// Raw message type claim, empty when absent.
    pub fn message_type_claim(&self) -> &str {
        self.str_claim(claim::MESSAGE_TYPE).unwrap_or_default()
    }

    /// Message type, if it is a known one.
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_claim(self.message_type_claim())
    }

    /// Deployment id claim, empty when absent.
    pub fn deployment_id(&self) -> &str {
        self.str_claim(claim::DEPLOYMENT_ID).unwrap_or_default()
    }

    /// Target link URI claim.
    pub fn target_link_uri(&self) -> Option<&str> {
        self.str_claim(claim::TARGET_LINK_URI)
    }

    /// Resource link claim, if present and well formed.
    pub fn resource_link(&self) -> Option<ResourceLinkClaim> {
        self.typed_claim(claim::RESOURCE_LINK)
    }

    /// Deep linking settings claim, if present and well formed.
    pub fn deep_linking_settings(&self) -> Option<DeepLinkingSettingsClaim> {
        self.typed_claim(claim::DEEP_LINKING_SETTINGS)
    }

    /// Content items claim, if present and an array.
    pub fn content_items(&self) -> Option<&[Value]> {
        self.claim(claim::CONTENT_ITEMS)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
    }

    /// Proctoring session data, if a non empty string.
    pub fn proctoring_session_data(&self) -> Option<&str> {
        self.str_claim(claim::PROCTORING_SESSION_DATA)
            .filter(|data| !data.is_empty())
    }

    /// Proctoring attempt number, if a positive integer.
    pub fn proctoring_attempt_number(&self) -> Option<u64> {
        self.claim(claim::PROCTORING_ATTEMPT_NUMBER)
            .and_then(Value::as_u64)
            .filter(|attempt| *attempt > 0)
    }

    /// Proctoring start assessment URL.
    pub fn proctoring_start_assessment_url(&self) -> Option<&str> {
        self.str_claim(claim::PROCTORING_START_ASSESSMENT_URL)
            .filter(|url| !url.is_empty())
    }
}

/// The transport level parameters of an inbound launch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaunchMessage {
    parameters: BTreeMap<String, String>,
}

impl LaunchMessage {
    /// Name of the parameter carrying the signed message.
    pub const JWT_PARAMETER: &'static str = "JWT";

    /// Collects already decoded parameters.
    pub fn from_parameters<K, V>(parameters: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        LaunchMessage {
            parameters: parameters
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Decodes an `application/x-www-form-urlencoded` query or body.
    pub fn from_query(query: &str) -> Self {
        LaunchMessage {
            parameters: parse_form(query),
        }
    }

    /// Every parameter.
    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    /// A parameter, if present.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// A parameter that must be present and non empty.
    pub fn mandatory_parameter(&self, name: &str) -> Result<&str, LaunchError> {
        self.parameter(name)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| LaunchError::MissingParameter(name.to_owned()))
    }
}

pub(crate) fn parse_form(query: &str) -> BTreeMap<String, String> {
    url::form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
        .into_owned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{tool_key_chain, PUB_JWK};
    use serde_json::json;

    #[test]
    fn sign_and_parse() {
        let chain = tool_key_chain();
        let token = SignedToken::sign(&json!({ "iss": "me", "nonce": "n" }), &chain).unwrap();

        assert_eq!(token.key_id(), Some("toolKeyChain"));
        assert_eq!(token.header().alg, jwt::Algorithm::RS256);
        assert_eq!(token.claims().get("iss"), Some(&json!("me")));
        assert!(token.verify(chain.public_key()));

        let reparsed = SignedToken::parse(token.as_str()).unwrap();
        assert_eq!(reparsed.to_string(), token.to_string());
    }

    #[test]
    fn reject_bad_signature() {
        let chain = tool_key_chain();
        let token = SignedToken::sign(&json!({ "iss": "me" }), &chain).unwrap();

        // same header and signature over different claims
        let mut parts: Vec<&str> = token.as_str().split('.').collect();
        let forged_claims = URL_SAFE_NO_PAD.encode(br#"{"iss":"someone else"}"#);
        parts[1] = &forged_claims;
        let forged = SignedToken::parse(&parts.join(".")).unwrap();

        assert!(!forged.verify(chain.public_key()));
    }

    #[test]
    fn reject_symmetric_key_for_rsa_token() {
        let token = SignedToken::sign(&json!({}), &tool_key_chain()).unwrap();
        let other: jwk::JsonWebKey = r#"{"kty":"oct","k":"c2VjcmV0"}"#.parse().unwrap();

        assert!(!token.verify(&other));
        let public: jwk::JsonWebKey = PUB_JWK.parse().unwrap();
        assert!(token.verify(&public));
    }

    #[test]
    fn reject_malformed_tokens() {
        assert!(matches!(SignedToken::parse("invalid"), Err(TokenError::Malformed)));
        assert!(matches!(SignedToken::parse("a.b.c.d"), Err(TokenError::Malformed)));
        assert!(matches!(SignedToken::parse("a.b.c"), Err(TokenError::Header(_))));
    }

    #[test]
    fn expiry() {
        let chain = tool_key_chain();
        let now = Utc::now();
        let live = SignedToken::sign(&json!({ "exp": now.timestamp() + 10 }), &chain).unwrap();
        let dead = SignedToken::sign(&json!({ "exp": now.timestamp() - 10 }), &chain).unwrap();
        let eternal = SignedToken::sign(&json!({}), &chain).unwrap();

        assert!(!live.is_expired(now));
        assert!(dead.is_expired(now));
        assert!(!eternal.is_expired(now));
    }

    #[test]
    fn expiry_of_non_integer_exp() {
        let chain = tool_key_chain();
        let now = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let fractional = SignedToken::sign(&json!({ "exp": 1_600_000_000.5 }), &chain).unwrap();
        let fractional_live = SignedToken::sign(&json!({ "exp": 1_700_000_000.5 }), &chain).unwrap();
        let text = SignedToken::sign(&json!({ "exp": "2100000000" }), &chain).unwrap();
        let null = SignedToken::sign(&json!({ "exp": null }), &chain).unwrap();

        assert!(fractional.is_expired(now));
        assert!(!fractional_live.is_expired(now));
        assert!(text.is_expired(now));
        assert!(null.is_expired(now));
    }

    #[test]
    fn payload_claims() {
        let token = SignedToken::sign(
            &json!({
                "iss": "toolAudience",
                "aud": ["platformAudience", "other"],
                "nonce": "value",
                claim::VERSION: LTI_VERSION,
                claim::MESSAGE_TYPE: "LtiStartAssessment",
                claim::DEPLOYMENT_ID: "deploymentIdentifier",
                claim::RESOURCE_LINK: { "id": "link", "title": "Exam" },
                claim::PROCTORING_SESSION_DATA: "session",
                claim::PROCTORING_ATTEMPT_NUMBER: 1,
            }),
            &tool_key_chain(),
        )
        .unwrap();

        let payload = LtiMessagePayload::parse(token.as_str()).unwrap();

        assert_eq!(payload.issuer(), "toolAudience");
        assert_eq!(payload.audience(), "platformAudience");
        assert_eq!(payload.nonce(), Some("value"));
        assert_eq!(payload.version(), Some("1.3.0"));
        assert_eq!(payload.message_type(), Some(MessageType::StartAssessment));
        assert_eq!(payload.deployment_id(), "deploymentIdentifier");
        assert_eq!(payload.resource_link().map(|link| link.id), Some("link".to_owned()));
        assert_eq!(payload.proctoring_session_data(), Some("session"));
        assert_eq!(payload.proctoring_attempt_number(), Some(1));
        assert_eq!(payload.deep_linking_settings(), None);
    }

    #[test]
    fn payload_requires_issuer_and_audience() {
        let chain = tool_key_chain();
        let no_iss = SignedToken::sign(&json!({ "aud": "a" }), &chain).unwrap();
        let no_aud = SignedToken::sign(&json!({ "iss": "i" }), &chain).unwrap();

        assert!(matches!(
            LtiMessagePayload::parse(no_iss.as_str()),
            Err(LaunchError::MissingClaim("iss"))
        ));
        assert!(matches!(
            LtiMessagePayload::parse(no_aud.as_str()),
            Err(LaunchError::MissingClaim("aud"))
        ));
    }

    #[test]
    fn message_type_literals() {
        assert_eq!(
            MessageType::from_claim("LtiDeepLinkingResponse"),
            Some(MessageType::DeepLinkingResponse)
        );
        assert_eq!(MessageType::from_claim("ltideeplinkingresponse"), None);
        assert_eq!(MessageType::StartProctoring.to_string(), "LtiStartProctoring");
    }

    #[test]
    fn launch_message_parameters() {
        let message = LaunchMessage::from_query("?JWT=a.b.c&other=x%20y");
        assert_eq!(message.mandatory_parameter("JWT").unwrap(), "a.b.c");
        assert_eq!(message.parameter("other"), Some("x y"));

        let empty = LaunchMessage::from_parameters([("JWT", "")]);
        assert_eq!(
            empty.mandatory_parameter("JWT").unwrap_err().to_string(),
            "Mandatory parameter JWT cannot be found"
        );
    }
}
