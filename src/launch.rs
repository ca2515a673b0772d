//! Validation of inbound signed launch messages.
//!
//! A [LaunchValidator] runs an ordered list of checks over the payload of one
//! message. The first failing check ends the attempt; every passing check
//! leaves a human readable annotation in the [LaunchValidationResult], so a
//! rejected result still shows how far the message got.
//!
//! Cheap structural checks run before signature verification, and nothing
//! with side effects (the nonce bookkeeping) runs before the signature is
//! known to be good.

use crate::config::{Clock, SecurityConfig};
use crate::error::LaunchError;
use crate::key::{KeyFetcher, KeyResolver};
use crate::message::{LaunchMessage, LtiMessagePayload, MessageType, LTI_VERSION};
use crate::nonce::{Nonce, NonceClaim, NonceRepository};
use crate::registration::{Party, Registration, RegistrationRepository};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one validation attempt.
#[derive(Debug)]
pub struct LaunchValidationResult {
    registration: Option<Registration>,
    payload: Option<LtiMessagePayload>,
    successes: Vec<String>,
    error: Option<LaunchError>,
}

impl LaunchValidationResult {
    fn success(registration: Registration, payload: LtiMessagePayload, successes: Vec<String>) -> Self {
        LaunchValidationResult {
            registration: Some(registration),
            payload: Some(payload),
            successes,
            error: None,
        }
    }

    fn failure(successes: Vec<String>, error: LaunchError) -> Self {
        LaunchValidationResult {
            registration: None,
            payload: None,
            successes,
            error: Some(error),
        }
    }

    /// The registration the message was validated against. `None` on failure.
    pub fn registration(&self) -> Option<&Registration> {
        self.registration.as_ref()
    }

    /// The validated payload. `None` on failure.
    pub fn payload(&self) -> Option<&LtiMessagePayload> {
        self.payload.as_ref()
    }

    /// Annotations of every passed check, in order.
    pub fn successes(&self) -> &[String] {
        &self.successes
    }

    /// Whether validation failed.
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// The failure reason.
    pub fn error(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    /// The typed failure.
    pub fn failure_kind(&self) -> Option<&LaunchError> {
        self.error.as_ref()
    }
}

/// Everything a single check may look at.
struct CheckContext<'a> {
    validator: &'a LaunchValidator,
    registration: &'a Registration,
    payload: &'a LtiMessagePayload,
}

/// A check either yields its success annotation or ends the validation.
type Check = fn(&CheckContext<'_>) -> Result<&'static str, LaunchError>;

/// Checks shared by every message type, in execution order.
const GENERIC_CHECKS: &[Check] = &[
    check_expiry,
    check_key_id,
    check_version,
    check_message_type,
    check_signature,
    check_nonce,
    check_deployment_id,
];

const RESOURCE_LINK_REQUEST_CHECKS: &[Check] = &[check_resource_link];

const DEEP_LINKING_REQUEST_CHECKS: &[Check] = &[check_deep_linking_settings];

const DEEP_LINKING_RESPONSE_CHECKS: &[Check] = &[check_content_items];

const START_PROCTORING_CHECKS: &[Check] = &[
    check_proctoring_start_assessment_url,
    check_proctoring_session_data,
    check_proctoring_attempt_number,
    check_resource_link,
];

const START_ASSESSMENT_CHECKS: &[Check] = &[
    check_proctoring_session_data,
    check_proctoring_attempt_number,
    check_resource_link,
];

fn message_type_checks(message_type: MessageType) -> &'static [Check] {
    match message_type {
        MessageType::ResourceLinkRequest => RESOURCE_LINK_REQUEST_CHECKS,
        MessageType::DeepLinkingRequest => DEEP_LINKING_REQUEST_CHECKS,
        MessageType::DeepLinkingResponse => DEEP_LINKING_RESPONSE_CHECKS,
        MessageType::StartProctoring => START_PROCTORING_CHECKS,
        MessageType::StartAssessment => START_ASSESSMENT_CHECKS,
    }
}

/// Validates messages received by one side of a registration.
///
/// The platform side accepts tool originating messages (deep linking
/// responses and proctoring assessment starts) verified with the tool keys;
/// the tool side accepts platform originating launches verified with the
/// platform keys.
pub struct LaunchValidator {
    side: Party,
    registrations: Arc<dyn RegistrationRepository>,
    nonces: Arc<dyn NonceRepository>,
    resolver: KeyResolver,
    clock: Arc<dyn Clock>,
    config: SecurityConfig,
}

impl LaunchValidator {
    /// Validator for messages the platform receives from tools.
    ///
    /// Tool originating messages are addressed to the platform and issued by
    /// the tool as its client id, so the registration is looked up by
    /// (`aud` = platform audience, `iss` = client id).
    pub fn platform(
        registrations: Arc<dyn RegistrationRepository>,
        nonces: Arc<dyn NonceRepository>,
        fetcher: Arc<dyn KeyFetcher>,
        clock: Arc<dyn Clock>,
        config: SecurityConfig,
    ) -> Self {
        Self::new(Party::Platform, registrations, nonces, fetcher, clock, config)
    }

    /// Validator for launches the tool receives from platforms.
    pub fn tool(
        registrations: Arc<dyn RegistrationRepository>,
        nonces: Arc<dyn NonceRepository>,
        fetcher: Arc<dyn KeyFetcher>,
        clock: Arc<dyn Clock>,
        config: SecurityConfig,
    ) -> Self {
        Self::new(Party::Tool, registrations, nonces, fetcher, clock, config)
    }

    fn new(
        side: Party,
        registrations: Arc<dyn RegistrationRepository>,
        nonces: Arc<dyn NonceRepository>,
        fetcher: Arc<dyn KeyFetcher>,
        clock: Arc<dyn Clock>,
        config: SecurityConfig,
    ) -> Self {
        LaunchValidator {
            side,
            registrations,
            nonces,
            resolver: KeyResolver::new(fetcher),
            clock,
            config,
        }
    }

    /// Message types this validator accepts.
    pub fn supported_message_types(&self) -> &'static [MessageType] {
        match self.side {
            Party::Platform => &[MessageType::DeepLinkingResponse, MessageType::StartAssessment],
            Party::Tool => &[
                MessageType::ResourceLinkRequest,
                MessageType::DeepLinkingRequest,
                MessageType::StartProctoring,
            ],
        }
    }

    /// Validates the message carried in the `JWT` parameter of `message`.
    pub fn validate_request(&self, message: &LaunchMessage) -> LaunchValidationResult {
        match message.mandatory_parameter(LaunchMessage::JWT_PARAMETER) {
            Ok(raw) => self.validate(raw),
            Err(error) => {
                warn!(side = ?self.side, reason = %error, "Launch rejected");
                LaunchValidationResult::failure(Vec::new(), error)
            }
        }
    }

    /// Validates one raw signed message. Expected failures never escape as
    /// errors; they are reported in the returned result.
    pub fn validate(&self, raw: &str) -> LaunchValidationResult {
        let mut successes = Vec::new();

        match self.run(raw, &mut successes) {
            Ok((registration, payload)) => {
                info!(
                    side = ?self.side,
                    registration = registration.identifier(),
                    message_type = payload.message_type_claim(),
                    "Launch validated"
                );
                LaunchValidationResult::success(registration, payload, successes)
            }
            Err(error) => {
                warn!(
                    side = ?self.side,
                    passed = successes.len(),
                    reason = %error,
                    "Launch rejected"
                );
                LaunchValidationResult::failure(successes, error)
            }
        }
    }

    fn run(
        &self,
        raw: &str,
        successes: &mut Vec<String>,
    ) -> Result<(Registration, LtiMessagePayload), LaunchError> {
        let payload = LtiMessagePayload::parse(raw)?;
        let registration = self.find_registration(&payload)?;

        let context = CheckContext {
            validator: self,
            registration: &registration,
            payload: &payload,
        };

        for check in GENERIC_CHECKS {
            successes.push(record(check(&context)?));
        }

        let message_type = payload.message_type().ok_or_else(|| {
            LaunchError::UnsupportedMessageType(payload.message_type_claim().to_owned())
        })?;

        for check in message_type_checks(message_type) {
            successes.push(record(check(&context)?));
        }

        Ok((registration, payload))
    }

    fn find_registration(&self, payload: &LtiMessagePayload) -> Result<Registration, LaunchError> {
        // the platform is the audience of tool messages and the issuer of its own
        let found = match self.side {
            Party::Platform => self
                .registrations
                .find_by_platform_issuer(payload.audience(), payload.issuer())?,
            Party::Tool => self
                .registrations
                .find_by_platform_issuer(payload.issuer(), payload.audience())?,
        };

        found.ok_or(LaunchError::RegistrationNotFound(match self.side {
            Party::Platform => "platform",
            Party::Tool => "tool",
        }))
    }
}

fn record(success: &'static str) -> String {
    debug!(check = success, "Launch check passed");
    success.to_owned()
}

fn check_expiry(ctx: &CheckContext<'_>) -> Result<&'static str, LaunchError> {
    if ctx.payload.token().is_expired(ctx.validator.clock.now()) {
        return Err(LaunchError::TokenExpired);
    }

    Ok("JWT is not expired")
}

fn check_key_id(ctx: &CheckContext<'_>) -> Result<&'static str, LaunchError> {
    match ctx.payload.token().key_id() {
        Some(kid) if !kid.is_empty() => Ok("JWT kid header is provided"),
        _ => Err(LaunchError::MissingKeyId),
    }
}

fn check_version(ctx: &CheckContext<'_>) -> Result<&'static str, LaunchError> {
    if ctx.payload.version() != Some(LTI_VERSION) {
        return Err(LaunchError::InvalidVersion);
    }

    Ok("JWT version claim is valid")
}

fn check_message_type(ctx: &CheckContext<'_>) -> Result<&'static str, LaunchError> {
    let claim = ctx.payload.message_type_claim();
    if claim.is_empty() {
        return Err(LaunchError::MissingMessageType);
    }

    match MessageType::from_claim(claim) {
        Some(message_type) if ctx.validator.supported_message_types().contains(&message_type) => {
            Ok("JWT id_token message_type claim is valid")
        }
        _ => Err(LaunchError::UnsupportedMessageType(claim.to_owned())),
    }
}

fn check_signature(ctx: &CheckContext<'_>) -> Result<&'static str, LaunchError> {
    let kid = ctx.payload.token().key_id().ok_or(LaunchError::MissingKeyId)?;
    let signer = ctx.validator.side.counterpart();

    let key = ctx
        .validator
        .resolver
        .resolve(ctx.registration, signer, kid)
        .map_err(LaunchError::KeyResolution)?;

    if !ctx.payload.token().verify(&key) {
        return Err(LaunchError::SignatureFailure);
    }

    Ok("JWT signature validation success")
}

fn check_nonce(ctx: &CheckContext<'_>) -> Result<&'static str, LaunchError> {
    let value = ctx
        .payload
        .nonce()
        .ok_or(LaunchError::MissingClaim(crate::message::claim::NONCE))?;

    let now = ctx.validator.clock.now();
    let record = Nonce::new(value, now + ctx.validator.config.nonce_lifetime());

    match ctx.validator.nonces.claim(record, now)? {
        NonceClaim::Fresh => Ok("JWT nonce claim is valid"),
        NonceClaim::Expired => Ok("JWT nonce claim already used but expired"),
        NonceClaim::Replayed => Err(LaunchError::NonceReplayed),
    }
}

fn check_deployment_id(ctx: &CheckContext<'_>) -> Result<&'static str, LaunchError> {
    if !ctx.registration.has_deployment_id(ctx.payload.deployment_id()) {
        return Err(LaunchError::DeploymentNotFound);
    }

    Ok("JWT deployment_id claim valid for this registration")
}

fn check_proctoring_session_data(ctx: &CheckContext<'_>) -> Result<&'static str, LaunchError> {
    ctx.payload
        .proctoring_session_data()
        .map(|_| "JWT session_data proctoring claim is valid")
        .ok_or(LaunchError::InvalidMessageTypeClaim("session_data proctoring"))
}

fn check_proctoring_attempt_number(ctx: &CheckContext<'_>) -> Result<&'static str, LaunchError> {
    ctx.payload
        .proctoring_attempt_number()
        .map(|_| "JWT attempt_number proctoring claim is valid")
        .ok_or(LaunchError::InvalidMessageTypeClaim("attempt_number proctoring"))
}

fn check_proctoring_start_assessment_url(
    ctx: &CheckContext<'_>,
) -> Result<&'static str, LaunchError> {
    ctx.payload
        .proctoring_start_assessment_url()
        .map(|_| "JWT start_assessment_url proctoring claim is valid")
        .ok_or(LaunchError::InvalidMessageTypeClaim("start_assessment_url proctoring"))
}

fn check_resource_link(ctx: &CheckContext<'_>) -> Result<&'static str, LaunchError> {
    match ctx.payload.resource_link() {
        Some(link) if !link.id.is_empty() => Ok("JWT resource_link claim is valid"),
        _ => Err(LaunchError::InvalidMessageTypeClaim("resource_link")),
    }
}

fn check_deep_linking_settings(ctx: &CheckContext<'_>) -> Result<&'static str, LaunchError> {
    match ctx.payload.deep_linking_settings() {
        Some(settings) if !settings.deep_link_return_url.is_empty() => {
            Ok("JWT deep_linking_settings claim is valid")
        }
        _ => Err(LaunchError::InvalidMessageTypeClaim("deep_linking_settings")),
    }
}

fn check_content_items(ctx: &CheckContext<'_>) -> Result<&'static str, LaunchError> {
    // content_items may be omitted when nothing was selected
    match ctx.payload.claim(crate::message::claim::CONTENT_ITEMS) {
        None => Ok("JWT content_items deep linking claim is valid"),
        Some(_) if ctx.payload.content_items().is_some() => {
            Ok("JWT content_items deep linking claim is valid")
        }
        Some(_) => Err(LaunchError::InvalidMessageTypeClaim("content_items deep linking")),
    }
}
