//! Trust relationships between one Platform and one Tool.

use crate::error::RepositoryError;
use crate::key::KeyChain;
use std::sync::RwLock;

/// The two sides of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Party {
    /// The identity issuing side, e.g. a learning system.
    Platform,
    /// The relying side receiving launches.
    Tool,
}

impl Party {
    /// The other side of the registration.
    pub fn counterpart(self) -> Party {
        match self {
            Party::Platform => Party::Tool,
            Party::Tool => Party::Platform,
        }
    }
}

/// The issuing side of a registration.
#[derive(Debug, Clone, PartialEq)]
pub struct Platform {
    /// Platform identifier
    pub identifier: String,
    /// Human readable name
    pub name: String,
    /// Issuer of platform originating messages, audience of tool ones
    pub audience: String,
    /// Where OIDC authentication requests are redirected
    pub oidc_authentication_url: String,
}

/// The relying side of a registration.
#[derive(Debug, Clone, PartialEq)]
pub struct Tool {
    /// Tool identifier
    pub identifier: String,
    /// Human readable name
    pub name: String,
    /// Issuer of tool originating messages, audience of platform ones
    pub audience: String,
    /// Where the platform starts OIDC login initiation
    pub oidc_initiation_url: String,
    /// Default launch target, if any
    pub launch_url: Option<String>,
}

/// One Platform to Tool trust relationship.
///
/// Registrations are unique per (platform audience, client id) pair and are
/// never mutated once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    identifier: String,
    client_id: String,
    platform: Platform,
    tool: Tool,
    deployment_ids: Vec<String>,
    platform_key_chain: Option<KeyChain>,
    tool_key_chain: Option<KeyChain>,
    platform_jwks_url: Option<String>,
    tool_jwks_url: Option<String>,
}

impl Registration {
    /// Creates a registration without any key material. Attach keys with the
    /// `with_*` methods.
    pub fn new(
        identifier: impl Into<String>,
        client_id: impl Into<String>,
        platform: Platform,
        tool: Tool,
        deployment_ids: Vec<String>,
    ) -> Self {
        Registration {
            identifier: identifier.into(),
            client_id: client_id.into(),
            platform,
            tool,
            deployment_ids,
            platform_key_chain: None,
            tool_key_chain: None,
            platform_jwks_url: None,
            tool_jwks_url: None,
        }
    }

    /// Sets the key chain locally held for `party`.
    pub fn with_key_chain(mut self, party: Party, key_chain: KeyChain) -> Self {
        match party {
            Party::Platform => self.platform_key_chain = Some(key_chain),
            Party::Tool => self.tool_key_chain = Some(key_chain),
        }
        self
    }

    /// Sets the remote key set endpoint of `party`.
    pub fn with_jwks_url(mut self, party: Party, url: impl Into<String>) -> Self {
        match party {
            Party::Platform => self.platform_jwks_url = Some(url.into()),
            Party::Tool => self.tool_jwks_url = Some(url.into()),
        }
        self
    }

    /// Registration identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// OAuth client id the platform assigned to the tool.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// The platform side.
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// The tool side.
    pub fn tool(&self) -> &Tool {
        &self.tool
    }

    /// Every deployment id known to this registration.
    pub fn deployment_ids(&self) -> &[String] {
        &self.deployment_ids
    }

    /// Whether `deployment_id` belongs to this registration.
    pub fn has_deployment_id(&self, deployment_id: &str) -> bool {
        self.deployment_ids.iter().any(|id| id == deployment_id)
    }

    /// The first configured deployment id.
    pub fn default_deployment_id(&self) -> Option<&str> {
        self.deployment_ids.first().map(String::as_str)
    }

    /// Locally held key chain of `party`.
    pub fn key_chain(&self, party: Party) -> Option<&KeyChain> {
        match party {
            Party::Platform => self.platform_key_chain.as_ref(),
            Party::Tool => self.tool_key_chain.as_ref(),
        }
    }

    /// Remote key set endpoint of `party`.
    pub fn jwks_url(&self, party: Party) -> Option<&str> {
        match party {
            Party::Platform => self.platform_jwks_url.as_deref(),
            Party::Tool => self.tool_jwks_url.as_deref(),
        }
    }

    fn matches(&self, issuer: &str, client_id: &str) -> bool {
        self.platform.audience == issuer && self.client_id == client_id
    }
}

/// Lookup of registrations, owned outside the crate.
pub trait RegistrationRepository: Send + Sync {
    /// Finds a registration by its identifier.
    fn find(&self, identifier: &str) -> Result<Option<Registration>, RepositoryError>;

    /// Every known registration.
    fn find_all(&self) -> Result<Vec<Registration>, RepositoryError>;

    /// Finds the registration of `client_id` at the platform issuing as `issuer`.
    fn find_by_platform_issuer(
        &self,
        issuer: &str,
        client_id: &str,
    ) -> Result<Option<Registration>, RepositoryError>;
}

/// [RegistrationRepository] kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryRegistrationRepository {
    registrations: RwLock<Vec<Registration>>,
}

impl InMemoryRegistrationRepository {
    /// Creates a repository holding `registrations`.
    ///
    /// Fails when two registrations share an identifier or a
    /// (platform audience, client id) pair.
    pub fn new(
        registrations: impl IntoIterator<Item = Registration>,
    ) -> Result<Self, RepositoryError> {
        let repository = Self::default();
        for registration in registrations {
            repository.add(registration)?;
        }
        Ok(repository)
    }

    /// Adds one registration, keeping identifiers and issuer pairs unique.
    pub fn add(&self, registration: Registration) -> Result<(), RepositoryError> {
        let mut registrations = self
            .registrations
            .write()
            .map_err(|_| RepositoryError::new("registration store lock poisoned"))?;

        if registrations.iter().any(|existing| {
            existing.identifier == registration.identifier
                || existing.matches(&registration.platform.audience, &registration.client_id)
        }) {
            return Err(RepositoryError::new(format!(
                "registration {} conflicts with an existing registration",
                registration.identifier
            )));
        }

        registrations.push(registration);
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&[Registration]) -> T) -> Result<T, RepositoryError> {
        let registrations = self
            .registrations
            .read()
            .map_err(|_| RepositoryError::new("registration store lock poisoned"))?;
        Ok(f(&registrations))
    }
}

impl RegistrationRepository for InMemoryRegistrationRepository {
    fn find(&self, identifier: &str) -> Result<Option<Registration>, RepositoryError> {
        self.read(|all| all.iter().find(|r| r.identifier == identifier).cloned())
    }

    fn find_all(&self) -> Result<Vec<Registration>, RepositoryError> {
        self.read(<[Registration]>::to_vec)
    }

    fn find_by_platform_issuer(
        &self,
        issuer: &str,
        client_id: &str,
    ) -> Result<Option<Registration>, RepositoryError> {
        self.read(|all| all.iter().find(|r| r.matches(issuer, client_id)).cloned())
    }
}
