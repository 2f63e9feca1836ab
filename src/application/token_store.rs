use crate::domain::models::Credential;
use crate::infrastructure::clock::{Clock, SystemClock};
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::http_gateway::BearerCredentials;
use crate::infrastructure::token_client::{TokenIssueRequest, TokenIssuer};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub token_endpoint: String,
    pub shared_key: Option<String>,
}

impl TokenConfig {
    pub fn new(token_endpoint: impl Into<String>, shared_key: Option<String>) -> Self {
        Self {
            token_endpoint: token_endpoint.into(),
            shared_key,
        }
    }
}

pub struct TokenStore<S, I>
where
    S: CredentialStore + ?Sized,
    I: TokenIssuer,
{
    config: TokenConfig,
    credential_store: Arc<S>,
    issuer: Arc<I>,
    clock: Arc<dyn Clock>,
    current: Mutex<Option<Credential>>,
}

impl<S, I> TokenStore<S, I>
where
    S: CredentialStore + ?Sized,
    I: TokenIssuer,
{
    pub fn new(config: TokenConfig, credential_store: Arc<S>, issuer: Arc<I>) -> Self {
        Self {
            config,
            credential_store,
            issuer,
            clock: Arc::new(SystemClock),
            current: Mutex::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn is_valid(&self, credential: &Credential) -> bool {
        credential.is_valid_at(self.clock.now())
    }

    /// The credential currently held, loading it from storage on first use.
    pub fn current(&self) -> Result<Option<Credential>, InfraError> {
        let mut current = self
            .current
            .lock()
            .map_err(|error| InfraError::Credential(format!("token cache lock poisoned: {error}")))?;
        if current.is_none() {
            *current = self.credential_store.load()?;
        }
        Ok(current.clone())
    }

    pub async fn ensure_valid(&self) -> Result<Credential, InfraError> {
        if let Some(credential) = self.current()?.filter(|credential| self.is_valid(credential)) {
            return Ok(credential);
        }
        self.refresh().await
    }

    /// Fetches a new credential, persists it, and makes it current. On failure
    /// the previous credential stays in place untouched.
    pub async fn refresh(&self) -> Result<Credential, InfraError> {
        info!(endpoint = %self.config.token_endpoint, "refreshing internal api credential");
        let raw = self
            .issuer
            .issue_token(TokenIssueRequest {
                token_endpoint: self.config.token_endpoint.clone(),
                shared_key: self.config.shared_key.clone(),
            })
            .await
            .map_err(|error| match error {
                InfraError::Auth(_) => error,
                other => InfraError::Auth(other.to_string()),
            })?;

        let credential = Credential::new(raw);
        if !self.is_valid(&credential) {
            warn!("issued credential has no future expiry claim");
        }
        self.credential_store.save(&credential)?;

        let mut current = self
            .current
            .lock()
            .map_err(|error| InfraError::Credential(format!("token cache lock poisoned: {error}")))?;
        *current = Some(credential.clone());
        Ok(credential)
    }
}

#[async_trait]
impl<S, I> BearerCredentials for TokenStore<S, I>
where
    S: CredentialStore + ?Sized,
    I: TokenIssuer,
{
    async fn bearer_credential(&self) -> Result<Credential, InfraError> {
        self.ensure_valid().await
    }
}
