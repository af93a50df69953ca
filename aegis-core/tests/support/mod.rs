#![allow(dead_code)]

use std::sync::Arc;

use aegis_core::{
    AuthUnitOfWork, RbacBootstrapService,
    database::InMemoryAuthStore,
    domain::users::{
        auth::{AccountLifecycle, AuthCrypto, LifecyclePolicy, TokenIssuer},
        user::{LoginRequest, RegisterRequest},
    },
    notify::{
        EmailTemplates, NotificationDispatcher, RecordingNotifier,
        extract_link_token,
    },
    time::VirtualTimeProvider,
};
use anyhow::{Context, Result};
use uuid::Uuid;

pub const TEST_PASSWORD: &str = "CorrectHorseBattery1";
pub const JWT_SECRET: &str = "integration-test-jwt-secret";

pub struct TestAccounts {
    pub lifecycle: AccountLifecycle,
    pub uow: AuthUnitOfWork,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: VirtualTimeProvider,
}

impl TestAccounts {
    pub async fn in_memory() -> Result<Self> {
        let store = Arc::new(InMemoryAuthStore::new());
        Self::with_uow(AuthUnitOfWork::in_memory(store)).await
    }

    pub async fn with_uow(uow: AuthUnitOfWork) -> Result<Self> {
        RbacBootstrapService::new(uow.roles.clone())
            .ensure_defaults()
            .await?;

        let notifier = Arc::new(RecordingNotifier::new());
        let clock = VirtualTimeProvider::new();
        let lifecycle = AccountLifecycle::new(
            uow.clone(),
            Arc::new(TokenIssuer::with_clock(JWT_SECRET, Arc::new(clock.clone()))?),
            Arc::new(AuthCrypto::with_cost("test-pepper", "test-token-key", 8 * 1024, 1)?),
            Arc::new(NotificationDispatcher::spawn(notifier.clone(), 32)),
            EmailTemplates::new("http://localhost:3002", 24)?,
            LifecyclePolicy::default(),
            Arc::new(clock.clone()),
        );

        Ok(Self {
            lifecycle,
            uow,
            notifier,
            clock,
        })
    }

    pub fn register_request(email: &str, role_id: Uuid) -> RegisterRequest {
        RegisterRequest {
            name: "Test User".to_string(),
            email: email.to_string(),
            password: TEST_PASSWORD.to_string(),
            phone_number: "+15550100".to_string(),
            role_id,
        }
    }

    pub fn login_request(email: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: TEST_PASSWORD.to_string(),
        }
    }

    /// Register and return the token from the verification email.
    pub async fn register(&self, email: &str, role_id: Uuid) -> Result<String> {
        let registration = self
            .lifecycle
            .register(Self::register_request(email, role_id))
            .await?;
        registration.notification.wait().await?;
        self.last_link_token(email)
    }

    pub fn last_link_token(&self, email: &str) -> Result<String> {
        let message = self
            .notifier
            .last_to(email)
            .with_context(|| format!("no email sent to {email}"))?;
        extract_link_token(&message.body).context("email carries no token link")
    }
}
