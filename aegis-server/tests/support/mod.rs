#![allow(dead_code)]

use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use aegis_config::{ConfigLoader, EnvConfig};
use aegis_core::{
    AuthUnitOfWork,
    database::{InMemoryAuthStore, ports::roles::RolesRepository},
    notify::{RecordingNotifier, extract_link_token},
    time::VirtualTimeProvider,
};
use aegis_server::{
    AppState, create_app,
    infra::startup::{ProdStartupHooks, StartupHooks},
};
use anyhow::{Context, Result, anyhow};
use axum::http::{StatusCode, header};
use axum_test::{TestResponse, TestServer};
use serde_json::{Value, json};
use uuid::Uuid;

pub const TEST_PASSWORD: &str = "CorrectHorseBattery1";

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: VirtualTimeProvider,
}

/// Dev-mode config with cheap password hashing, read from a fake
/// environment so the process environment is never touched.
pub fn test_config(overrides: &[(&str, &str)]) -> Result<aegis_config::Config> {
    let mut vars: HashMap<String, String> = [
        ("AEGIS_DEV_MODE", "true"),
        ("AEGIS_JWT_SECRET", "server-integration-test-secret"),
        ("AEGIS_PASSWORD_PEPPER", "server-test-pepper"),
        ("AEGIS_TOKEN_KEY", "server-test-token-key"),
        ("AEGIS_ARGON2_MEMORY_KIB", "8192"),
        ("AEGIS_ARGON2_ITERATIONS", "1"),
        ("AEGIS_SITE_URL", "http://localhost:3002"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (key, value) in overrides {
        vars.insert(key.to_string(), value.to_string());
    }

    let env = EnvConfig::from_lookup(|name| vars.get(name).cloned());
    let load = ConfigLoader::new()
        .load_with_env(env, false)
        .context("test config should load")?;
    Ok(load.config)
}

pub async fn build_test_app() -> Result<TestApp> {
    build_test_app_with_hooks(&ProdStartupHooks).await
}

pub async fn build_test_app_with_hooks(hooks: &dyn StartupHooks) -> Result<TestApp> {
    let unit_of_work = AuthUnitOfWork::in_memory(Arc::new(InMemoryAuthStore::new()));
    build_test_app_with_store(unit_of_work, hooks).await
}

pub async fn build_test_app_with_store(
    unit_of_work: AuthUnitOfWork,
    hooks: &dyn StartupHooks,
) -> Result<TestApp> {
    let config = Arc::new(test_config(&[])?);
    let notifier = Arc::new(RecordingNotifier::new());
    let clock = VirtualTimeProvider::new();

    let state = AppState::build(
        config,
        unit_of_work,
        notifier.clone(),
        Arc::new(clock.clone()),
    )?;
    hooks.run(&state).await?;

    let router = create_app(state.clone());
    let server = TestServer::builder()
        .http_transport()
        .build(router.into_make_service_with_connect_info::<SocketAddr>())
        .map_err(|err| anyhow!(err.to_string()))?;

    Ok(TestApp {
        server,
        state,
        notifier,
        clock,
    })
}

pub fn bearer(token: &str) -> String {
    if token.starts_with("Bearer ") {
        token.to_string()
    } else {
        format!("Bearer {token}")
    }
}

/// Value of `refresh_token` in the response's `Set-Cookie` header.
pub fn refresh_cookie_value(response: &TestResponse) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|cookie| cookie.strip_prefix("refresh_token="))
        .and_then(|rest| rest.split(';').next())
        .map(str::to_string)
}

pub fn set_cookie_header(response: &TestResponse) -> String {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

impl TestApp {
    pub async fn role_id(&self, code: &str) -> Result<Uuid> {
        let role = self
            .state
            .unit_of_work
            .roles
            .find_role_by_code(code)
            .await?
            .with_context(|| format!("role {code} is not seeded"))?;
        Ok(role.id)
    }

    pub async fn register(&self, email: &str, role_id: Uuid) -> TestResponse {
        self.server
            .post("/api/v1/auth/register")
            .json(&json!({
                "name": "Test User",
                "email": email,
                "password": TEST_PASSWORD,
                "phone_number": "+15550100",
                "role_id": role_id,
            }))
            .await
    }

    /// Emails are delivered by a background worker; poll until one with a
    /// link reaches `email`.
    pub async fn wait_for_link_token(&self, email: &str) -> Result<String> {
        for _ in 0..100 {
            if let Some(token) = self
                .notifier
                .last_to(email)
                .and_then(|message| extract_link_token(&message.body))
            {
                return Ok(token);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Err(anyhow!("no email with a link reached {email}"))
    }

    pub async fn verify(&self, token: &str) -> TestResponse {
        self.server
            .get("/api/v1/auth/verify-account")
            .add_query_param("verify_token", token)
            .await
    }

    pub async fn login(&self, email: &str, password: &str) -> TestResponse {
        self.server
            .post("/api/v1/auth/login")
            .json(&json!({ "email": email, "password": password }))
            .await
    }

    /// Register, verify and log in. Returns `(access token, refresh cookie)`.
    pub async fn signed_in(&self, email: &str, role_code: &str) -> Result<(String, String)> {
        let role_id = self.role_id(role_code).await?;
        let registered = self.register(email, role_id).await;
        if registered.status_code() != StatusCode::CREATED {
            return Err(anyhow!("registration failed: {}", registered.text()));
        }

        let token = self.wait_for_link_token(email).await?;
        self.verify(&token).await.assert_status_ok();

        let login = self.login(email, TEST_PASSWORD).await;
        login.assert_status_ok();
        let body: Value = login.json();
        let access = body["data"]["token"]
            .as_str()
            .context("login body carries a token")?
            .to_string();
        let refresh = refresh_cookie_value(&login).context("login sets a refresh cookie")?;
        Ok((access, refresh))
    }
}
