use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use aegis_core::{
    AuthError, AuthUnitOfWork,
    database::{InMemoryAuthStore, ports::roles::RolesRepository},
    domain::users::{Permission, Role},
};
use aegis_server::{
    AppState,
    infra::startup::{NoopStartupHooks, StartupHooks, spawn_session_purge},
};
use anyhow::Result;
use async_trait::async_trait;
use axum::http::StatusCode;
use chrono::Duration;
use serde_json::Value;
use uuid::Uuid;

#[path = "support/mod.rs"]
mod support;

use support::{build_test_app, build_test_app_with_hooks, build_test_app_with_store};

struct RecordingHooks {
    called: Arc<AtomicBool>,
}

#[async_trait]
impl StartupHooks for RecordingHooks {
    async fn run(&self, _state: &AppState) -> Result<()> {
        self.called.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn custom_startup_hooks_are_invoked() -> Result<()> {
    let flag = Arc::new(AtomicBool::new(false));
    let hooks = RecordingHooks {
        called: Arc::clone(&flag),
    };

    let app = build_test_app_with_hooks(&hooks).await?;
    assert!(flag.load(Ordering::SeqCst));

    let ping = app.server.get("/ping").await;
    ping.assert_status_ok();
    assert_eq!(ping.json::<Value>()["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn noop_hooks_leave_roles_unseeded() -> Result<()> {
    let app = build_test_app_with_hooks(&NoopStartupHooks).await?;
    assert!(app.state.unit_of_work.roles.list_roles().await?.is_empty());

    let patient_id = aegis_core::application::rbac_bootstrap::PATIENT_ROLE_ID;
    app.register("nobody@example.com", patient_id)
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn prod_hooks_seed_roles_and_report_health() -> Result<()> {
    let app = build_test_app().await?;
    assert_eq!(app.state.unit_of_work.roles.list_roles().await?.len(), 5);

    let health = app.server.get("/health").await;
    health.assert_status_ok();
    let body: Value = health.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["store"]["roles"], 5);
    assert_eq!(body["checks"]["notifications"]["status"], "healthy");
    Ok(())
}

#[tokio::test]
async fn session_purge_removes_expired_sessions_until_shutdown() -> Result<()> {
    let app = build_test_app_with_hooks(&NoopStartupHooks).await?;
    aegis_core::RbacBootstrapService::new(app.state.unit_of_work.roles.clone())
        .ensure_defaults()
        .await?;
    let (_, refresh) = app.signed_in("henry@example.com", "patient").await?;

    let sessions = app.state.lifecycle().sessions();
    assert!(sessions.find_by_token(&refresh).await?.is_some());

    app.clock.advance(Duration::days(8));
    let purge = spawn_session_purge(app.state.clone(), std::time::Duration::from_millis(10));

    let mut remaining = true;
    for _ in 0..100 {
        remaining = sessions.find_by_token(&refresh).await?.is_some();
        if !remaining {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(!remaining, "expired session should be purged");

    app.state.shutdown().await;
    purge.await?;
    Ok(())
}

/// Roles store whose every call fails the way an unreachable database does.
struct UnreachableRoles;

const UNREACHABLE: &str = "Failed to list roles: connection refused to 10.0.0.5:5432 user=aegis";

#[async_trait]
impl RolesRepository for UnreachableRoles {
    async fn find_role_by_id(&self, _id: Uuid) -> aegis_core::Result<Option<Role>> {
        Err(AuthError::infrastructure(UNREACHABLE))
    }

    async fn find_role_by_code(&self, _code: &str) -> aegis_core::Result<Option<Role>> {
        Err(AuthError::infrastructure(UNREACHABLE))
    }

    async fn list_roles(&self) -> aegis_core::Result<Vec<Role>> {
        Err(AuthError::infrastructure(UNREACHABLE))
    }

    async fn permissions_for_role(&self, _role_id: Uuid) -> aegis_core::Result<Vec<Permission>> {
        Err(AuthError::infrastructure(UNREACHABLE))
    }

    async fn upsert_role(&self, _role: &Role) -> aegis_core::Result<()> {
        Err(AuthError::infrastructure(UNREACHABLE))
    }

    async fn upsert_permission(&self, _permission: &Permission) -> aegis_core::Result<()> {
        Err(AuthError::infrastructure(UNREACHABLE))
    }

    async fn grant_permission(
        &self,
        _role_id: Uuid,
        _permission_id: Uuid,
    ) -> aegis_core::Result<()> {
        Err(AuthError::infrastructure(UNREACHABLE))
    }
}

#[tokio::test]
async fn unhealthy_store_is_reported_without_details() -> Result<()> {
    let store = Arc::new(InMemoryAuthStore::new());
    let unit_of_work = AuthUnitOfWork::new(store.clone(), Arc::new(UnreachableRoles), store);
    let app = build_test_app_with_store(unit_of_work, &NoopStartupHooks).await?;

    let health = app.server.get("/health").await;
    health.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = health.json();
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["checks"]["store"]["status"], "unhealthy");
    assert_eq!(body["checks"]["store"]["error"], "store unavailable");

    let text = health.text();
    assert!(!text.contains("10.0.0.5"));
    assert!(!text.contains("user=aegis"));
    Ok(())
}
