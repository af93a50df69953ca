//! PostgreSQL adapter behaviour. Runs when `DATABASE_URL` is set.

use aegis_core::{
    AuthError, AuthUnitOfWork,
    application::rbac_bootstrap::{ADMIN_ROLE_ID, OWNER_ROLE_ID, PATIENT_ROLE_ID},
    database::{PostgresDatabase, ports::roles::RolesRepository},
};
use anyhow::Result;
use sqlx::PgPool;

#[path = "support/mod.rs"]
mod support;

use support::TestAccounts;

async fn accounts(pool: PgPool) -> Result<TestAccounts> {
    let db = PostgresDatabase::from_pool(pool);
    TestAccounts::with_uow(AuthUnitOfWork::from_postgres(&db)).await
}

#[sqlx::test(migrator = "aegis_core::MIGRATOR")]
async fn bootstrap_is_idempotent(pool: PgPool) -> Result<()> {
    let accounts = accounts(pool.clone()).await?;
    aegis_core::RbacBootstrapService::new(accounts.uow.roles.clone())
        .ensure_defaults()
        .await?;

    let roles = accounts.uow.roles.list_roles().await?;
    assert_eq!(roles.len(), 5);
    assert_eq!(roles[0].id, OWNER_ROLE_ID);

    let admin = accounts.uow.roles.permissions_for_role(ADMIN_ROLE_ID).await?;
    assert!(admin.iter().any(|p| p.matches("user", "read")));
    assert!(!admin.iter().any(|p| p.matches("role", "manage")));
    Ok(())
}

#[sqlx::test(migrator = "aegis_core::MIGRATOR")]
async fn stores_only_token_digests(pool: PgPool) -> Result<()> {
    let accounts = accounts(pool.clone()).await?;
    let token = accounts.register("digest@clinic.io", PATIENT_ROLE_ID).await?;

    let stored: Option<String> =
        sqlx::query_scalar("SELECT token_hash FROM users WHERE email = $1")
            .bind("digest@clinic.io")
            .fetch_one(&pool)
            .await?;
    let stored = stored.expect("verification token digest stored");
    assert_ne!(stored, token);
    assert_eq!(stored.len(), 64);

    accounts.lifecycle.verify_account(&token).await?;
    let login = accounts
        .lifecycle
        .login(TestAccounts::login_request("digest@clinic.io"), "198.51.100.7")
        .await?;

    let (hash, ip): (String, String) = sqlx::query_as(
        "SELECT refresh_token_hash, client_ip FROM sessions WHERE user_id = $1",
    )
    .bind(login.user.id)
    .fetch_one(&pool)
    .await?;
    assert_ne!(hash, login.tokens.refresh_token);
    assert_eq!(ip, "198.51.100.7");
    Ok(())
}

#[sqlx::test(migrator = "aegis_core::MIGRATOR")]
async fn duplicate_email_and_second_owner_conflict(pool: PgPool) -> Result<()> {
    let accounts = accounts(pool).await?;
    accounts.register("dup@clinic.io", PATIENT_ROLE_ID).await?;
    let dup = accounts
        .lifecycle
        .register(TestAccounts::register_request("dup@clinic.io", PATIENT_ROLE_ID))
        .await;
    assert!(matches!(dup, Err(AuthError::Conflict(_))));

    accounts.register("owner@clinic.io", OWNER_ROLE_ID).await?;
    let second = accounts
        .lifecycle
        .register(TestAccounts::register_request("owner2@clinic.io", OWNER_ROLE_ID))
        .await;
    assert!(matches!(second, Err(AuthError::Conflict(_))));
    Ok(())
}

#[sqlx::test(migrator = "aegis_core::MIGRATOR")]
async fn refresh_rotation_and_logout(pool: PgPool) -> Result<()> {
    let accounts = accounts(pool.clone()).await?;
    let token = accounts.register("rot@clinic.io", PATIENT_ROLE_ID).await?;
    accounts.lifecycle.verify_account(&token).await?;
    let first = accounts
        .lifecycle
        .login(TestAccounts::login_request("rot@clinic.io"), "ip")
        .await?;
    let second = accounts
        .lifecycle
        .refresh_token(&first.tokens.refresh_token, "ip")
        .await?;

    let reused = accounts
        .lifecycle
        .refresh_token(&first.tokens.refresh_token, "ip")
        .await;
    assert!(matches!(reused, Err(AuthError::NotFound(_))));

    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE user_id = $1")
            .bind(second.user.id)
            .fetch_one(&pool)
            .await?;
    assert_eq!(count, 1);

    let caller = aegis_core::domain::users::auth::CallerIdentity {
        user_id: second.user.id,
        role_code: second.user.role.code.clone(),
    };
    accounts.lifecycle.logout(Some(&caller)).await?;
    assert!(matches!(
        accounts.lifecycle.logout(Some(&caller)).await,
        Err(AuthError::NotFound(_))
    ));
    Ok(())
}

#[sqlx::test(migrator = "aegis_core::MIGRATOR")]
async fn purge_removes_only_expired_sessions(pool: PgPool) -> Result<()> {
    let accounts = accounts(pool).await?;
    let token = accounts.register("purge@clinic.io", PATIENT_ROLE_ID).await?;
    accounts.lifecycle.verify_account(&token).await?;
    accounts
        .lifecycle
        .login(TestAccounts::login_request("purge@clinic.io"), "ip")
        .await?;

    assert_eq!(accounts.lifecycle.sessions().purge_expired().await?, 0);
    accounts.clock.advance(chrono::Duration::days(8));
    assert_eq!(accounts.lifecycle.sessions().purge_expired().await?, 1);
    Ok(())
}

#[sqlx::test(migrator = "aegis_core::MIGRATOR")]
async fn racing_refreshes_and_logins_keep_one_session(pool: PgPool) -> Result<()> {
    let accounts = accounts(pool.clone()).await?;
    let token = accounts.register("race@clinic.io", PATIENT_ROLE_ID).await?;
    accounts.lifecycle.verify_account(&token).await?;

    let (first, second) = tokio::join!(
        accounts
            .lifecycle
            .login(TestAccounts::login_request("race@clinic.io"), "ip-a"),
        accounts
            .lifecycle
            .login(TestAccounts::login_request("race@clinic.io"), "ip-b"),
    );
    let login = first?;
    second?;

    let user_id = login.user.id;
    let count_sessions = || async {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&pool)
            .await
    };
    assert_eq!(count_sessions().await?, 1);

    let current = accounts
        .lifecycle
        .sessions()
        .find_by_user(user_id)
        .await?
        .expect("one session after login");
    let presented = if current.client_ip == "ip-a" {
        login.tokens.refresh_token.clone()
    } else {
        let refreshed = accounts
            .lifecycle
            .login(TestAccounts::login_request("race@clinic.io"), "ip-a")
            .await?;
        refreshed.tokens.refresh_token
    };

    let (a, b) = tokio::join!(
        accounts.lifecycle.refresh_token(&presented, "ip-c"),
        accounts.lifecycle.refresh_token(&presented, "ip-d"),
    );
    assert_eq!(u8::from(a.is_ok()) + u8::from(b.is_ok()), 1);
    assert_eq!(count_sessions().await?, 1);
    Ok(())
}
