use std::{fmt, sync::Arc};

use aegis_config::Config;
use aegis_core::{
    AuthUnitOfWork,
    domain::users::auth::{
        AccountLifecycle, AuthCrypto, LifecyclePolicy, PermissionEvaluator,
        TokenIssuer,
    },
    notify::{EmailTemplates, NotificationDispatcher, Notifier},
    time::TimeProvider,
};
use anyhow::Context;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub unit_of_work: AuthUnitOfWork,
    pub config: Arc<Config>,
    pub lifecycle: Arc<AccountLifecycle>,
    pub permissions: Arc<PermissionEvaluator>,
    pub token_issuer: Arc<TokenIssuer>,
    pub notifications: Arc<NotificationDispatcher>,
    /// Cancelled on shutdown; background tasks watch it.
    pub shutdown: CancellationToken,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    /// Wire the account services from configuration.
    ///
    /// Must be called inside a tokio runtime: the notification worker is
    /// spawned here.
    pub fn build(
        config: Arc<Config>,
        unit_of_work: AuthUnitOfWork,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn TimeProvider>,
    ) -> anyhow::Result<Self> {
        let auth = &config.auth;

        let token_issuer = Arc::new(
            TokenIssuer::with_clock(auth.jwt_secret.as_bytes(), Arc::clone(&clock))
                .context("failed to initialise token issuer")?,
        );
        let crypto = Arc::new(
            AuthCrypto::with_cost(
                auth.password_pepper.as_bytes(),
                auth.token_key.as_bytes(),
                auth.argon2_memory_kib,
                auth.argon2_iterations,
            )
            .context("failed to initialise password hashing")?,
        );

        let policy = LifecyclePolicy {
            access_token_ttl: chrono::Duration::from_std(auth.access_token_ttl)
                .context("access token lifetime out of range")?,
            refresh_token_ttl: chrono::Duration::from_std(auth.refresh_token_ttl)
                .context("refresh token lifetime out of range")?,
            one_time_token_ttl: chrono::Duration::from_std(auth.one_time_token_ttl)
                .context("one-time token lifetime out of range")?,
        };

        let templates = EmailTemplates::new(
            config.notifier.site_url.as_str(),
            policy.one_time_token_ttl.num_hours().max(1),
        )
        .context("invalid notification site URL")?;

        let notifications = Arc::new(NotificationDispatcher::spawn(
            notifier,
            config.notifier.queue_capacity,
        ));

        let permissions = Arc::new(PermissionEvaluator::new(
            unit_of_work.users.clone(),
            unit_of_work.roles.clone(),
        ));

        let lifecycle = Arc::new(AccountLifecycle::new(
            unit_of_work.clone(),
            Arc::clone(&token_issuer),
            crypto,
            Arc::clone(&notifications),
            templates,
            policy,
            clock,
        ));

        Ok(Self {
            unit_of_work,
            config,
            lifecycle,
            permissions,
            token_issuer,
            notifications,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn lifecycle(&self) -> &AccountLifecycle {
        &self.lifecycle
    }

    pub fn permissions(&self) -> &PermissionEvaluator {
        &self.permissions
    }

    pub fn token_issuer(&self) -> &TokenIssuer {
        &self.token_issuer
    }

    /// Stop background work and drain queued notifications.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.notifications.shutdown().await;
    }
}
