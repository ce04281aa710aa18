/// Common test utilities for integration tests
///
/// Database-backed tests need a running Postgres reachable through
/// `DATABASE_URL` (plus `JWT_SECRET`); they are marked `#[ignore]` so the
/// default test run stays self-contained. Run them with
/// `cargo test -- --ignored` against a scratch database.

use std::sync::Arc;

use sqlx::PgPool;
use teamflow_api::app::{build_router, AppState};
use teamflow_api::config::Config;
use teamflow_api::mailer::testing::CapturingMailer;
use teamflow_api::realtime::RealtimeHub;
use teamflow_shared::auth::jwt::{create_token, Claims, TokenType};
use teamflow_shared::auth::{otp, password};
use teamflow_shared::models::user::User;
use uuid::Uuid;

/// Test context containing all necessary resources
pub struct TestContext {
    pub db: PgPool,
    pub app: axum::Router,
    pub hub: RealtimeHub,
    pub mailer: Arc<CapturingMailer>,
    pub config: Config,
    pub user: User,
    pub jwt_token: String,
}

impl TestContext {
    /// Creates a new test context with a migrated database and one verified
    /// user
    pub async fn new() -> anyhow::Result<Self> {
        let config = Config::from_env()?;

        let db = PgPool::connect(&config.database.url).await?;

        // Path relative to the crate's Cargo.toml
        sqlx::migrate!("../migrations").run(&db).await?;

        let user = create_verified_user(&db, "Test User").await?;

        let claims = Claims::new(user.id, TokenType::Access);
        let jwt_token = create_token(&claims, &config.jwt.secret)?;

        let hub = RealtimeHub::new();
        let mailer = Arc::new(CapturingMailer::default());
        let state = AppState::new(db.clone(), config.clone(), hub.clone(), mailer.clone());
        let app = build_router(state);

        Ok(TestContext {
            db,
            app,
            hub,
            mailer,
            config,
            user,
            jwt_token,
        })
    }

    /// Extracts the one-time code from the most recent mail sent to `email`
    pub fn mailed_code(&self, email: &str) -> String {
        let sent = self.mailer.sent.lock().unwrap();
        let (_, _, body) = sent
            .iter()
            .rev()
            .find(|(to, _, _)| to == email)
            .expect("no mail sent to this address");

        body.chars()
            .skip_while(|c| !c.is_ascii_digit())
            .take_while(|c| c.is_ascii_digit())
            .collect()
    }

    /// Returns authorization header value
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.jwt_token)
    }

    /// Issues an access token for another user
    pub fn token_for(&self, user_id: Uuid) -> anyhow::Result<String> {
        let claims = Claims::new(user_id, TokenType::Access);
        Ok(create_token(&claims, &self.config.jwt.secret)?)
    }
}

/// Creates a verified user by driving the same two-step path production
/// uses: unverified upsert, then the guarded verification update.
pub async fn create_verified_user(db: &PgPool, name: &str) -> anyhow::Result<User> {
    let email = format!("test-{}@example.com", Uuid::new_v4());

    let code = otp::generate_otp();
    let user = User::upsert_unverified(
        db,
        name,
        &email,
        &otp::hash_otp(&code),
        chrono::Utc::now() + chrono::Duration::minutes(10),
    )
    .await?
    .ok_or_else(|| anyhow::anyhow!("upsert returned None for a fresh email"))?;

    let password_hash = password::hash_password("test-password-123")?;
    let user = User::mark_verified(db, user.id, &password_hash)
        .await?
        .ok_or_else(|| anyhow::anyhow!("verification did not apply"))?;

    Ok(user)
}

/// Helper to wait for an async condition with timeout
///
/// Activity records are written on background tasks, so tests that assert
/// on the audit log poll instead of sleeping a fixed amount.
pub async fn wait_for<F, Fut>(condition: F, timeout_secs: u64) -> anyhow::Result<()>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    let timeout = std::time::Duration::from_secs(timeout_secs);

    loop {
        if condition().await {
            return Ok(());
        }

        if start.elapsed() > timeout {
            anyhow::bail!("Condition not met within {} seconds", timeout_secs);
        }

        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
