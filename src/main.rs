use readmission_backend::{
    build_router, AppConfig, AppState, InMemoryUserRepository, PasswordHasher,
    PostgresUserRepository, UserRepository,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "readmission_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting readmission backend");

    let config = AppConfig::from_env()?;
    info!(auth = ?config.auth, "Loaded configuration");

    // Postgres when DATABASE_URL is set, in-memory otherwise
    let user_repository: Arc<dyn UserRepository + Send + Sync> = match &config.database_url {
        Some(database_url) => {
            let pool = sqlx::PgPool::connect(database_url).await?;
            let repository = PostgresUserRepository::new(pool);
            repository.ensure_schema().await?;
            info!("Connected to Postgres");
            Arc::new(repository)
        }
        None => {
            warn!("DATABASE_URL is not set, users are kept in memory and lost on restart");
            Arc::new(InMemoryUserRepository::new())
        }
    };

    let app_state = AppState::new(&config.auth, user_repository, PasswordHasher::default());
    let app = build_router(app_state);

    let address = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Server running on http://{}", address);
    axum::serve(listener, app).await?;

    Ok(())
}
