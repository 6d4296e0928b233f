// Library crate for the readmission backend auth service
// This file exposes the public API for integration tests

pub mod app;
pub mod config;
pub mod session;
pub mod shared;
pub mod user;

// Re-export commonly used types for easier access in tests
pub use app::build_router;
pub use config::{AppConfig, AuthConfig, ConfigError};
pub use session::{AuthResponse, IdentityClaims, NewUser, SessionService, TokenPair, TokenVerifier};
pub use shared::{AppError, AppState, LookupContext};
pub use user::{
    InMemoryUserRepository, PasswordHasher, PostgresUserRepository, PublicProfile, Role,
    UserModel, UserRepository,
};
