// Public API - what other modules can use
pub use models::{normalize_email, ProfileFields, ProfileUpdate, PublicProfile, Role, UserModel};
pub use password::PasswordHasher;
pub use repository::{InMemoryUserRepository, PostgresUserRepository, UserRepository};

pub mod models;
pub mod password;
pub mod repository;
