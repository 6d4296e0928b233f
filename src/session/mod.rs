// Public API - what other modules can use
pub use handlers::auth_routes;
pub use issuer::TokenIssuer;
pub use middleware::{jwt_auth, require_admin};
pub use service::{NewUser, SessionService};
pub use signer::{JwtSigner, SignerError, TokenSigner};
pub use types::{AuthResponse, IdentityClaims, TokenClaims, TokenPair, TokenType};
pub use verifier::TokenVerifier;

// Internal modules
mod handlers;
pub mod issuer;
mod middleware;
pub mod service;
pub mod signer;
pub mod types;
pub mod verifier;
