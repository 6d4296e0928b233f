use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use tracing::debug;

use super::types::TokenClaims;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("failed to sign token: {0}")]
    Sign(String),

    #[error("token rejected: {0}")]
    Verify(String),
}

/// Produces and checks tamper-evident tokens. Expiry is carried in the claims.
pub trait TokenSigner: Send + Sync {
    fn sign(&self, claims: &TokenClaims) -> Result<String, SignerError>;
    fn verify(&self, token: &str) -> Result<TokenClaims, SignerError>;
}

/// HS256 JWT signer
pub struct JwtSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtSigner {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // `exp` is required; a token is dead the second it expires
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }
}

impl TokenSigner for JwtSigner {
    fn sign(&self, claims: &TokenClaims) -> Result<String, SignerError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key).map_err(|e| {
            debug!(error = %e, "Failed to encode JWT token");
            SignerError::Sign(e.to_string())
        })
    }

    fn verify(&self, token: &str) -> Result<TokenClaims, SignerError> {
        decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "Failed to decode JWT token");
                SignerError::Verify(e.to_string())
            })
    }
}
