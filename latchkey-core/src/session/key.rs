use std::{fmt, path::Path};

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use rand::{TryRngCore, rngs::OsRng};

use crate::{Error, error::CryptoError};

/// Shortest HS256 secret accepted, in bytes.
pub const MIN_HS256_SECRET_LEN: usize = 32;

/// Key material used to sign and verify session tokens.
///
/// Encoding and decoding keys are parsed once at construction.
#[derive(Clone)]
pub struct SigningKey {
    algorithm: Algorithm,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    /// HMAC-SHA256 with a shared secret of at least 32 bytes.
    pub fn hs256(secret: impl AsRef<[u8]>) -> Result<Self, Error> {
        let secret = secret.as_ref();
        if secret.len() < MIN_HS256_SECRET_LEN {
            return Err(CryptoError::InvalidKey(format!(
                "HS256 secret must be at least {MIN_HS256_SECRET_LEN} bytes"
            ))
            .into());
        }

        Ok(Self {
            algorithm: Algorithm::HS256,
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        })
    }

    /// RSA-SHA256 from PEM encoded keys.
    pub fn rs256(private_key_pem: &[u8], public_key_pem: &[u8]) -> Result<Self, Error> {
        let encoding = EncodingKey::from_rsa_pem(private_key_pem)
            .map_err(|e| CryptoError::InvalidKey(format!("Invalid RSA private key: {e}")))?;
        let decoding = DecodingKey::from_rsa_pem(public_key_pem)
            .map_err(|e| CryptoError::InvalidKey(format!("Invalid RSA public key: {e}")))?;

        Ok(Self {
            algorithm: Algorithm::RS256,
            encoding,
            decoding,
        })
    }

    pub fn from_rs256_pem_files(
        private_key_path: impl AsRef<Path>,
        public_key_path: impl AsRef<Path>,
    ) -> Result<Self, Error> {
        let private_key = std::fs::read(private_key_path)
            .map_err(|e| CryptoError::InvalidKey(format!("Failed to read private key file: {e}")))?;
        let public_key = std::fs::read(public_key_path)
            .map_err(|e| CryptoError::InvalidKey(format!("Failed to read public key file: {e}")))?;

        Self::rs256(&private_key, &public_key)
    }

    /// HS256 with the secret taken from `LATCHKEY_SIGNING_SECRET`.
    pub fn from_env() -> Result<Self, Error> {
        let secret = std::env::var("LATCHKEY_SIGNING_SECRET").map_err(|_| {
            CryptoError::InvalidKey("LATCHKEY_SIGNING_SECRET is not set".to_string())
        })?;
        Self::hs256(secret.as_bytes())
    }

    /// HS256 with a fresh random secret. Tokens do not survive a restart.
    pub fn random_hs256() -> Self {
        let mut secret = [0u8; MIN_HS256_SECRET_LEN];
        OsRng
            .try_fill_bytes(&mut secret)
            .expect("OS RNG failure - system entropy source unavailable");

        Self {
            algorithm: Algorithm::HS256,
            encoding: EncodingKey::from_secret(&secret),
            decoding: DecodingKey::from_secret(&secret),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hs256_rejects_short_secret() {
        let result = SigningKey::hs256(b"too-short");
        assert!(matches!(
            result,
            Err(Error::Crypto(CryptoError::InvalidKey(_)))
        ));
    }

    #[test]
    fn test_hs256_accepts_long_secret() {
        let key = SigningKey::hs256([7u8; 32]).unwrap();
        assert_eq!(key.algorithm(), Algorithm::HS256);
    }

    #[test]
    fn test_rs256_rejects_garbage_pem() {
        let result = SigningKey::rs256(b"not a pem", b"not a pem");
        assert!(matches!(
            result,
            Err(Error::Crypto(CryptoError::InvalidKey(_)))
        ));
    }

    #[test]
    fn test_missing_pem_files() {
        let result = SigningKey::from_rs256_pem_files("/nonexistent/private.pem", "/nonexistent/public.pem");
        assert!(matches!(
            result,
            Err(Error::Crypto(CryptoError::InvalidKey(_)))
        ));
    }

    #[test]
    fn test_debug_hides_key_material() {
        let rendered = format!("{:?}", SigningKey::random_hs256());
        assert_eq!(rendered, "SigningKey { algorithm: HS256, .. }");
    }
}
