use crate::error::RelayError;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Token lifetime: two weeks.
const TOKEN_TTL_SECS: i64 = 14 * 24 * 3600;

/// Mints and verifies HMAC-signed bearer tokens.
///
/// Format: `base64url(user_id|expiry_unix) . hex(hmac_sha256(payload))`.
/// The realtime core only consumes `verify`; `mint` exists for the login
/// surface and for tests.
pub struct TokenKeeper {
    secret: Vec<u8>,
}

impl TokenKeeper {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    pub fn mint(&self, user_id: &str) -> String {
        let expiry = chrono::Utc::now().timestamp() + TOKEN_TTL_SECS;
        self.mint_with_expiry(user_id, expiry)
    }

    pub fn mint_with_expiry(&self, user_id: &str, expiry_unix: i64) -> String {
        let payload = format!("{user_id}|{expiry_unix}");
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        format!("{}.{}", URL_SAFE_NO_PAD.encode(payload), signature)
    }

    /// Validate a bearer token and return the user id it was minted for.
    pub fn verify(&self, token: &str) -> Result<String, RelayError> {
        let (payload_b64, signature_hex) = token
            .split_once('.')
            .ok_or_else(|| RelayError::Auth("malformed token".to_string()))?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| RelayError::Auth("malformed token payload".to_string()))?;
        let signature = hex::decode(signature_hex)
            .map_err(|_| RelayError::Auth("malformed token signature".to_string()))?;

        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(&payload);
        mac.verify_slice(&signature)
            .map_err(|_| RelayError::Auth("signature mismatch".to_string()))?;

        let payload = String::from_utf8(payload)
            .map_err(|_| RelayError::Auth("malformed token payload".to_string()))?;
        let (user_id, expiry) = payload
            .split_once('|')
            .ok_or_else(|| RelayError::Auth("malformed token payload".to_string()))?;
        let expiry: i64 = expiry
            .parse()
            .map_err(|_| RelayError::Auth("malformed token expiry".to_string()))?;

        if expiry < chrono::Utc::now().timestamp() {
            return Err(RelayError::Auth("token expired".to_string()));
        }

        Ok(user_id.to_string())
    }
}
