//! Authentication utilities for exchange REST APIs
//!
//! Two signing schemes are supported:
//! - KuCoin V2: base64 HMAC-SHA256 over `timestamp + method + endpoint + body`,
//!   with the passphrase itself HMAC-signed before transmission.
//! - Binance: hex HMAC-SHA256 over the query string, appended as `signature`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use super::types::Method;

type HmacSha256 = Hmac<Sha256>;

/// KuCoin API key version for signed passphrases
pub const KEY_VERSION: &str = "2";

/// API and alert credentials.
///
/// `Debug` never prints secrets; only a masked prefix of each value.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
    api_passphrase: String,
    alert_token: String,
    alert_channel: String,
}

impl Credentials {
    pub fn new(
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
        api_passphrase: impl Into<String>,
        alert_token: impl Into<String>,
        alert_channel: impl Into<String>,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            api_passphrase: api_passphrase.into(),
            alert_token: alert_token.into(),
            alert_channel: alert_channel.into(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }

    pub fn api_passphrase(&self) -> &str {
        &self.api_passphrase
    }

    pub fn alert_token(&self) -> &str {
        &self.alert_token
    }

    pub fn alert_channel(&self) -> &str {
        &self.alert_channel
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &mask(&self.api_key))
            .field("api_secret", &mask(&self.api_secret))
            .field("api_passphrase", &mask(&self.api_passphrase))
            .field("alert_token", &mask(&self.alert_token))
            .field("alert_channel", &mask(&self.alert_channel))
            .finish()
    }
}

/// Mask a secret down to its first four characters
pub fn mask(value: &str) -> String {
    if value.is_empty() {
        return "<empty>".to_string();
    }
    let prefix: String = value.chars().take(4).collect();
    format!("{}...", prefix)
}

/// Source of strictly increasing millisecond nonces.
///
/// The wall clock is read once; later values advance with a monotonic clock,
/// so adjusting the system time never moves the nonce backwards. Clones share
/// the same counter.
#[derive(Debug, Clone)]
pub struct NonceClock {
    anchor_millis: u64,
    anchor: Instant,
    last: Arc<AtomicU64>,
}

impl Default for NonceClock {
    fn default() -> Self {
        Self::new()
    }
}

impl NonceClock {
    pub fn new() -> Self {
        let anchor_millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            anchor_millis,
            anchor: Instant::now(),
            last: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Next nonce: current milliseconds, bumped past the previous value if needed
    pub fn next(&self) -> u64 {
        let now = self.anchor_millis + self.anchor.elapsed().as_millis() as u64;
        let mut previous = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(previous + 1);
            match self.last.compare_exchange_weak(
                previous,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(actual) => previous = actual,
            }
        }
    }
}

/// Authentication headers for one KuCoin request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeaders {
    pub signature: String,
    pub timestamp_nonce: String,
    pub key_id: String,
    pub encrypted_passphrase: String,
    pub key_version: String,
}

impl AuthHeaders {
    /// Header name/value pairs, including the JSON content type
    pub fn into_header_pairs(self) -> Vec<(String, String)> {
        vec![
            ("KC-API-KEY".to_string(), self.key_id),
            ("KC-API-SIGN".to_string(), self.signature),
            ("KC-API-TIMESTAMP".to_string(), self.timestamp_nonce),
            ("KC-API-PASSPHRASE".to_string(), self.encrypted_passphrase),
            ("KC-API-KEY-VERSION".to_string(), self.key_version),
            ("Content-Type".to_string(), "application/json".to_string()),
        ]
    }
}

fn hmac_sha256(secret: &str, payload: &str) -> Vec<u8> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// String-to-sign for KuCoin: `timestamp + METHOD + path[?query] + body`
pub fn signature_payload(
    timestamp: u64,
    method: Method,
    path: &str,
    query_string: &str,
    body: &str,
) -> String {
    let mut payload = format!("{}{}{}", timestamp, method.as_str(), path);
    if !query_string.is_empty() {
        payload.push('?');
        payload.push_str(query_string);
    }
    payload.push_str(body);
    payload
}

/// Base64 HMAC-SHA256 of the passphrase, keyed by the API secret
pub fn encrypt_passphrase(secret: &str, passphrase: &str) -> String {
    BASE64.encode(hmac_sha256(secret, passphrase))
}

/// Sign a KuCoin request.
///
/// Pure: identical inputs always produce identical headers.
///
/// # Example
///
/// ```
/// use survivor_bot::exchange::auth::{sign, Credentials};
/// use survivor_bot::exchange::Method;
///
/// let creds = Credentials::new("key", "secret", "pass", "token", "chat");
/// let headers = sign(&creds, Method::Get, "/api/v1/accounts", "", "", 1_700_000_000_000);
/// assert_eq!(headers.timestamp_nonce, "1700000000000");
/// ```
pub fn sign(
    credentials: &Credentials,
    method: Method,
    path: &str,
    query_string: &str,
    body: &str,
    timestamp: u64,
) -> AuthHeaders {
    let payload = signature_payload(timestamp, method, path, query_string, body);
    AuthHeaders {
        signature: BASE64.encode(hmac_sha256(credentials.api_secret(), &payload)),
        timestamp_nonce: timestamp.to_string(),
        key_id: credentials.api_key().to_string(),
        encrypted_passphrase: encrypt_passphrase(
            credentials.api_secret(),
            credentials.api_passphrase(),
        ),
        key_version: KEY_VERSION.to_string(),
    }
}

/// Hex HMAC-SHA256 of a Binance query string
pub fn sign_query(payload: &str, secret: &str) -> String {
    hex::encode(hmac_sha256(secret, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials::new(
            "test_key",
            "test_secret",
            "test_passphrase",
            "bot_token",
            "chat_id",
        )
    }

    #[test]
    fn test_signature_payload_get_without_query() {
        let payload = signature_payload(1_700_000_000_000, Method::Get, "/api/v1/accounts", "", "");
        assert_eq!(payload, "1700000000000GET/api/v1/accounts");
    }

    #[test]
    fn test_signature_payload_includes_query() {
        let payload = signature_payload(
            1_700_000_000_000,
            Method::Get,
            "/api/v1/market/candles",
            "type=1hour&symbol=BTC-USDT",
            "",
        );
        assert_eq!(
            payload,
            "1700000000000GET/api/v1/market/candles?type=1hour&symbol=BTC-USDT"
        );
    }

    #[test]
    fn test_signature_payload_includes_body() {
        let payload = signature_payload(
            1_700_000_000_000,
            Method::Post,
            "/api/v1/orders",
            "",
            r#"{"clientOid":"1"}"#,
        );
        assert_eq!(payload, r#"1700000000000POST/api/v1/orders{"clientOid":"1"}"#);
    }

    #[test]
    fn test_sign_known_vector() {
        let headers = sign(&creds(), Method::Get, "/api/v1/accounts", "", "", 1_700_000_000_000);

        assert_eq!(headers.signature, "P9zn1mUFkb50PMc11DN/QKa6BadlLmRrgZoN5FZESyI=");
        assert_eq!(headers.timestamp_nonce, "1700000000000");
        assert_eq!(headers.key_id, "test_key");
        assert_eq!(
            headers.encrypted_passphrase,
            "NflEcbioji3+mKmkkA9aVOD/+/hBtQO6xdOtJaq5NX4="
        );
        assert_eq!(headers.key_version, "2");
    }

    #[test]
    fn test_sign_with_query_known_vector() {
        let headers = sign(
            &creds(),
            Method::Get,
            "/api/v1/market/candles",
            "type=1hour&symbol=BTC-USDT",
            "",
            1_700_000_000_000,
        );
        assert_eq!(headers.signature, "+K27umFbihTVKgljSzDcbzGBL6YqoR5XXdMKZmXkujI=");
    }

    #[test]
    fn test_sign_with_body_known_vector() {
        let headers = sign(
            &creds(),
            Method::Post,
            "/api/v1/orders",
            "",
            r#"{"clientOid":"1","side":"buy"}"#,
            1_700_000_000_000,
        );
        assert_eq!(headers.signature, "S1NKP/J3NaJti7s5N3zyVhcI8p5uEAN1UpCOxUVRhjs=");
    }

    #[test]
    fn test_sign_is_deterministic() {
        let a = sign(&creds(), Method::Get, "/p", "a=1", "", 42);
        let b = sign(&creds(), Method::Get, "/p", "a=1", "", 42);
        assert_eq!(a, b);
    }

    #[test]
    fn test_passphrase_never_sent_in_plaintext() {
        let headers = sign(&creds(), Method::Get, "/p", "", "", 42);
        assert_ne!(headers.encrypted_passphrase, "test_passphrase");
    }

    #[test]
    fn test_header_pairs() {
        let pairs = sign(&creds(), Method::Get, "/p", "", "", 42).into_header_pairs();
        let names: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "KC-API-KEY",
                "KC-API-SIGN",
                "KC-API-TIMESTAMP",
                "KC-API-PASSPHRASE",
                "KC-API-KEY-VERSION",
                "Content-Type"
            ]
        );
    }

    #[test]
    fn test_sign_query_known_vector() {
        let signature = sign_query("symbol=BTCUSDT&timestamp=1700000000000", "test_secret");
        assert_eq!(
            signature,
            "343e1db965b0f65fd501d970a8af06c8351ec494fd09157959b8733639533d65"
        );
    }

    #[test]
    fn test_nonce_strictly_increasing() {
        let clock = NonceClock::new();
        let mut previous = clock.next();
        for _ in 0..1000 {
            let next = clock.next();
            assert!(next > previous);
            previous = next;
        }
    }

    #[test]
    fn test_nonce_clones_share_counter() {
        let clock = NonceClock::new();
        let other = clock.clone();
        let a = clock.next();
        let b = other.next();
        assert!(b > a);
    }

    #[test]
    fn test_nonce_is_epoch_millis() {
        let clock = NonceClock::new();
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;
        let nonce = clock.next();
        assert!(nonce.abs_diff(wall) < 5_000);
    }

    #[test]
    fn test_debug_masks_secrets() {
        let rendered = format!("{:?}", creds());
        assert!(!rendered.contains("test_secret"));
        assert!(!rendered.contains("test_passphrase"));
        assert!(rendered.contains("test..."));
    }

    #[test]
    fn test_mask() {
        assert_eq!(mask("abcdefgh"), "abcd...");
        assert_eq!(mask("ab"), "ab...");
        assert_eq!(mask(""), "<empty>");
    }
}
