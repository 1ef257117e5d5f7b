use hmac::digest::{Key, KeyInit};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::BTreeMap;

use crate::config::BotToken;

type HmacSha256 = Hmac<Sha256>;

/// Fixed HMAC key the platform uses to derive the per-bot secret.
pub const SECRET_LABEL: &[u8] = b"WebAppData";
/// Key of the segment carrying the claimed signature.
pub const HASH_KEY: &str = "hash";

/// Verified (or about to be verified) init-data fields, `hash` excluded.
/// Ordered so iteration yields the signing order directly.
pub type SigningFields = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("init_data missing or invalid")] MalformedPayload,
    #[error("hash not found in init_data")] MissingSignature,
    #[error("init_data verification failed")] SignatureMismatch,
}

/// `HMAC-SHA256("WebAppData", bot_token)`.
#[derive(Clone)]
pub struct DerivedSecret([u8; 32]);

impl DerivedSecret {
    fn mac(&self) -> HmacSha256 {
        keyed(&self.0)
    }
}

/// HMAC keyed with a key no longer than one SHA-256 block. Shorter keys are
/// zero-padded exactly as HMAC itself pads them, so the MAC is unchanged.
fn keyed(key: &[u8]) -> HmacSha256 {
    let mut block = Key::<HmacSha256>::default();
    let len = key.len().min(block.len());
    block[..len].copy_from_slice(&key[..len]);
    <HmacSha256 as KeyInit>::new(&block)
}

impl std::fmt::Debug for DerivedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedSecret(<redacted>)")
    }
}

pub fn derive_secret(token: &BotToken) -> DerivedSecret {
    let mut mac = keyed(SECRET_LABEL);
    mac.update(token.expose().as_bytes());
    let mut secret = [0u8; 32];
    secret.copy_from_slice(&mac.finalize().into_bytes());
    DerivedSecret(secret)
}

/// Structurally parsed payload: the fields to sign and the signature the client claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPayload {
    pub fields: SigningFields,
    pub claimed_hash: String,
}

/// Split a raw init-data string into signing fields and the claimed `hash`.
///
/// Segments are `&`-separated and split on the first `=` only; keys and values
/// are form-urlencoded. Repeated keys keep their last value, `hash` included.
/// Segments with an empty key are dropped. Escapes that do not decode to
/// UTF-8 make the whole payload malformed.
pub fn parse_payload(raw: &str) -> Result<ParsedPayload, Rejection> {
    let mut fields = SigningFields::new();
    let mut claimed_hash = None;
    let mut segments = 0;

    for segment in raw.split('&').filter(|s| !s.is_empty()) {
        segments += 1;
        let (key, value) = segment.split_once('=').unwrap_or((segment, ""));
        let key = decode_component(key)?;
        if key.is_empty() { continue; }
        let value = decode_component(value)?;
        if key == HASH_KEY {
            claimed_hash = Some(value);
        } else {
            fields.insert(key, value);
        }
    }
    if segments == 0 { return Err(Rejection::MalformedPayload); }

    match claimed_hash {
        Some(claimed_hash) if !claimed_hash.is_empty() => Ok(ParsedPayload { fields, claimed_hash }),
        _ => Err(Rejection::MissingSignature),
    }
}

fn decode_component(encoded: &str) -> Result<String, Rejection> {
    let spaced = encoded.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| Rejection::MalformedPayload)
}

/// Sorted `key=value` lines joined with `\n`, no trailing newline.
pub fn signing_string(fields: &SigningFields) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Lowercase hex `HMAC-SHA256(secret, signing_string)`.
pub fn expected_signature(secret: &DerivedSecret, signing_string: &str) -> String {
    let mut mac = secret.mac();
    mac.update(signing_string.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies init data for one bot. Holds only the derived secret, so it is
/// cheap to clone and safe to share across requests.
#[derive(Debug, Clone)]
pub struct InitDataVerifier {
    secret: DerivedSecret,
}

impl InitDataVerifier {
    pub fn new(token: &BotToken) -> Self {
        Self { secret: derive_secret(token) }
    }

    /// Check `raw` against the bot's secret and return its fields on success.
    ///
    /// The claimed hash is hex-decoded (either case) and compared with the
    /// recomputed MAC in constant time. A claim that is not valid hex is a
    /// mismatch like any other wrong signature.
    pub fn verify(&self, raw: &str) -> Result<SigningFields, Rejection> {
        let parsed = parse_payload(raw)?;
        let claimed = hex::decode(&parsed.claimed_hash).map_err(|_| Rejection::SignatureMismatch)?;

        let mut mac = self.secret.mac();
        mac.update(signing_string(&parsed.fields).as_bytes());
        mac.verify_slice(&claimed).map_err(|_| Rejection::SignatureMismatch)?;

        Ok(parsed.fields)
    }

    /// Signature the platform would attach to `fields`.
    pub fn sign(&self, fields: &SigningFields) -> String {
        expected_signature(&self.secret, &signing_string(fields))
    }

    /// Encode `fields` as a raw init-data string with a valid trailing `hash`.
    pub fn signed_payload(&self, fields: &SigningFields) -> String {
        let mut segments: Vec<String> = fields
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        segments.push(format!("{}={}", HASH_KEY, self.sign(fields)));
        segments.join("&")
    }
}

/// One-shot verification; derives the secret on every call.
pub fn verify_init_data(raw: &str, token: &BotToken) -> Result<SigningFields, Rejection> {
    InitDataVerifier::new(token).verify(raw)
}

/// Signed raw init data for `fields`, as the platform would issue it.
pub fn sign_fields(token: &BotToken, fields: &SigningFields) -> String {
    InitDataVerifier::new(token).signed_payload(fields)
}
