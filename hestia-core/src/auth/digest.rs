//! HTTP Digest primitives (RFC 7616): hashing, header parsing, signed nonces

use hmac::{Hmac, Mac};
use md5::Md5;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Md5,
    Sha256,
}

impl DigestAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "MD5",
            DigestAlgorithm::Sha256 => "SHA-256",
        }
    }

    /// Lowercase hex digest of `data`
    pub fn hash(&self, data: &str) -> String {
        match self {
            DigestAlgorithm::Md5 => hex::encode(Md5::digest(data.as_bytes())),
            DigestAlgorithm::Sha256 => hex::encode(Sha256::digest(data.as_bytes())),
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MD5" => Ok(DigestAlgorithm::Md5),
            "SHA-256" | "SHA256" => Ok(DigestAlgorithm::Sha256),
            other => Err(format!("unsupported digest algorithm: {}", other)),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `H(username:realm:password)`
pub fn ha1(algorithm: DigestAlgorithm, username: &str, realm: &str, password: &str) -> String {
    algorithm.hash(&format!("{}:{}:{}", username, realm, password))
}

/// Expected `response` value for the given credentials
pub fn expected_response(
    algorithm: DigestAlgorithm,
    ha1: &str,
    method: &str,
    credentials: &DigestCredentials,
) -> String {
    let ha2 = algorithm.hash(&format!("{}:{}", method, credentials.uri));
    match (&credentials.qop, &credentials.nc, &credentials.cnonce) {
        (Some(qop), Some(nc), Some(cnonce)) => algorithm
            .hash(&format!("{}:{}:{}:{}:{}:{}", ha1, credentials.nonce, nc, cnonce, qop, ha2)),
        _ => algorithm.hash(&format!("{}:{}:{}", ha1, credentials.nonce, ha2)),
    }
}

/// Byte-wise comparison that does not stop at the first difference
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Parameters of an `Authorization: Digest ...` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestCredentials {
    pub username: String,
    pub realm: String,
    pub nonce: String,
    pub uri: String,
    pub response: String,
    pub algorithm: Option<String>,
    pub qop: Option<String>,
    pub nc: Option<String>,
    pub cnonce: Option<String>,
    pub opaque: Option<String>,
}

impl DigestCredentials {
    /// Parse an `Authorization` value; `None` unless it is a complete Digest header
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, rest) = header.split_once(char::is_whitespace)?;
        if !scheme.eq_ignore_ascii_case("digest") {
            return None;
        }

        let mut params = parse_params(rest);
        Some(Self {
            username: params.remove("username")?,
            realm: params.remove("realm")?,
            nonce: params.remove("nonce")?,
            uri: params.remove("uri")?,
            response: params.remove("response")?,
            algorithm: params.remove("algorithm"),
            qop: params.remove("qop"),
            nc: params.remove("nc"),
            cnonce: params.remove("cnonce"),
            opaque: params.remove("opaque"),
        })
    }
}

/// Split `k1="v1", k2=v2` honoring quoted commas and backslash escapes
fn parse_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace() || *c == ',') {
            chars.next();
        }
        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ',' {
                break;
            }
            key.push(c);
            chars.next();
        }
        if key.is_empty() {
            break;
        }
        if chars.next() != Some('=') {
            continue;
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    _ => value.push(c),
                }
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    break;
                }
                value.push(c);
                chars.next();
            }
        }
        params.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    params
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceStatus {
    Valid,
    /// Correctly signed but older than the validity window
    Stale,
    Invalid,
}

/// Issues and checks nonces of the form `<hex unix time><hex hmac>`
#[derive(Clone)]
pub struct NonceSigner {
    key: Vec<u8>,
    realm: String,
}

const TIMESTAMP_HEX_LEN: usize = 16;

impl NonceSigner {
    pub fn new(key: impl Into<Vec<u8>>, realm: &str) -> Self {
        Self { key: key.into(), realm: realm.to_string() }
    }

    fn mac(&self, timestamp_hex: &str) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC accepts keys of any size");
        mac.update(timestamp_hex.as_bytes());
        mac.update(b":");
        mac.update(self.realm.as_bytes());
        mac
    }

    pub fn issue(&self) -> String {
        self.issue_at(chrono::Utc::now().timestamp())
    }

    pub fn issue_at(&self, unix_seconds: i64) -> String {
        let timestamp_hex = format!("{:016x}", unix_seconds.max(0) as u64);
        let signature = self.mac(&timestamp_hex).finalize().into_bytes();
        format!("{}{}", timestamp_hex, hex::encode(signature))
    }

    pub fn check(&self, nonce: &str, window: Duration) -> NonceStatus {
        if nonce.len() <= TIMESTAMP_HEX_LEN || !nonce.is_char_boundary(TIMESTAMP_HEX_LEN) {
            return NonceStatus::Invalid;
        }
        let (timestamp_hex, signature_hex) = nonce.split_at(TIMESTAMP_HEX_LEN);
        let (Ok(issued), Ok(signature)) =
            (u64::from_str_radix(timestamp_hex, 16), hex::decode(signature_hex))
        else {
            return NonceStatus::Invalid;
        };
        if self.mac(timestamp_hex).verify_slice(&signature).is_err() {
            return NonceStatus::Invalid;
        }

        let now = chrono::Utc::now().timestamp().max(0) as u64;
        if now.saturating_sub(issued) > window.as_secs() {
            NonceStatus::Stale
        } else {
            NonceStatus::Valid
        }
    }
}

impl fmt::Debug for NonceSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NonceSigner").field("realm", &self.realm).finish_non_exhaustive()
    }
}
