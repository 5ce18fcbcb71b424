//! SCRAM-SHA-256 client (RFC 5802 / RFC 7677) as used by Postgres 10+
//!
//! Channel binding is not offered (`n,,` header), matching a plaintext
//! transport. The username is left empty in the SCRAM messages; Postgres
//! takes it from the startup packet.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Mechanism name advertised by the server
pub const SCRAM_SHA_256: &str = "SCRAM-SHA-256";

const GS2_HEADER: &str = "n,,";

/// SCRAM failures
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScramError {
    /// Server message could not be parsed
    #[error("invalid server message: {0}")]
    InvalidServerMessage(String),

    /// Server signature did not match
    #[error("invalid server proof: {0}")]
    InvalidServerProof(String),

    /// Base64 decoding error
    #[error("base64 error: {0}")]
    Base64(String),
}

/// Values kept between client-final and server-final
#[derive(Clone, Debug)]
pub struct ScramState {
    auth_message: Vec<u8>,
    server_key: Vec<u8>,
}

/// SCRAM-SHA-256 client for one authentication exchange
pub struct ScramClient {
    password: String,
    nonce: String,
}

impl ScramClient {
    /// Create a client with a random 24-byte nonce
    pub fn new(password: impl Into<String>) -> Self {
        let nonce_bytes: [u8; 24] = rand::thread_rng().gen();
        Self::with_nonce(password, BASE64.encode(nonce_bytes))
    }

    fn with_nonce(password: impl Into<String>, nonce: String) -> Self {
        Self {
            password: password.into(),
            nonce,
        }
    }

    fn client_first_bare(&self) -> String {
        format!("n=,r={}", self.nonce)
    }

    /// Client first message
    pub fn client_first(&self) -> String {
        format!("{}{}", GS2_HEADER, self.client_first_bare())
    }

    /// Answer the server's challenge
    ///
    /// Returns the client final message and the state needed to verify the
    /// server's final message.
    pub fn client_final(&self, server_first: &str) -> Result<(String, ScramState), ScramError> {
        let challenge = ServerFirst::parse(server_first)?;

        if !challenge.nonce.starts_with(&self.nonce) {
            return Err(ScramError::InvalidServerMessage(
                "server nonce doesn't contain client nonce".to_string(),
            ));
        }

        let salt = BASE64
            .decode(challenge.salt)
            .map_err(|_| ScramError::Base64("invalid salt encoding".to_string()))?;

        let without_proof = format!("c={},r={}", BASE64.encode(GS2_HEADER), challenge.nonce);
        let auth_message = format!(
            "{},{},{}",
            self.client_first_bare(),
            server_first,
            without_proof
        );

        let salted = salted_password(&self.password, &salt, challenge.iterations);
        let client_key = hmac_sha256(&salted, b"Client Key");
        let stored_key = Sha256::digest(&client_key);
        let client_signature = hmac_sha256(&stored_key, auth_message.as_bytes());
        let proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature.iter())
            .map(|(k, s)| k ^ s)
            .collect();

        let state = ScramState {
            auth_message: auth_message.into_bytes(),
            server_key: hmac_sha256(&salted, b"Server Key"),
        };

        Ok((format!("{},p={}", without_proof, BASE64.encode(proof)), state))
    }

    /// Check the server signature in the final message
    pub fn verify_server_final(
        &self,
        server_final: &str,
        state: &ScramState,
    ) -> Result<(), ScramError> {
        if let Some(err) = server_final.strip_prefix("e=") {
            return Err(ScramError::InvalidServerProof(err.to_string()));
        }

        let encoded = server_final
            .strip_prefix("v=")
            .ok_or_else(|| ScramError::InvalidServerMessage("missing 'v=' prefix".to_string()))?;
        let signature = BASE64
            .decode(encoded.trim_end())
            .map_err(|_| ScramError::Base64("invalid server signature encoding".to_string()))?;

        let expected = hmac_sha256(&state.server_key, &state.auth_message);
        if constant_time_eq(&signature, &expected) {
            Ok(())
        } else {
            Err(ScramError::InvalidServerProof(
                "server signature verification failed".to_string(),
            ))
        }
    }
}

struct ServerFirst<'a> {
    nonce: &'a str,
    salt: &'a str,
    iterations: u32,
}

impl<'a> ServerFirst<'a> {
    /// r=<nonce>,s=<salt>,i=<iterations>
    fn parse(msg: &'a str) -> Result<Self, ScramError> {
        let mut nonce = None;
        let mut salt = None;
        let mut iterations = None;

        for part in msg.split(',') {
            match part.split_once('=') {
                Some(("r", value)) => nonce = Some(value),
                Some(("s", value)) => salt = Some(value),
                Some(("i", value)) => iterations = Some(value),
                _ => {}
            }
        }

        let (nonce, salt, iterations) = match (nonce, salt, iterations) {
            (Some(n), Some(s), Some(i)) if !n.is_empty() && !s.is_empty() => (n, s, i),
            _ => {
                return Err(ScramError::InvalidServerMessage(
                    "missing required fields in server first message".to_string(),
                ))
            }
        };

        let iterations = iterations
            .parse::<u32>()
            .ok()
            .filter(|&i| i > 0)
            .ok_or_else(|| ScramError::InvalidServerMessage("invalid iteration count".into()))?;

        Ok(Self {
            nonce,
            salt,
            iterations,
        })
    }
}

fn salted_password(password: &str, salt: &[u8], iterations: u32) -> [u8; 32] {
    let mut out = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut out);
    out
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
