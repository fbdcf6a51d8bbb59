use std::fmt;

use chrono::{FixedOffset, Offset, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SHA-256 hex digest of an access token.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialFingerprint(pub String);

impl CredentialFingerprint {
    pub fn of(token: &str) -> Self {
        let digest = Sha256::digest(token.as_bytes());
        Self(digest.iter().map(|byte| format!("{byte:02x}")).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct Credential {
    token: SecretString,
    fingerprint: CredentialFingerprint,
}

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        let fingerprint = CredentialFingerprint::of(&token);
        Self { token: SecretString::from(token), fingerprint }
    }

    pub fn token(&self) -> &str {
        self.token.expose_secret()
    }

    pub fn fingerprint(&self) -> &CredentialFingerprint {
        &self.fingerprint
    }
}

/// The user acting in a chat, passed explicitly to every operation.
#[derive(Clone, Debug)]
pub struct Actor {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub credential: Option<Credential>,
    pub utc_offset: FixedOffset,
}

impl Actor {
    pub fn new(user_id: UserId, chat_id: ChatId, credential: Option<Credential>) -> Self {
        Self { user_id, chat_id, credential, utc_offset: Utc.fix() }
    }

    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = offset;
        self
    }
}
