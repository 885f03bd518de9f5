mod store;

use std::fmt;

pub use store::CredentialStore;

use crate::error::TryOnError;

/// Key under which the credential is persisted.
pub const CREDENTIAL_KEY: &str = "GEMINI_API_KEY";

/// Service credential. Never printed: `Debug` and `Display` are redacted.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_string())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("Credential(<empty>)")
        } else {
            f.write_str("Credential(<redacted>)")
        }
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("<empty>")
        } else {
            f.write_str("<redacted>")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    NoCredential,
    HasCredential,
}

/// Where the active credential was resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialOrigin {
    Configured,
    Stored,
    UserEntry,
    Missing,
}

/// Holds the process-wide credential and gates pipeline entry on it.
#[derive(Clone)]
pub struct CredentialGate {
    configured: Vec<Option<String>>,
    store: Option<CredentialStore>,
    current: Credential,
    origin: CredentialOrigin,
}

impl fmt::Debug for CredentialGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialGate")
            .field("configured", &self.configured.len())
            .field("store", &self.store)
            .field("current", &self.current)
            .field("origin", &self.origin)
            .finish()
    }
}

impl CredentialGate {
    /// Resolves the initial credential: first non-blank configured value,
    /// then the stored value, else empty.
    pub fn new(configured: Vec<Option<String>>, store: Option<CredentialStore>) -> Self {
        let mut gate = Self {
            configured,
            store,
            current: Credential::default(),
            origin: CredentialOrigin::Missing,
        };
        gate.reload();
        gate
    }

    pub fn from_environment(store: Option<CredentialStore>) -> Self {
        let mut configured = build_time_credentials();
        configured.extend(runtime_env_credentials());
        Self::new(configured, store)
    }

    pub fn credential(&self) -> &Credential {
        &self.current
    }

    pub fn origin(&self) -> CredentialOrigin {
        self.origin
    }

    pub fn state(&self) -> CredentialState {
        if self.current.is_empty() {
            CredentialState::NoCredential
        } else {
            CredentialState::HasCredential
        }
    }

    /// Validates and persists a user-entered credential.
    pub fn set_credential(&mut self, raw: &str) -> Result<(), TryOnError> {
        let credential = Credential::new(raw);
        if credential.is_empty() {
            return Err(TryOnError::MissingCredential);
        }
        if let Some(store) = &self.store {
            store.set(CREDENTIAL_KEY, credential.expose())?;
        }
        self.current = credential;
        self.origin = CredentialOrigin::UserEntry;
        Ok(())
    }

    pub fn require_credential(&self) -> Result<&Credential, TryOnError> {
        if self.current.is_empty() {
            return Err(TryOnError::MissingCredential);
        }
        Ok(&self.current)
    }

    /// Drops the stored credential and falls back to configured values.
    pub fn clear_stored(&mut self) -> Result<bool, TryOnError> {
        let removed = match &self.store {
            Some(store) => store.remove(CREDENTIAL_KEY)?,
            None => false,
        };
        self.reload();
        Ok(removed)
    }

    fn reload(&mut self) {
        let configured = self
            .configured
            .iter()
            .flatten()
            .map(Credential::new)
            .find(|credential| !credential.is_empty());
        if let Some(credential) = configured {
            self.current = credential;
            self.origin = CredentialOrigin::Configured;
            return;
        }
        match self.store.as_ref().and_then(|store| store.get(CREDENTIAL_KEY)) {
            Some(stored) => {
                self.current = Credential::new(stored);
                self.origin = CredentialOrigin::Stored;
            }
            None => {
                self.current = Credential::default();
                self.origin = CredentialOrigin::Missing;
            }
        }
    }
}

/// Values baked in when the crate was compiled.
pub fn build_time_credentials() -> Vec<Option<String>> {
    vec![
        option_env!("TRYON_GEMINI_API_KEY").map(str::to_string),
        option_env!("GEMINI_API_KEY").map(str::to_string),
    ]
}

fn runtime_env_credentials() -> Vec<Option<String>> {
    ["GEMINI_API_KEY", "GOOGLE_API_KEY"]
        .into_iter()
        .map(|key| std::env::var(key).ok())
        .collect()
}
