/// Opaque bearer token for networked backends.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Source of the cached credential and signed-in state.
pub trait CredentialProvider: Send + Sync {
    /// The cached credential, if any.
    fn credential(&self) -> Option<Credential>;

    fn is_signed_in(&self) -> bool {
        self.credential().is_some()
    }
}

/// Credential fixed at construction (configuration or tests).
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    credential: Option<Credential>,
}

impl StaticCredentials {
    pub fn new(token: Option<String>) -> Self {
        Self {
            credential: token.filter(|t| !t.is_empty()).map(Credential::new),
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }
}

impl CredentialProvider for StaticCredentials {
    fn credential(&self) -> Option<Credential> {
        self.credential.clone()
    }
}
