use async_trait::async_trait;

/// Source of bearer tokens for backend calls. `None` means the call goes out
/// unauthenticated.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn token(&self) -> Option<String>;
}

/// Token fixed at construction, typically read from settings or the
/// environment.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    pub fn new(token: Option<String>) -> Self {
        let token = token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        Self { token }
    }

    pub fn anonymous() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl AuthProvider for StaticTokenProvider {
    async fn token(&self) -> Option<String> {
        self.token.clone()
    }
}
