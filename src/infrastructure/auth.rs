// Google Cloud credentials for the REST adapters
use anyhow::{Context, Result};
use gcp_auth::TokenProvider;
use std::sync::Arc;

pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

#[derive(Clone)]
enum Credentials {
    Provider(Arc<dyn TokenProvider>),
    Fixed(String),
}

/// Hands out bearer tokens from application default credentials.
/// Token caching and refresh are handled by the provider.
#[derive(Clone)]
pub struct GcpTokenSource {
    credentials: Credentials,
}

impl GcpTokenSource {
    pub async fn default_credentials() -> Result<Self> {
        let provider = gcp_auth::provider()
            .await
            .context("Failed to find Google Cloud credentials")?;
        Ok(Self {
            credentials: Credentials::Provider(provider),
        })
    }

    /// Always sends `token`, for emulators and local endpoints
    pub fn fixed(token: impl Into<String>) -> Self {
        Self {
            credentials: Credentials::Fixed(token.into()),
        }
    }

    /// Value for the `Authorization` header
    pub async fn bearer(&self) -> Result<String> {
        match &self.credentials {
            Credentials::Provider(provider) => {
                let token = provider
                    .token(&[CLOUD_PLATFORM_SCOPE])
                    .await
                    .context("Failed to obtain access token")?;
                Ok(format!("Bearer {}", token.as_str()))
            }
            Credentials::Fixed(token) => Ok(format!("Bearer {}", token)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_token_bearer() {
        let tokens = GcpTokenSource::fixed("local-token");
        assert_eq!(tokens.bearer().await.unwrap(), "Bearer local-token");
    }
}
