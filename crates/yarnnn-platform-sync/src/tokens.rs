use async_trait::async_trait;
use chrono::{Duration, Utc};

use yarnnn_core::crypto::TokenCipher;

use crate::error::Result;
use crate::types::{Credentials, PlatformConnection};

/// Pre-expiry refresh window (§4.2 names 60s for Gmail; generalized to
/// every OAuth-based provider per SUPPLEMENTED FEATURES — a token within
/// this window of expiry is refreshed before use rather than on failure).
const REFRESH_SKEW: Duration = Duration::seconds(60);

/// Provider-specific refresh call, implemented by each OAuth-based client
/// (Gmail, Notion, Calendar — Slack bot tokens don't expire and never
/// implement this).
#[async_trait]
pub trait OAuthRefresher: Send + Sync {
    /// Exchange a refresh token for a new access token + expiry.
    async fn refresh(&self, refresh_token: &str) -> Result<(String, chrono::DateTime<Utc>)>;
}

/// Decrypts stored credentials and, for OAuth providers, refreshes ahead of
/// expiry — shared by every platform client per `original_source/api/
/// integrations/core/tokens.py`, instead of each provider reimplementing it.
pub struct TokenManager {
    cipher: TokenCipher,
}

impl TokenManager {
    pub fn new(cipher: TokenCipher) -> Self {
        Self { cipher }
    }

    /// Returns a decrypted, live access token, refreshing first if the
    /// stored token is within `REFRESH_SKEW` of `expires_at`.
    pub async fn get_valid_access_token(
        &self,
        connection: &mut PlatformConnection,
        refresher: Option<&dyn OAuthRefresher>,
    ) -> Result<String> {
        let needs_refresh = connection
            .credentials
            .expires_at
            .map(|exp| Utc::now() + REFRESH_SKEW >= exp)
            .unwrap_or(false);

        if needs_refresh {
            if let (Some(refresher), Some(refresh_ciphertext)) =
                (refresher, connection.credentials.refresh_ciphertext.as_ref())
            {
                let refresh_token = self.cipher.decrypt(refresh_ciphertext)?;
                let (new_access, new_expiry) = refresher.refresh(&refresh_token).await?;
                connection.credentials.access_ciphertext = self.cipher.encrypt(&new_access);
                connection.credentials.expires_at = Some(new_expiry);
            }
        }

        Ok(self.cipher.decrypt(&connection.credentials.access_ciphertext)?)
    }

    pub fn encrypt_credentials(&self, access: &str, refresh: Option<&str>, expires_at: Option<chrono::DateTime<Utc>>) -> Credentials {
        Credentials {
            access_ciphertext: self.cipher.encrypt(access),
            refresh_ciphertext: refresh.map(|r| self.cipher.encrypt(r)),
            expires_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use yarnnn_core::types::{ConnectionStatus, Platform, PlatformConnectionId, UserId};

    fn test_cipher() -> TokenCipher {
        let key = base64::engine::general_purpose::STANDARD.encode([7u8; 32]);
        TokenCipher::new(&key).unwrap()
    }

    fn connection(creds: Credentials) -> PlatformConnection {
        PlatformConnection {
            id: PlatformConnectionId::new(),
            user_id: UserId::from("u1"),
            platform: Platform::Gmail,
            credentials: creds,
            provider_metadata: Default::default(),
            status: ConnectionStatus::Connected,
            last_synced_at: None,
            landscape_discovered_at: None,
        }
    }

    struct CountingRefresher {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl OAuthRefresher for CountingRefresher {
        async fn refresh(&self, _refresh_token: &str) -> Result<(String, chrono::DateTime<Utc>)> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(("fresh-token".to_string(), Utc::now() + Duration::hours(1)))
        }
    }

    #[tokio::test]
    async fn refreshes_when_within_skew_window() {
        let manager = TokenManager::new(test_cipher());
        let creds =
            manager.encrypt_credentials("stale-token", Some("refresh-token"), Some(Utc::now() + Duration::seconds(10)));
        let mut conn = connection(creds);
        let refresher = CountingRefresher { calls: AtomicUsize::new(0) };

        let token = manager.get_valid_access_token(&mut conn, Some(&refresher)).await.unwrap();
        assert_eq!(token, "fresh-token");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn skips_refresh_when_token_has_headroom() {
        let manager = TokenManager::new(test_cipher());
        let creds =
            manager.encrypt_credentials("good-token", Some("refresh-token"), Some(Utc::now() + Duration::hours(1)));
        let mut conn = connection(creds);
        let refresher = CountingRefresher { calls: AtomicUsize::new(0) };

        let token = manager.get_valid_access_token(&mut conn, Some(&refresher)).await.unwrap();
        assert_eq!(token, "good-token");
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }
}
