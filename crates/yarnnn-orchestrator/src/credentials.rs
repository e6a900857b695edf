//! Concrete `CredentialsResolver` (§4.4 Step 6): looks a connection up by
//! `(user_id, platform)` and hands the exporter its already-decrypted access
//! token. Refresh itself happens opportunistically during the platform-sync
//! phase (§4.2) via `TokenManager::get_valid_access_token`, so by the time a
//! deliverable run reaches delivery the stored ciphertext is already live —
//! this resolver only ever decrypts, it never calls out to a provider.

use std::sync::Arc;

use tracing::warn;

use yarnnn_core::crypto::TokenCipher;
use yarnnn_core::types::{Platform, UserId};
use yarnnn_deliverables::CredentialsResolver;
use yarnnn_exporters::ExporterContext;

use crate::connections::ConnectionStore;

pub struct ConnectionCredentialsResolver {
    connections: Arc<ConnectionStore>,
    cipher: TokenCipher,
}

impl ConnectionCredentialsResolver {
    pub fn new(connections: Arc<ConnectionStore>, cipher: TokenCipher) -> Self {
        Self { connections, cipher }
    }
}

impl CredentialsResolver for ConnectionCredentialsResolver {
    fn resolve(&self, user_id: &UserId, platform: &str) -> ExporterContext {
        let empty = ExporterContext {
            user_id: user_id.as_str().to_string(),
            access_token: String::new(),
            refresh_token: None,
            metadata: Default::default(),
        };

        let Ok(platform) = platform.parse::<Platform>() else {
            warn!(%platform, "credentials resolver asked for an unknown platform");
            return empty;
        };

        let connection = match self.connections.get_by_user_platform(user_id.as_str(), platform) {
            Ok(Some(connection)) => connection,
            Ok(None) => return empty,
            Err(err) => {
                warn!(%user_id, %platform, error = %err, "failed to look up connection for credentials");
                return empty;
            }
        };

        let access_token = match self.cipher.decrypt(&connection.credentials.access_ciphertext) {
            Ok(token) => token,
            Err(err) => {
                warn!(%user_id, %platform, error = %err, "failed to decrypt stored access token");
                return empty;
            }
        };
        let refresh_token = connection
            .credentials
            .refresh_ciphertext
            .as_ref()
            .and_then(|ct| self.cipher.decrypt(ct).ok());

        ExporterContext {
            user_id: user_id.as_str().to_string(),
            access_token,
            refresh_token,
            metadata: connection.provider_metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use yarnnn_core::types::ConnectionStatus;
    use yarnnn_platform_sync::{Credentials, PlatformConnection};

    fn cipher() -> TokenCipher {
        let key = base64::engine::general_purpose::STANDARD.encode([3u8; 32]);
        TokenCipher::new(&key).unwrap()
    }

    #[test]
    fn resolves_a_decrypted_token_for_a_known_connection() {
        let cipher = cipher();
        let store = Arc::new(crate::connections::ConnectionStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap());
        let connection = PlatformConnection {
            id: Default::default(),
            user_id: UserId::from("u1"),
            platform: Platform::Slack,
            credentials: Credentials {
                access_ciphertext: cipher.encrypt("plain-token"),
                refresh_ciphertext: None,
                expires_at: None,
            },
            provider_metadata: Default::default(),
            status: ConnectionStatus::Connected,
            last_synced_at: None,
            landscape_discovered_at: None,
        };
        store.upsert(&connection, yarnnn_core::types::Tier::Free).unwrap();

        let resolver = ConnectionCredentialsResolver::new(store, cipher);
        let ctx = resolver.resolve(&UserId::from("u1"), "slack");
        assert_eq!(ctx.access_token, "plain-token");
    }

    #[test]
    fn returns_empty_context_for_unknown_connection() {
        let cipher = cipher();
        let store = Arc::new(crate::connections::ConnectionStore::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap());
        let resolver = ConnectionCredentialsResolver::new(store, cipher);
        let ctx = resolver.resolve(&UserId::from("ghost"), "notion");
        assert!(ctx.access_token.is_empty());
    }
}
