//! Single-use access tokens for the media-stream endpoint
//!
//! A token is minted when a call-setup webhook passes signature validation and
//! is embedded in the stream instructions returned to the telephony provider.
//! The media-stream connection must present it before any audio is relayed.
//!
//! The store is created once at startup and shared through `AppState`; it is
//! the only state shared between calls.

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use dashmap::DashMap;
use rand::RngCore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::TokenError;

/// Lifetime of an access token
pub const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(60);

/// Random bytes per token (256 bits)
const TOKEN_BYTES: usize = 32;

/// A short-lived credential for one media-stream connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub issued_at: Instant,
    pub expires_at: Instant,
    pub consumed: bool,
}

impl AccessToken {
    fn generate(now: Instant) -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rng().fill_bytes(&mut bytes);

        Self {
            value: URL_SAFE_NO_PAD.encode(bytes),
            issued_at: now,
            expires_at: now + ACCESS_TOKEN_TTL,
            consumed: false,
        }
    }

    /// A token is expired strictly after `expires_at`
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// Concurrent map of outstanding access tokens keyed by value
///
/// Redemption takes the shard write lock for the token's key, so concurrent
/// attempts on one value are serialized and at most one of them succeeds.
/// A successfully redeemed token stays behind as a consumed marker until it
/// expires, which lets a replay be reported as `AlreadyConsumed`; any failed
/// attempt removes the entry outright.
#[derive(Debug, Default)]
pub struct TokenStore {
    tokens: DashMap<String, AccessToken>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint and store a new token
    pub fn issue(&self) -> AccessToken {
        self.issue_at(Instant::now())
    }

    pub fn issue_at(&self, now: Instant) -> AccessToken {
        let token = AccessToken::generate(now);
        self.tokens.insert(token.value.clone(), token.clone());
        debug!(outstanding = self.tokens.len(), "Issued media-stream token");
        token
    }

    /// Redeem a token presented by a media-stream connection
    pub fn redeem(&self, value: &str) -> Result<(), TokenError> {
        self.redeem_at(value, Instant::now())
    }

    pub fn redeem_at(&self, value: &str, now: Instant) -> Result<(), TokenError> {
        let outcome = match self.tokens.get_mut(value) {
            None => return Err(TokenError::InvalidToken),
            Some(mut token) => {
                if token.is_expired_at(now) {
                    Err(TokenError::ExpiredToken)
                } else if token.consumed {
                    Err(TokenError::AlreadyConsumed)
                } else {
                    token.consumed = true;
                    Ok(())
                }
            }
        };

        // The shard guard is released above; removing while holding it would deadlock
        if outcome.is_err() {
            self.tokens.remove(value);
        }

        outcome
    }

    /// Drop every token past its expiry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub fn purge_expired_at(&self, now: Instant) -> usize {
        let before = self.tokens.len();
        self.tokens.retain(|_, token| !token.is_expired_at(now));
        before.saturating_sub(self.tokens.len())
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Periodically purge expired tokens until `shutdown` is cancelled
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        period: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Token sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let purged = store.purge_expired();
                        if purged > 0 {
                            info!(purged, remaining = store.len(), "Purged expired media-stream tokens");
                        }
                    }
                }
            }
        })
    }
}
