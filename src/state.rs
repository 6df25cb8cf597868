//! Shared application state.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;

use crate::auth::TokenStore;
use crate::config::ServerConfig;

/// Rejection when no call slot is free
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum CallLimitError {
    #[error("Concurrent call limit reached")]
    GlobalLimitReached,
}

/// State shared by every handler
pub struct AppState {
    pub config: ServerConfig,
    /// Outstanding media-stream access tokens
    pub tokens: Arc<TokenStore>,
    active_calls: AtomicUsize,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            tokens: Arc::new(TokenStore::new()),
            active_calls: AtomicUsize::new(0),
        })
    }

    pub fn active_calls(&self) -> usize {
        self.active_calls.load(Ordering::SeqCst)
    }

    /// Whether a new call would be turned away
    pub fn at_call_capacity(&self) -> bool {
        self.config
            .max_concurrent_calls
            .is_some_and(|max| self.active_calls() >= max)
    }

    /// Reserve a call slot, released when the returned guard drops
    pub fn try_acquire_call(self: &Arc<Self>) -> Result<CallSlot, CallLimitError> {
        let max = self.config.max_concurrent_calls.unwrap_or(usize::MAX);
        self.active_calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current < max).then_some(current + 1)
            })
            .map_err(|_| CallLimitError::GlobalLimitReached)?;

        Ok(CallSlot {
            state: Arc::clone(self),
        })
    }
}

/// An occupied call slot
#[derive(Debug)]
pub struct CallSlot {
    state: Arc<AppState>,
}

impl Drop for CallSlot {
    fn drop(&mut self) {
        self.state.active_calls.fetch_sub(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("active_calls", &self.active_calls())
            .field("outstanding_tokens", &self.tokens.len())
            .finish()
    }
}
