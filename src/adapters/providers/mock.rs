//! Mock streaming provider for testing.
//!
//! # Features
//!
//! - Simulated handshake latency for concurrency tests
//! - Handshake failure injection
//! - Counters for sessions opened and stopped
//! - Event injection into every live session
//!
//! # Example
//!
//! ```ignore
//! let provider = Arc::new(MockStreamingProvider::new(Provider::Chat)
//!     .with_connect_delay(Duration::from_millis(20)));
//!
//! provider.emit(ProviderEvent::new("message", json!({"text": "hi"}))).await;
//! assert_eq!(provider.connect_count(), 1);
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::domain::sync::Provider;
use crate::ports::{
    AccountCredentials, ExternalAccount, ProviderError, ProviderEvent, StreamingProvider,
    StreamingSession,
};

/// Mock provider for testing.
///
/// # Panics
///
/// Methods may panic if internal locks are poisoned. This is acceptable
/// for test code but this adapter should NOT be used in production.
#[derive(Debug)]
pub struct MockStreamingProvider {
    provider: Provider,
    delay: Duration,
    fail_next: AtomicBool,
    connects: AtomicUsize,
    stops: Arc<AtomicUsize>,
    sent: Arc<Mutex<Vec<(String, String)>>>,
    listeners: Mutex<Vec<mpsc::Sender<ProviderEvent>>>,
}

impl MockStreamingProvider {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            delay: Duration::ZERO,
            fail_next: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            stops: Arc::new(AtomicUsize::new(0)),
            sent: Arc::new(Mutex::new(Vec::new())),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Simulated latency of every handshake.
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Makes the next handshake fail.
    pub fn fail_next_connect(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Sessions successfully opened.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Sessions stopped.
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// `(channel_or_thread_id, message)` pairs sent through any session.
    pub fn sent_messages(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("MockStreamingProvider: sent lock poisoned").clone()
    }

    /// Pushes an event into every session still listening.
    pub async fn emit(&self, event: ProviderEvent) {
        let listeners: Vec<_> = self
            .listeners
            .lock()
            .expect("MockStreamingProvider: listeners lock poisoned")
            .clone();
        for listener in listeners {
            let _ = listener.send(event.clone()).await;
        }
    }
}

#[async_trait]
impl StreamingProvider for MockStreamingProvider {
    fn provider(&self) -> Provider {
        self.provider
    }

    async fn connect(
        &self,
        _account: &ExternalAccount,
        credentials: &AccountCredentials,
        events: mpsc::Sender<ProviderEvent>,
    ) -> Result<Box<dyn StreamingSession>, ProviderError> {
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ProviderError::Handshake("mock handshake failure".to_string()));
        }
        if credentials.access_token.expose_secret().is_empty() {
            return Err(ProviderError::Handshake("empty access token".to_string()));
        }

        self.connects.fetch_add(1, Ordering::SeqCst);
        self.listeners
            .lock()
            .expect("MockStreamingProvider: listeners lock poisoned")
            .push(events);

        Ok(Box::new(MockSession {
            stopped: AtomicBool::new(false),
            stops: self.stops.clone(),
            sent: self.sent.clone(),
        }))
    }
}

struct MockSession {
    stopped: AtomicBool,
    stops: Arc<AtomicUsize>,
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl StreamingSession for MockSession {
    async fn send_message(&self, channel_or_thread_id: &str, message: &str) -> Result<(), ProviderError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ProviderError::Closed);
        }
        self.sent
            .lock()
            .expect("MockSession: sent lock poisoned")
            .push((channel_or_thread_id.to_string(), message.to_string()));
        Ok(())
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
