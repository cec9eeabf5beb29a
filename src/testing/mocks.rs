//! Mock implementations for testing
//!
//! [`MockTransport`] records published downlinks and exposes a frame-injection
//! path so tests can drive the dispatcher exactly the way the event loop does.
//! [`MockCredentialSource`] hands out a fixed credential and counts refreshes.

use crate::auth::{AuthError, Credential, CredentialSource};
use crate::dispatch::Dispatcher;
use crate::protocol::{DownlinkMessage, TopicScheme};
use crate::transport::{ShutdownMode, Transport, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Mock transport for testing
///
/// Holds a dispatcher built by the test and feeds injected frames through the
/// same codec path the MQTT event loop uses.
pub struct MockTransport {
    pub scheme: TopicScheme,
    dispatcher: Dispatcher,
    connected: AtomicBool,
    should_fail: bool,
    published: Mutex<Vec<(String, DownlinkMessage)>>,
}

impl MockTransport {
    pub fn new(scheme: TopicScheme, dispatcher: Dispatcher) -> Self {
        Self {
            scheme,
            dispatcher,
            connected: AtomicBool::new(false),
            should_fail: false,
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Inject one raw inbound frame, as if the broker delivered it.
    pub fn inject_frame(&self, topic: &str, payload: impl Into<Bytes>) {
        self.dispatcher
            .handle_frame(&self.scheme, topic, payload.into());
    }

    /// Surface a transport error through the error-handler channel.
    pub fn inject_connection_loss(&self, reason: &str) {
        self.connected.store(false, Ordering::SeqCst);
        self.dispatcher.report_error(Arc::new(
            TransportError::ConnectionLost(reason.to_string()).into(),
        ));
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn published_downlinks(&self) -> Vec<(String, DownlinkMessage)> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = crate::error::SdkError;

    async fn connect(&mut self) -> Result<(), Self::Error> {
        if self.should_fail {
            return Err(TransportError::ConnectionFailed("mock failure".to_string()).into());
        }
        self.connected.store(true, Ordering::SeqCst);
        self.dispatcher.notify_connected();
        Ok(())
    }

    async fn disconnect(&mut self, mode: ShutdownMode) -> Result<(), Self::Error> {
        if let ShutdownMode::Graceful(timeout) = mode {
            self.dispatcher.pool().drain(timeout).await;
        }
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn publish_downlink(
        &self,
        device_id: &str,
        downlink: &DownlinkMessage,
    ) -> Result<(), Self::Error> {
        if self.should_fail {
            return Err(TransportError::PublishFailed("mock failure".into()).into());
        }
        self.published
            .lock()
            .await
            .push((device_id.to_string(), downlink.clone()));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Credential source handing out a fixed credential, counting calls
pub struct MockCredentialSource {
    credential: Credential,
    pub refreshes: AtomicUsize,
}

impl MockCredentialSource {
    pub fn new(credential: Credential) -> Self {
        Self {
            credential,
            refreshes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CredentialSource for MockCredentialSource {
    async fn credential(&self) -> Result<Credential, AuthError> {
        if self.credential.is_expired() && !self.credential.can_refresh() {
            return Err(AuthError::Expired);
        }
        Ok(self.credential.clone())
    }

    async fn refresh(&self) -> Result<Credential, AuthError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(self.credential.clone())
    }
}
