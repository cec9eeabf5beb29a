//! MQTT transport client
//!
//! Owns the rumqttc connection and the event loop task that feeds inbound
//! publishes through the topic codec into the dispatcher. Connecting seals
//! the handler registry; the broker connection is authorized with a
//! credential resolved (and refreshed if stale) at connect time.

use super::super::{ShutdownMode, Transport, TransportError};
use super::connection::{configure_mqtt_options, ConnectionState, ReconnectConfig};
use crate::auth::CredentialSource;
use crate::config::ClientConfig;
use crate::dispatch::{
    BoxError, DispatchError, Dispatcher, EventFilter, HandlerRegistry, WorkerPool,
};
use crate::error::{SdkError, SdkResult};
use crate::protocol::{DownlinkMessage, InboundEvent, TopicScheme, MQTT_SCHEME};
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, Event, EventLoop};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// MQTT transport client
pub struct MqttTransport {
    app_id: String,
    config: ClientConfig,
    scheme: TopicScheme,
    credentials: Option<Arc<dyn CredentialSource>>,
    registry: HandlerRegistry,
    reconnect: ReconnectConfig,
    client: Option<AsyncClient>,
    dispatcher: Option<Dispatcher>,
    state_rx: Option<watch::Receiver<ConnectionState>>,
    shutdown_tx: Option<watch::Sender<bool>>,
    event_loop_handle: Option<JoinHandle<()>>,
}

impl MqttTransport {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            app_id: config.app.id.clone(),
            config,
            scheme: MQTT_SCHEME,
            credentials: None,
            registry: HandlerRegistry::new(),
            reconnect: ReconnectConfig::default(),
            client: None,
            dispatcher: None,
            state_rx: None,
            shutdown_tx: None,
            event_loop_handle: None,
        }
    }

    /// Authorize the broker connection through a credential source. The
    /// source is consulted at connect time, so an expiring credential is
    /// refreshed before it reaches the broker.
    pub fn with_credentials(mut self, source: Arc<dyn CredentialSource>) -> Self {
        self.credentials = Some(source);
        self
    }

    /// Override the reconnect backoff schedule.
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Register an uplink handler. Fails once connected.
    pub fn on_uplink<F, Fut>(&mut self, filter: EventFilter, handler: F) -> Result<(), DispatchError>
    where
        F: Fn(InboundEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.registry.on_uplink(filter, handler)
    }

    /// Register an activation handler. Fails once connected.
    pub fn on_activation<F, Fut>(
        &mut self,
        filter: EventFilter,
        handler: F,
    ) -> Result<(), DispatchError>
    where
        F: Fn(InboundEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.registry.on_activation(filter, handler)
    }

    /// Register a generic device-event handler. Fails once connected.
    pub fn on_device_event<F, Fut>(
        &mut self,
        filter: EventFilter,
        handler: F,
    ) -> Result<(), DispatchError>
    where
        F: Fn(InboundEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.registry.on_device_event(filter, handler)
    }

    /// Register a connect handler. Fails once connected.
    pub fn on_connect<F, Fut>(&mut self, handler: F) -> Result<(), DispatchError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.registry.on_connect(handler)
    }

    /// Register an error handler. Fails once connected.
    pub fn on_error<F, Fut>(&mut self, handler: F) -> Result<(), DispatchError>
    where
        F: Fn(Arc<SdkError>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.registry.on_error(handler)
    }

    /// Current connection state, if the transport was ever connected
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.state_rx.as_ref().map(|rx| rx.borrow().clone())
    }

    async fn wait_for_connection(
        mut state_rx: watch::Receiver<ConnectionState>,
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let wait = async {
            loop {
                if state_rx.changed().await.is_err() {
                    return Err(TransportError::ConnectionFailed(
                        "state channel closed".to_string(),
                    ));
                }
                match &*state_rx.borrow() {
                    ConnectionState::Connected => return Ok(()),
                    ConnectionState::Disconnected(reason) => {
                        return Err(TransportError::ConnectionFailed(reason.clone()));
                    }
                    ConnectionState::Connecting | ConnectionState::Reconnecting(_) => continue,
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::ConnectionFailed(
                "no connection acknowledgement received".to_string(),
            )),
        }
    }

    /// Event loop: feeds inbound publishes into the dispatcher and sleeps on
    /// the backoff schedule between reconnection attempts. Connection loss is
    /// surfaced through the error-handler channel, never thrown.
    async fn run_event_loop(
        mut event_loop: EventLoop,
        client: AsyncClient,
        dispatcher: Dispatcher,
        scheme: TopicScheme,
        patterns: Vec<String>,
        state_tx: watch::Sender<ConnectionState>,
        mut shutdown_rx: watch::Receiver<bool>,
        reconnect: ReconnectConfig,
    ) {
        let mut attempt: u32 = 0;
        loop {
            let event = tokio::select! {
                _ = shutdown_rx.changed() => {
                    debug!("event loop shutting down");
                    break;
                }
                event = event_loop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!(subscriptions = patterns.len(), "connected to broker");
                    attempt = 0;
                    for pattern in &patterns {
                        if let Err(e) = client.subscribe(pattern.clone(), QoS::AtLeastOnce).await {
                            error!(%pattern, error = %e, "subscription failed");
                            dispatcher.report_error(Arc::new(SdkError::Transport(
                                TransportError::SubscriptionFailed(Box::new(e)),
                            )));
                        }
                    }
                    let _ = state_tx.send(ConnectionState::Connected);
                    dispatcher.notify_connected();
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let topic = String::from_utf8_lossy(&publish.topic).to_string();
                    dispatcher.handle_frame(&scheme, &topic, publish.payload);
                }
                Ok(Event::Incoming(Packet::Disconnect(disconnect))) => {
                    warn!(?disconnect, "broker requested disconnect");
                }
                Ok(_) => {}
                Err(e) => {
                    let reason = e.to_string();
                    // First failure after a healthy connection: make the loss
                    // observable through the error channel
                    if attempt == 0 {
                        let _ = state_tx.send(ConnectionState::Disconnected(reason.clone()));
                        dispatcher.report_error(Arc::new(SdkError::Transport(
                            TransportError::ConnectionLost(reason.clone()),
                        )));
                    }
                    attempt += 1;
                    let delay = reconnect.backoff_delay(attempt);
                    warn!(attempt, ?delay, %reason, "connection error, backing off");
                    let _ = state_tx.send(ConnectionState::Reconnecting(attempt));
                    tokio::select! {
                        _ = shutdown_rx.changed() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl Transport for MqttTransport {
    type Error = SdkError;

    async fn connect(&mut self) -> SdkResult<()> {
        if self.client.is_some() {
            return Err(TransportError::ConnectionFailed("already connected".to_string()).into());
        }

        // Resolve the connection credential first: an expiring token is
        // refreshed here, before the broker sees it
        let credential = match &self.credentials {
            Some(source) => Some(source.credential().await?),
            None => None,
        };

        let options = configure_mqtt_options(
            &self.app_id,
            &self.config.network,
            credential.as_ref(),
        )?;
        let (client, event_loop) = AsyncClient::new(options, 10);

        let handlers = self.registry.seal();
        let patterns = handlers.subscription_patterns(&self.scheme);
        let pool = WorkerPool::new(self.config.dispatch.max_concurrency);
        let dispatcher = Dispatcher::new(handlers, pool);

        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(Self::run_event_loop(
            event_loop,
            client.clone(),
            dispatcher.clone(),
            self.scheme,
            patterns,
            state_tx,
            shutdown_rx,
            self.reconnect.clone(),
        ));

        if let Err(e) = Self::wait_for_connection(state_rx.clone(), CONNECT_TIMEOUT).await {
            let _ = shutdown_tx.send(true);
            handle.abort();
            let _ = handle.await;
            return Err(e.into());
        }

        self.client = Some(client);
        self.dispatcher = Some(dispatcher);
        self.state_rx = Some(state_rx);
        self.shutdown_tx = Some(shutdown_tx);
        self.event_loop_handle = Some(handle);
        info!(app_id = %self.app_id, "MQTT transport connected");
        Ok(())
    }

    async fn disconnect(&mut self, mode: ShutdownMode) -> SdkResult<()> {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }

        if let Some(dispatcher) = self.dispatcher.take() {
            if let ShutdownMode::Graceful(timeout) = mode {
                if !dispatcher.pool().drain(timeout).await {
                    warn!(
                        in_flight = dispatcher.pool().in_flight(),
                        "drain timeout expired, closing with handlers in flight"
                    );
                }
            }
        }

        if let Some(client) = self.client.take() {
            // The broker may already be gone; shutdown proceeds regardless
            if let Err(e) = client.disconnect().await {
                debug!(error = %e, "disconnect request failed");
            }
        }

        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
            let _ = handle.await;
        }

        self.state_rx = None;
        info!(app_id = %self.app_id, "MQTT transport disconnected");
        Ok(())
    }

    async fn publish_downlink(
        &self,
        device_id: &str,
        downlink: &DownlinkMessage,
    ) -> SdkResult<()> {
        let Some(client) = &self.client else {
            return Err(TransportError::NotConnected {
                state: self.connection_state(),
            }
            .into());
        };

        let topic = self.scheme.downlink_topic(&self.app_id, device_id);
        let payload = serde_json::to_vec(downlink).map_err(TransportError::Serialization)?;
        debug!(%topic, "publishing downlink");
        client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| TransportError::PublishFailed(Box::new(e)))?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        matches!(self.connection_state(), Some(ConnectionState::Connected))
    }
}
