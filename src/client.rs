// SPDX-License-Identifier: MPL-2.0

//! Tokio shell around the sans-I/O engine.
//!
//! [`MqttClient`] hands commands to a single worker task over a channel and
//! returns immediately; completions come back through the caller's
//! [`EventHandler`]. The worker owns the transport and is the only task
//! that ever writes to it, so packets are never interleaved on the wire.
//! All protocol state lives in the [`Engine`]; the worker is I/O glue:
//! open the transport when the engine wants one, feed it bytes and clock
//! ticks, write out whatever it produces.

use std::time::Instant;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::delivery::{DeliveryHandle, DeliveryOutcome, ReceivedMessage};
use crate::engine::{ConnectionState, Engine, Event, SubscribeHandle};
use crate::error::ClientError;
use crate::options::ClientOptions;
use crate::transport::{TcpTransport, Transport};

/// Caller-side observer for everything the client does asynchronously.
///
/// The typed replacement for a delegate protocol: register once, receive
/// state changes, inbound messages, and operation completions.
#[async_trait]
pub trait EventHandler: Send {
    async fn on_connection_state(&mut self, state: &ConnectionState) {
        let _ = state;
    }

    async fn on_message(&mut self, message: &ReceivedMessage) {
        let _ = message;
    }

    async fn on_delivery_complete(&mut self, handle: DeliveryHandle, outcome: &DeliveryOutcome) {
        let _ = (handle, outcome);
    }

    async fn on_subscribe_complete(&mut self, handle: SubscribeHandle, return_codes: &[u8]) {
        let _ = (handle, return_codes);
    }

    async fn on_unsubscribe_complete(&mut self, handle: SubscribeHandle) {
        let _ = handle;
    }

    async fn on_error(&mut self, error: &ClientError) {
        let _ = error;
    }
}

enum Command {
    Connect,
    Disconnect,
    Publish {
        topic: String,
        payload: Vec<u8>,
        qos: u8,
        retain: bool,
        reply: oneshot::Sender<Result<DeliveryHandle, ClientError>>,
    },
    Subscribe {
        filter: String,
        qos: u8,
        reply: oneshot::Sender<Result<SubscribeHandle, ClientError>>,
    },
    Unsubscribe {
        filter: String,
        reply: oneshot::Sender<Result<SubscribeHandle, ClientError>>,
    },
    Shutdown,
}

/// Async MQTT client handle. Cheap to clone; all clones feed the same
/// worker task.
#[derive(Clone)]
pub struct MqttClient {
    command_tx: mpsc::Sender<Command>,
}

impl MqttClient {
    /// Spawn the worker task and return the command handle.
    pub fn new(options: ClientOptions, handler: Box<dyn EventHandler>) -> Self {
        let (command_tx, command_rx) = mpsc::channel(64);
        let worker = Worker {
            engine: Engine::new(options),
            handler,
            command_rx,
            transport: None,
        };
        tokio::spawn(worker.run());
        MqttClient { command_tx }
    }

    /// Begin connecting to the configured broker. Non-blocking; progress is
    /// reported through `on_connection_state`.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.send(Command::Connect).await
    }

    /// Gracefully disconnect. Outstanding deliveries are abandoned and
    /// their completions fired.
    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.send(Command::Disconnect).await
    }

    /// Queue a publish. The returned handle identifies the eventual
    /// `on_delivery_complete` callback.
    pub async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        qos: u8,
        retain: bool,
    ) -> Result<DeliveryHandle, ClientError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Publish {
            topic: topic.to_string(),
            payload,
            qos,
            retain,
            reply,
        })
        .await?;
        response.await.map_err(|_| Self::worker_gone())?
    }

    pub async fn subscribe(&self, filter: &str, qos: u8) -> Result<SubscribeHandle, ClientError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Subscribe {
            filter: filter.to_string(),
            qos,
            reply,
        })
        .await?;
        response.await.map_err(|_| Self::worker_gone())?
    }

    pub async fn unsubscribe(&self, filter: &str) -> Result<SubscribeHandle, ClientError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Unsubscribe {
            filter: filter.to_string(),
            reply,
        })
        .await?;
        response.await.map_err(|_| Self::worker_gone())?
    }

    /// Stop the worker task. Disconnects first if needed.
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        self.send(Command::Shutdown).await
    }

    async fn send(&self, command: Command) -> Result<(), ClientError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| Self::worker_gone())
    }

    fn worker_gone() -> ClientError {
        ClientError::Transport("client worker is no longer running".to_string())
    }
}

struct Worker {
    engine: Engine,
    handler: Box<dyn EventHandler>,
    command_rx: mpsc::Receiver<Command>,
    transport: Option<TcpTransport>,
}

impl Worker {
    async fn run(mut self) {
        loop {
            // The engine signals its transport needs through state alone:
            // Connecting without a socket means open one, and any settled
            // state with a socket still around means close it.
            if matches!(self.engine.state(), ConnectionState::Connecting)
                && self.transport.is_none()
            {
                self.open_transport().await;
            }

            self.flush().await;

            if matches!(
                self.engine.state(),
                ConnectionState::Disconnected | ConnectionState::Reconnecting { .. }
            ) && self.transport.is_some()
            {
                self.close_transport().await;
            }

            let deadline = self.engine.next_deadline();

            tokio::select! {
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(Command::Shutdown) | None => {
                            self.engine.disconnect(Instant::now());
                            self.flush().await;
                            self.close_transport().await;
                            break;
                        }
                        Some(command) => self.handle_command(command).await,
                    }
                }

                read_result = async {
                    match &mut self.transport {
                        Some(transport) => {
                            let mut buffer = vec![0u8; 4096];
                            match transport.read(&mut buffer).await {
                                Ok(0) => Ok(None),
                                Ok(n) => {
                                    buffer.truncate(n);
                                    Ok(Some(buffer))
                                }
                                Err(e) => Err(e),
                            }
                        }
                        None => std::future::pending().await,
                    }
                } => {
                    let now = Instant::now();
                    match read_result {
                        Ok(Some(bytes)) => {
                            let events = self.engine.handle_incoming(&bytes, now);
                            self.dispatch(events).await;
                        }
                        Ok(None) => {
                            self.engine.transport_error("connection closed by peer", now);
                            self.transport = None;
                        }
                        Err(e) => {
                            self.engine.transport_error(&e.to_string(), now);
                            self.transport = None;
                        }
                    }
                }

                _ = async {
                    match deadline {
                        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
                        None => std::future::pending().await,
                    }
                } => {
                    let events = self.engine.handle_tick(Instant::now());
                    self.dispatch(events).await;
                }
            }
        }
        debug!("client worker stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        let now = Instant::now();
        match command {
            Command::Connect => self.engine.connect(now),
            Command::Disconnect => self.engine.disconnect(now),
            Command::Publish {
                topic,
                payload,
                qos,
                retain,
                reply,
            } => {
                let result = self.engine.publish(&topic, payload, qos, retain, now);
                let _ = reply.send(result);
            }
            Command::Subscribe { filter, qos, reply } => {
                let result = self.engine.subscribe(&filter, qos, now);
                let _ = reply.send(result);
            }
            Command::Unsubscribe { filter, reply } => {
                let result = self.engine.unsubscribe(&filter, now);
                let _ = reply.send(result);
            }
            Command::Shutdown => unreachable!("handled in the run loop"),
        }
    }

    /// Write out everything the engine produced, then hand its events to
    /// the caller's handler.
    async fn flush(&mut self) {
        let frames = self.engine.take_outgoing();
        let mut write_error = None;

        if let Some(transport) = &mut self.transport {
            for frame in &frames {
                if let Err(e) = transport.write_all(frame).await {
                    write_error = Some(e.to_string());
                    break;
                }
            }
            if write_error.is_none() {
                if let Err(e) = transport.flush().await {
                    write_error = Some(e.to_string());
                }
            }
        } else if !frames.is_empty() {
            debug!(count = frames.len(), "dropping frames with no transport");
        }

        if let Some(reason) = write_error {
            self.engine.transport_error(&reason, Instant::now());
            self.transport = None;
        }

        let events = self.engine.take_events();
        self.dispatch(events).await;
    }

    async fn dispatch(&mut self, events: Vec<Event>) {
        for event in events {
            match event {
                Event::ConnectionState(state) => {
                    self.handler.on_connection_state(&state).await;
                }
                Event::Message(message) => {
                    self.handler.on_message(&message).await;
                }
                Event::DeliveryComplete { handle, outcome } => {
                    self.handler.on_delivery_complete(handle, &outcome).await;
                }
                Event::SubscribeComplete {
                    handle,
                    return_codes,
                } => {
                    self.handler
                        .on_subscribe_complete(handle, &return_codes)
                        .await;
                }
                Event::UnsubscribeComplete { handle } => {
                    self.handler.on_unsubscribe_complete(handle).await;
                }
                Event::Error(error) => {
                    self.handler.on_error(&error).await;
                }
            }
        }
    }

    async fn open_transport(&mut self) {
        let peer = self.engine.options().peer();
        let timeout = self.engine.options().connect_timeout;
        debug!(%peer, "opening transport");

        match tokio::time::timeout(timeout, TcpTransport::connect(&peer)).await {
            Ok(Ok(transport)) => {
                if let Err(e) = transport.set_nodelay(true) {
                    warn!(error = %e, "failed to set TCP_NODELAY");
                }
                self.transport = Some(transport);
                self.engine.transport_opened(Instant::now());
            }
            Ok(Err(e)) => {
                self.engine.transport_error(&e.to_string(), Instant::now());
            }
            Err(_) => {
                self.engine
                    .transport_error("transport connect timed out", Instant::now());
            }
        }
    }

    async fn close_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            debug!("closing transport");
            if let Err(e) = transport.close().await {
                debug!(error = %e, "error while closing transport");
            }
        }
    }
}
