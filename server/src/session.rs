//! Per-connection client sessions.
//!
//! A [`Session`] is the hub-facing handle of one WebSocket connection: an id
//! and a bounded outbound queue. [`serve`] runs the two pumps that move
//! frames between the socket and the hub until either side gives up.

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::game::{new_id, Player};
use crate::hub::Hub;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use log::{debug, error, info, warn};
use shared::Envelope;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{interval, timeout};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

pub type SessionId = String;

#[derive(Debug)]
pub struct Session {
    id: SessionId,
    outbound: mpsc::Sender<Envelope>,
}

impl Session {
    /// Creates a session with a fresh random id. The receiver feeds the
    /// outbound pump.
    pub fn new(queue_capacity: usize) -> (Arc<Self>, mpsc::Receiver<Envelope>) {
        Self::with_id(new_id(), queue_capacity)
    }

    pub fn with_id(
        id: impl Into<SessionId>,
        queue_capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Envelope>) {
        let (outbound, receiver) = mpsc::channel(queue_capacity);
        let session = Arc::new(Self {
            id: id.into(),
            outbound,
        });
        (session, receiver)
    }
}

impl Player for Session {
    fn id(&self) -> &str {
        &self.id
    }

    fn send(&self, envelope: Envelope) {
        match self.outbound.try_send(envelope) {
            Ok(()) => {}
            Err(TrySendError::Full(envelope)) => warn!(
                "session {}: send queue full, dropping {}",
                self.id, envelope.kind
            ),
            Err(TrySendError::Closed(_)) => {
                debug!("session {}: send queue closed", self.id)
            }
        }
    }
}

/// Runs both pumps of a registered session and unregisters it from the hub
/// once either pump stops.
pub async fn serve<S>(
    hub: Arc<Hub>,
    session: Arc<Session>,
    outbound: mpsc::Receiver<Envelope>,
    socket: S,
    config: SessionConfig,
) where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Send + 'static,
{
    let (sink, stream) = socket.split();
    let mut writer = tokio::spawn(write_pump(sink, outbound, config.clone()));

    let outcome = tokio::select! {
        read = read_pump(&hub, &session, stream, &config) => read,
        written = &mut writer => match written {
            Ok(result) => result,
            Err(e) => {
                error!("session {}: outbound pump panicked: {}", session.id(), e);
                Ok(())
            }
        },
    };
    writer.abort();

    match outcome {
        Ok(()) => info!("session {} closed", session.id()),
        Err(e) => warn!("session {} terminated: {}", session.id(), e),
    }
    hub.unregister(session.id()).await;
}

/// Decodes inbound frames and hands them to the hub. Any frame, pongs
/// included, resets the read deadline.
async fn read_pump<S>(
    hub: &Hub,
    session: &Session,
    mut stream: S,
    config: &SessionConfig,
) -> Result<(), SessionError>
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        let frame = match timeout(config.read_timeout, stream.next()).await {
            Ok(Some(frame)) => frame?,
            Ok(None) => return Ok(()),
            Err(_) => return Err(SessionError::ReadTimeout(config.read_timeout)),
        };

        match frame {
            Message::Text(text) => {
                check_size(text.len(), config)?;
                match serde_json::from_str::<Envelope>(text.as_str()) {
                    Ok(envelope) => hub.dispatch(session.id(), envelope).await,
                    Err(e) => warn!("session {}: malformed message: {}", session.id(), e),
                }
            }
            Message::Binary(data) => {
                check_size(data.len(), config)?;
                warn!(
                    "session {}: ignoring binary frame of {} bytes",
                    session.id(),
                    data.len()
                );
            }
            Message::Close(_) => return Ok(()),
            _ => {}
        }
    }
}

fn check_size(size: usize, config: &SessionConfig) -> Result<(), SessionError> {
    if size > config.max_message_size {
        return Err(SessionError::MessageTooLarge {
            size,
            limit: config.max_message_size,
        });
    }
    Ok(())
}

/// Writes queued envelopes and periodic pings. Ends when the queue closes or
/// a write fails.
async fn write_pump<K>(
    mut sink: K,
    mut outbound: mpsc::Receiver<Envelope>,
    config: SessionConfig,
) -> Result<(), SessionError>
where
    K: Sink<Message, Error = WsError> + Unpin,
{
    let mut heartbeat = interval(config.heartbeat_interval);
    heartbeat.tick().await;

    loop {
        let message = tokio::select! {
            next = outbound.recv() => match next {
                Some(envelope) => Message::Text(serde_json::to_string(&envelope)?.into()),
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(());
                }
            },
            _ = heartbeat.tick() => Message::Ping(Vec::new().into()),
        };

        match timeout(config.write_timeout, sink.send(message)).await {
            Ok(sent) => sent?,
            Err(_) => return Err(SessionError::WriteTimeout(config.write_timeout)),
        }
    }
}
