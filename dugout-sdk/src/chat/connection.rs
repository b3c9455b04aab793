//! Room socket lifecycle.
//!
//! One socket per open popup. The lifecycle task runs the handshake
//! (CONNECT with the session's bearer token, SUBSCRIBE to the room channel,
//! ENTER publication), then drives a select loop over inbound frames,
//! outbound commands, and the heartbeat timer. An unexpected transport loss
//! triggers a reconnect after a fixed delay, repeating the full handshake;
//! join is at-least-once by design.
//!
//! Teardown is deterministic: dropping (or closing) the [`RoomHandle`]
//! cancels the task's token, and the loop's cancellation arm publishes the
//! LEAVE frame and shuts the socket down before exiting — no exit path skips
//! it.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_rustls::{TlsConnector, rustls};
use tokio_util::sync::CancellationToken;

use crate::config::ChatConfig;
use crate::error::ChatError;
use crate::session::SessionManager;

use super::event::{ChatEvent, ChatMessage};
use super::frame::{self, ChatPayload, ClientFrame, PayloadKind, ServerFrame};

const EVENT_BUFFER: usize = 4096;
const COMMAND_BUFFER: usize = 256;

/// Transport state of one room socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Connecting,
    Open,
    Closed,
}

enum RoomCommand {
    Chat(String),
}

/// How one connected session ended.
enum SessionEnd {
    /// Explicit teardown; the leave frame has been published.
    Shutdown,
    /// Transport lost; the outer loop reconnects.
    Transport(String),
    /// The server rejected the handshake; terminal.
    Rejected(String),
}

/// Owner-side handle to a room socket. Owned exclusively by the popup;
/// dropping it tears the connection down.
pub struct RoomHandle {
    room_id: u64,
    cmd_tx: mpsc::Sender<RoomCommand>,
    state_rx: watch::Receiver<SocketState>,
    shutdown: CancellationToken,
}

impl RoomHandle {
    pub fn room_id(&self) -> u64 {
        self.room_id
    }

    pub fn state(&self) -> SocketState {
        *self.state_rx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SocketState> {
        self.state_rx.clone()
    }

    /// Publish a chat message. A no-op while the socket is not open, so a
    /// send during reconnect or teardown is dropped rather than queued onto
    /// a dead transport.
    pub fn send_message(&self, text: &str) {
        if self.state() != SocketState::Open {
            tracing::debug!(room_id = self.room_id, "socket not open; message dropped");
            return;
        }
        if self
            .cmd_tx
            .try_send(RoomCommand::Chat(text.to_string()))
            .is_err()
        {
            tracing::debug!(room_id = self.room_id, "command queue unavailable; message dropped");
        }
    }

    /// Explicit close. Equivalent to dropping the handle.
    pub fn close(self) {
        self.shutdown.cancel();
    }
}

impl Drop for RoomHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Open a room socket for the current session.
///
/// Returns the owning handle and the event stream for the popup. The
/// lifecycle (handshake, heartbeat, reconnect, teardown) runs in a spawned
/// task; identity and bearer token are read from the session at every
/// (re)connect so a refreshed token is picked up automatically.
pub fn open_room(
    config: ChatConfig,
    room_id: u64,
    session: &Arc<SessionManager>,
) -> Result<(RoomHandle, mpsc::Receiver<ChatEvent>), ChatError> {
    if !session.is_authenticated() {
        return Err(ChatError::NotAuthenticated);
    }
    let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (state_tx, state_rx) = watch::channel(SocketState::Connecting);
    let shutdown = CancellationToken::new();

    tokio::spawn(run_room(
        config,
        room_id,
        session.clone(),
        event_tx,
        cmd_rx,
        state_tx,
        shutdown.clone(),
    ));

    Ok((
        RoomHandle {
            room_id,
            cmd_tx,
            state_rx,
            shutdown,
        },
        event_rx,
    ))
}

async fn run_room(
    config: ChatConfig,
    room_id: u64,
    session: Arc<SessionManager>,
    events: mpsc::Sender<ChatEvent>,
    mut cmd_rx: mpsc::Receiver<RoomCommand>,
    state_tx: watch::Sender<SocketState>,
    shutdown: CancellationToken,
) {
    loop {
        let snapshot = session.snapshot();
        let (Some(token), Some(user)) = (snapshot.access_token, snapshot.user) else {
            let _ = events
                .send(ChatEvent::Disconnected {
                    reason: "not authenticated".to_string(),
                })
                .await;
            break;
        };

        state_tx.send_replace(SocketState::Connecting);
        let stream = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                let _ = events.send(ChatEvent::Disconnected { reason: "room closed".to_string() }).await;
                break;
            }
            result = establish(&config.addr, config.tls) => result,
        };

        let outcome = match stream {
            Ok(ChatStream::Plain(tcp)) => {
                let (reader, writer) = tokio::io::split(tcp);
                drive(
                    BufReader::new(reader),
                    writer,
                    room_id,
                    &token,
                    &user.nickname,
                    &config,
                    &events,
                    &mut cmd_rx,
                    &state_tx,
                    &shutdown,
                )
                .await
            }
            Ok(ChatStream::Tls(tls)) => {
                let (reader, writer) = tokio::io::split(tls);
                drive(
                    BufReader::new(reader),
                    writer,
                    room_id,
                    &token,
                    &user.nickname,
                    &config,
                    &events,
                    &mut cmd_rx,
                    &state_tx,
                    &shutdown,
                )
                .await
            }
            Err(e) => Err(e),
        };

        state_tx.send_replace(SocketState::Closed);
        match outcome {
            Ok(SessionEnd::Shutdown) => {
                let _ = events
                    .send(ChatEvent::Disconnected {
                        reason: "room closed".to_string(),
                    })
                    .await;
                break;
            }
            Ok(SessionEnd::Rejected(reason)) => {
                let _ = events.send(ChatEvent::Disconnected { reason }).await;
                break;
            }
            Ok(SessionEnd::Transport(reason)) => {
                tracing::warn!(room_id, reason = %reason, "room socket lost; reconnecting");
            }
            Err(e) => {
                tracing::warn!(room_id, error = %e, "room socket error; reconnecting");
            }
        }

        let _ = events
            .send(ChatEvent::Reconnecting {
                delay: config.reconnect_delay,
            })
            .await;
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                let _ = events.send(ChatEvent::Disconnected { reason: "room closed".to_string() }).await;
                break;
            }
            _ = tokio::time::sleep(config.reconnect_delay) => {}
        }
    }
    state_tx.send_replace(SocketState::Closed);
}

enum ChatStream {
    Plain(TcpStream),
    Tls(tokio_rustls::client::TlsStream<TcpStream>),
}

async fn establish(addr: &str, tls: bool) -> Result<ChatStream, ChatError> {
    let tcp = TcpStream::connect(addr).await?;
    if !tls {
        return Ok(ChatStream::Plain(tcp));
    }
    let roots = rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(tls_config));
    let host = addr.split(':').next().unwrap_or("localhost");
    let server_name = rustls::pki_types::ServerName::try_from(host.to_string())
        .map_err(|_| ChatError::ServerName(host.to_string()))?;
    Ok(ChatStream::Tls(connector.connect(server_name, tcp).await?))
}

async fn send_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &ClientFrame,
) -> Result<(), ChatError> {
    let mut line = serde_json::to_string(frame)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    Ok(())
}

/// Drive one connected socket session until teardown, transport loss, or
/// handshake rejection.
async fn drive<R, W>(
    mut reader: R,
    mut writer: W,
    room_id: u64,
    token: &str,
    nickname: &str,
    config: &ChatConfig,
    events: &mpsc::Sender<ChatEvent>,
    cmd_rx: &mut mpsc::Receiver<RoomCommand>,
    state_tx: &watch::Sender<SocketState>,
    shutdown: &CancellationToken,
) -> Result<SessionEnd, ChatError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    send_frame(
        &mut writer,
        &ClientFrame::Connect {
            token: token.to_string(),
        },
    )
    .await?;

    let topic = frame::subscribe_destination(room_id);
    let mut open = false;
    let mut line_buf = String::new();
    let mut last_activity = Instant::now();
    let mut next_ping = last_activity + config.heartbeat_interval;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                if open {
                    let leave = ClientFrame::Send {
                        destination: frame::publish_destination(room_id),
                        payload: ChatPayload::leave(room_id, nickname),
                    };
                    if let Err(e) = send_frame(&mut writer, &leave).await {
                        tracing::debug!(room_id, error = %e, "leave publish failed during teardown");
                    }
                }
                let _ = writer.shutdown().await;
                return Ok(SessionEnd::Shutdown);
            }
            result = reader.read_line(&mut line_buf) => {
                let n = result?;
                if n == 0 {
                    return Ok(SessionEnd::Transport("connection closed by server".to_string()));
                }
                last_activity = Instant::now();
                next_ping = last_activity + config.heartbeat_interval;
                match serde_json::from_str::<ServerFrame>(line_buf.trim_end()) {
                    Ok(frame) => {
                        if let Some(end) = handle_server_frame(
                            frame, room_id, nickname, &topic, &mut writer,
                            &mut open, events, state_tx,
                        ).await? {
                            return Ok(end);
                        }
                    }
                    Err(e) => {
                        tracing::debug!(room_id, error = %e, "ignoring malformed frame");
                    }
                }
                line_buf.clear();
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(RoomCommand::Chat(text)) => {
                        if open {
                            let frame = ClientFrame::Send {
                                destination: frame::publish_destination(room_id),
                                payload: ChatPayload::talk(room_id, nickname, &text),
                            };
                            send_frame(&mut writer, &frame).await?;
                        } else {
                            tracing::debug!(room_id, "socket not open; queued message dropped");
                        }
                    }
                    // All handles gone: same teardown as an explicit close.
                    None => {
                        if open {
                            let leave = ClientFrame::Send {
                                destination: frame::publish_destination(room_id),
                                payload: ChatPayload::leave(room_id, nickname),
                            };
                            let _ = send_frame(&mut writer, &leave).await;
                        }
                        let _ = writer.shutdown().await;
                        return Ok(SessionEnd::Shutdown);
                    }
                }
            }
            _ = tokio::time::sleep_until(next_ping) => {
                if last_activity.elapsed() >= config.silence_timeout {
                    return Ok(SessionEnd::Transport("heartbeat timeout".to_string()));
                }
                send_frame(&mut writer, &ClientFrame::Ping).await?;
                next_ping = Instant::now() + config.heartbeat_interval;
            }
        }
    }
}

async fn handle_server_frame<W: AsyncWrite + Unpin>(
    frame: ServerFrame,
    room_id: u64,
    nickname: &str,
    topic: &str,
    writer: &mut W,
    open: &mut bool,
    events: &mpsc::Sender<ChatEvent>,
    state_tx: &watch::Sender<SocketState>,
) -> Result<Option<SessionEnd>, ChatError> {
    match frame {
        ServerFrame::Connected => {
            send_frame(
                writer,
                &ClientFrame::Subscribe {
                    destination: topic.to_string(),
                },
            )
            .await?;
            let enter = ClientFrame::Send {
                destination: frame::publish_destination(room_id),
                payload: ChatPayload::enter(room_id, nickname),
            };
            send_frame(writer, &enter).await?;
            *open = true;
            state_tx.send_replace(SocketState::Open);
            let _ = events.send(ChatEvent::Connected).await;
        }
        ServerFrame::Message {
            destination,
            payload,
        } => {
            if destination == topic {
                let event = match payload.kind {
                    PayloadKind::Enter => ChatEvent::MemberEntered {
                        nickname: payload.sender,
                    },
                    PayloadKind::Leave => ChatEvent::MemberLeft {
                        nickname: payload.sender,
                    },
                    PayloadKind::Talk => ChatEvent::Message(ChatMessage {
                        sender: payload.sender,
                        text: payload.message.unwrap_or_default(),
                        sent_at: payload.sent_at,
                    }),
                };
                let _ = events.send(event).await;
            }
        }
        ServerFrame::Pong => {}
        ServerFrame::Error { reason } => {
            if *open {
                // Mid-session errors don't crash the room.
                tracing::warn!(room_id, reason = %reason, "server error on room channel");
            } else {
                return Ok(Some(SessionEnd::Rejected(reason)));
            }
        }
    }
    Ok(None)
}
