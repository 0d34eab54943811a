use crate::agent::ReasoningAgent;
use crate::models::websocket::{ ClientMessage, ServerMessage };

use std::error::Error;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::io::{ AsyncRead, AsyncWrite };
use tokio::sync::broadcast::error::RecvError;

use tokio_tungstenite::{ accept_async, WebSocketStream };
use tokio_tungstenite::tungstenite::protocol::Message;

use lazy_static::lazy_static;
use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };

use log::{ debug, info, warn, error };
use futures::{ Sink, SinkExt, StreamExt };

const MAX_MESSAGE_SIZE: usize = 1 * 1024 * 1024;
const CONNECTIONS_PER_SECOND: u32 = 10;

lazy_static! {
    static ref CONNECTION_LIMITER: RateLimiter<NotKeyed, InMemoryState, DefaultClock> =
        RateLimiter::direct(Quota::per_second(
            NonZeroU32::new(CONNECTIONS_PER_SECOND).unwrap_or(NonZeroU32::MIN)
        ));
}

pub async fn start_ws_server(
    addr: &str,
    agent: Arc<ReasoningAgent>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    info!("WS server listening on: {}", addr);

    loop {
        let (stream, peer) = listener.accept().await?;

        if CONNECTION_LIMITER.check().is_err() {
            warn!("Global connection rate limit exceeded for {}. Dropping connection.", peer);
            continue;
        }

        info!("Incoming connection from: {}", peer);
        let agent_clone = Arc::clone(&agent);

        tokio::spawn(async move {
            match accept_async(stream).await {
                Ok(ws) => handle_connection(peer, ws, agent_clone).await,
                Err(e) => error!("Handshake failed for {}: {}", peer, e),
            }
        });
    }
}

pub async fn handle_connection<S>(
    peer: SocketAddr,
    websocket: WebSocketStream<S>,
    agent: Arc<ReasoningAgent>
)
    where S: AsyncRead + AsyncWrite + Unpin
{
    info!("New WebSocket connection: {}", peer);

    let (mut tx, mut rx) = websocket.split();
    let mut events = agent.subscribe();

    let initial = ServerMessage::Session { view: agent.view().await };
    if let Err(e) = send_message(&mut tx, &initial).await {
        error!("Error sending session to {}: {}", peer, e);
        return;
    }

    loop {
        tokio::select! {
            incoming = rx.next() => {
                let Some(incoming) = incoming else { break };
                let message = match incoming {
                    Ok(message) => message,
                    Err(e) => {
                        error!("WebSocket error for {}: {}", peer, e);
                        break;
                    }
                };

                if message.len() > MAX_MESSAGE_SIZE {
                    warn!(
                        "Message from {} exceeds size limit ({} > {})",
                        peer,
                        message.len(),
                        MAX_MESSAGE_SIZE
                    );
                    let error_msg = ServerMessage::Error {
                        message: "Message too large".to_string(),
                    };
                    if send_message(&mut tx, &error_msg).await.is_err() {
                        error!("Failed to send size limit error to {}", peer);
                    }
                    break;
                }

                match message {
                    Message::Text(text) => {
                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_message) => dispatch(&agent, client_message).await,
                            Err(e) => {
                                warn!("Invalid message from {}: {}", peer, e);
                                Some(ServerMessage::Error {
                                    message: format!("Invalid message: {}", e),
                                })
                            }
                        };
                        if let Some(reply) = reply {
                            if let Err(e) = send_message(&mut tx, &reply).await {
                                error!("Error sending reply to {}: {}", peer, e);
                                break;
                            }
                        }
                    }
                    Message::Close(_) => {
                        info!("Client {} disconnected", peer);
                        break;
                    }
                    _ => {}
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if let Err(e) = send_message(&mut tx, &event).await {
                            error!("Error forwarding event to {}: {}", peer, e);
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("{} missed {} session events, resending view", peer, skipped);
                        let view = ServerMessage::Session { view: agent.view().await };
                        if send_message(&mut tx, &view).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    info!("WebSocket connection closed: {}", peer);
}

/// Applies one client action. State changes reach the client through the event channel;
/// the return value is only for errors addressed to the sender.
pub async fn dispatch(agent: &Arc<ReasoningAgent>, message: ClientMessage) -> Option<ServerMessage> {
    let result = match message {
        ClientMessage::Chat { content } =>
            match agent.submit(&content).await {
                Ok(request) => {
                    let agent = Arc::clone(agent);
                    tokio::spawn(async move {
                        agent.run_turn(&request).await;
                    });
                    Ok(())
                }
                Err(e) => Err(e.to_string()),
            }
        ClientMessage::NewConversation => {
            agent.start_new().await;
            Ok(())
        }
        ClientMessage::Switch { conversation_id } =>
            agent.switch(&conversation_id).await.map_err(|e| e.to_string()),
        ClientMessage::Delete { conversation_id } =>
            agent.delete(&conversation_id).await.map_err(|e| e.to_string()),
        ClientMessage::ToggleReasoning { message_id } =>
            agent
                .toggle_reasoning(message_id.as_deref()).await
                .map(|_| ())
                .map_err(|e| e.to_string()),
        ClientMessage::SetHistory { enabled } => {
            agent.set_include_history(enabled).await;
            Ok(())
        }
        ClientMessage::Reload =>
            agent
                .reload().await
                .map(|_| ())
                .map_err(|e| format!("Reload failed: {}", e)),
    };

    match result {
        Ok(()) => None,
        Err(message) => {
            debug!("Rejected client action: {}", message);
            Some(ServerMessage::Error { message })
        }
    }
}

async fn send_message<T>(tx: &mut T, message: &ServerMessage) -> Result<(), Box<dyn Error + Send + Sync>>
    where T: Sink<Message> + Unpin, T::Error: Error + Send + Sync + 'static
{
    let json = serde_json::to_string(message)?;
    tx.send(Message::Text(json)).await?;
    Ok(())
}
