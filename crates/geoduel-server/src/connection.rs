use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use geoduel_common::protocol::{
    self, framed_transport, serialize_message, ClientMessage, ErrorCode, ServerMessage, Transport,
};
use geoduel_common::room_code::RoomCode;

use crate::handler;
use crate::server::SharedState;

const OUTBOX_CAPACITY: usize = 64;

/// Server-side view of a connected player, keyed by player id.
pub struct ConnectionHandle {
    pub player_name: String,
    pub tx: mpsc::Sender<ServerMessage>,
    pub room_id: Option<RoomCode>,
}

pub async fn handle_connection(stream: TcpStream, state: SharedState) -> anyhow::Result<()> {
    let mut transport = framed_transport(stream);

    let Some(player_name) = handshake(&mut transport).await? else {
        return Ok(());
    };
    let player_id = Uuid::new_v4();
    protocol::send_message(
        &mut transport,
        &ServerMessage::Welcome {
            player_id,
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        },
    )
    .await?;

    let (tx, rx) = mpsc::channel::<ServerMessage>(OUTBOX_CAPACITY);
    state.connections.write().await.insert(
        player_id,
        ConnectionHandle {
            player_name: player_name.clone(),
            tx: tx.clone(),
            room_id: None,
        },
    );

    let (sink, mut stream) = transport.split();
    let writer = spawn_writer(sink, rx);

    loop {
        let frame = match stream.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                tracing::warn!(player = %player_name, "Read error: {}", e);
                break;
            }
            None => {
                tracing::info!(player = %player_name, "Connection closed");
                break;
            }
        };

        match decode_frame(&frame) {
            Ok(ClientMessage::Disconnect) => {
                tracing::info!(player = %player_name, "Player said goodbye");
                break;
            }
            Ok(msg) => {
                if let Err(e) = handler::handle_message(player_id, msg, &state).await {
                    tracing::error!(player = %player_name, "Handler error: {}", e);
                }
            }
            Err(reply) => {
                if tx.send(reply).await.is_err() {
                    break;
                }
            }
        }
    }

    handler::handle_disconnect(player_id, &state).await;
    writer.abort();
    let open_rooms = state.registry.room_count().await;
    tracing::debug!(player = %player_name, open_rooms, "Connection cleaned up");
    Ok(())
}

/// Wait for `Hello`. Returns the player name, or `None` if the peer went
/// away or opened with something else.
async fn handshake(transport: &mut Transport) -> anyhow::Result<Option<String>> {
    match protocol::recv_message::<ClientMessage>(transport).await? {
        Some(ClientMessage::Hello {
            player_name,
            version,
        }) => {
            tracing::info!(player = %player_name, client_version = %version, "Player connected");
            Ok(Some(player_name))
        }
        Some(_) => {
            protocol::send_message(
                transport,
                &ServerMessage::HandshakeError {
                    reason: "Expected Hello message".into(),
                },
            )
            .await?;
            Ok(None)
        }
        None => Ok(None),
    }
}

/// Drains the outbox into the socket until either side closes.
fn spawn_writer(
    mut sink: SplitSink<Transport, bytes::Bytes>,
    mut rx: mpsc::Receiver<ServerMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let bytes = match serialize_message(&msg) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::error!("Failed to serialize message: {}", e);
                    continue;
                }
            };
            if sink.send(bytes).await.is_err() {
                break;
            }
        }
    })
}

/// Decode one frame. Frames that are not a valid client message are
/// answered with an `InvalidAction` error instead of being dropped.
fn decode_frame(frame: &[u8]) -> Result<ClientMessage, ServerMessage> {
    protocol::deserialize_message::<ClientMessage>(frame).map_err(|e| {
        tracing::warn!("Unreadable client message: {}", e);
        ServerMessage::Error {
            code: ErrorCode::InvalidAction,
            message: format!("Malformed message: {}", e),
        }
    })
}
