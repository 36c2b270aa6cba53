use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::game::{GameError, GamePhase, RoomSettings, RoundResult, RoundStart};
use crate::player::{PlayerId, PlayerSnapshot};
use crate::room_code::RoomCode;

// -- Framing --

pub type Transport = Framed<TcpStream, LengthDelimitedCodec>;

pub fn framed_transport(stream: TcpStream) -> Transport {
    LengthDelimitedCodec::builder()
        .max_frame_length(64 * 1024)
        .new_framed(stream)
}

// -- Client -> Server Messages --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientMessage {
    // Handshake
    Hello {
        player_name: String,
        version: String,
    },

    // Lobby
    CreateRoom {
        #[serde(default)]
        settings: RoomSettings,
    },
    /// Room codes are matched case-insensitively.
    JoinRoom {
        room_id: String,
    },
    LeaveRoom,
    StartGame,

    // Gameplay
    SubmitGuess {
        lat: f64,
        lng: f64,
    },
    /// The round timer ran out before this player guessed.
    TimeExpired,
    NextRound,
    ResetGame,

    // Connection
    Ping,
    Disconnect,
}

// -- Server -> Client Messages --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerMessage {
    // Handshake
    Welcome {
        player_id: PlayerId,
        server_version: String,
    },
    HandshakeError {
        reason: String,
    },

    // Lobby
    RoomCreated {
        room_id: RoomCode,
        room_state: RoomSnapshot,
    },
    RoomJoined {
        room_id: RoomCode,
        room_state: RoomSnapshot,
    },
    PlayerJoined {
        players: Vec<PlayerSnapshot>,
    },
    PlayerLeft {
        player_id: PlayerId,
    },
    RoomLeft,

    // Game
    RoundStarted {
        round: RoundStart,
        /// Unix timestamp at which the advisory round timer runs out.
        deadline: Option<i64>,
    },
    GuessAccepted,
    RoundResult {
        result: RoundResult,
    },
    GameReset {
        room_state: RoomSnapshot,
    },

    // Errors
    Error {
        code: ErrorCode,
        message: String,
    },

    // Connection
    Pong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    RoomNotFound,
    GameInProgress,
    RoomFull,
    NotInRoom,
    InvalidAction,
    InternalError,
}

impl From<&GameError> for ErrorCode {
    fn from(e: &GameError) -> Self {
        match e {
            GameError::RoomNotFound => ErrorCode::RoomNotFound,
            GameError::GameInProgress => ErrorCode::GameInProgress,
            GameError::RoomFull => ErrorCode::RoomFull,
            GameError::PlayerNotFound => ErrorCode::NotInRoom,
            GameError::NotEnoughLocations => ErrorCode::InternalError,
            GameError::DuplicateSubmission
            | GameError::NotPlaying
            | GameError::RoundIncomplete => ErrorCode::InvalidAction,
        }
    }
}

impl ServerMessage {
    pub fn error(e: &GameError) -> Self {
        ServerMessage::Error {
            code: e.into(),
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_id: RoomCode,
    pub host_id: Option<PlayerId>,
    pub players: Vec<PlayerSnapshot>,
    pub state: GamePhase,
    /// 0-based index of the round in progress.
    pub current_round: u8,
    pub settings: RoomSettings,
}

// -- Serialization helpers --

pub fn serialize_message<T: Serialize>(msg: &T) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_vec(msg)?;
    Ok(Bytes::from(json))
}

pub fn deserialize_message<T: for<'de> Deserialize<'de>>(
    data: &[u8],
) -> Result<T, serde_json::Error> {
    serde_json::from_slice(data)
}

// -- Transport helpers --

pub async fn send_message<T: Serialize>(
    transport: &mut Transport,
    msg: &T,
) -> anyhow::Result<()> {
    let bytes = serialize_message(msg).map_err(|e| anyhow::anyhow!("serialize error: {}", e))?;
    transport
        .send(bytes)
        .await
        .map_err(|e| anyhow::anyhow!("send error: {}", e))
}

pub async fn recv_message<T: for<'de> Deserialize<'de>>(
    transport: &mut Transport,
) -> anyhow::Result<Option<T>> {
    match transport.next().await {
        Some(Ok(frame)) => {
            let msg = deserialize_message(&frame)
                .map_err(|e| anyhow::anyhow!("deserialize error: {}", e))?;
            Ok(Some(msg))
        }
        Some(Err(e)) => Err(anyhow::anyhow!("recv error: {}", e)),
        None => Ok(None),
    }
}
