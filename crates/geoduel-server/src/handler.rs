use geoduel_common::game::{RoomSettings, RoundStart, SENTINEL_GUESS};
use geoduel_common::location::Coord;
use geoduel_common::player::PlayerId;
use geoduel_common::protocol::{ClientMessage, ErrorCode, ServerMessage};
use geoduel_common::room_code::RoomCode;

use crate::registry::{Announcement, LeaveOutcome, SubmitOutcome};
use crate::server::SharedState;

pub async fn handle_message(
    player_id: PlayerId,
    msg: ClientMessage,
    state: &SharedState,
) -> anyhow::Result<()> {
    match msg {
        ClientMessage::CreateRoom { settings } => {
            handle_create_room(player_id, settings, state).await;
        }

        ClientMessage::JoinRoom { room_id } => {
            handle_join_room(player_id, &room_id, state).await;
        }

        ClientMessage::LeaveRoom => {
            handle_leave_room(player_id, state).await;
        }

        ClientMessage::StartGame => {
            let Some(room_id) = current_room(player_id, state).await else {
                return Ok(());
            };
            if let Some(announcement) = state.registry.start_game(&room_id).await {
                announce_round(announcement, state).await;
            }
        }

        ClientMessage::SubmitGuess { lat, lng } => {
            if !lat.is_finite() || !lng.is_finite() {
                send_to_player(
                    player_id,
                    ServerMessage::Error {
                        code: ErrorCode::InvalidAction,
                        message: "Guess coordinates must be finite".into(),
                    },
                    state,
                )
                .await;
                return Ok(());
            }
            handle_guess(player_id, Coord::new(lat, lng), state).await;
        }

        ClientMessage::TimeExpired => {
            handle_guess(player_id, SENTINEL_GUESS, state).await;
        }

        ClientMessage::NextRound => {
            let Some(room_id) = current_room(player_id, state).await else {
                return Ok(());
            };
            if let Some(announcement) = state.registry.start_next_round(&room_id).await {
                announce_round(announcement, state).await;
            }
        }

        ClientMessage::ResetGame => {
            let Some(room_id) = current_room(player_id, state).await else {
                return Ok(());
            };
            if let Some(room_state) = state.registry.reset_game(&room_id).await {
                let members: Vec<PlayerId> = room_state.players.iter().map(|p| p.id).collect();
                broadcast_to_list(&members, &ServerMessage::GameReset { room_state }, state)
                    .await;
            }
        }

        ClientMessage::Ping => {
            send_to_player(player_id, ServerMessage::Pong, state).await;
        }

        // The handshake and the goodbye belong to the connection loop.
        ClientMessage::Hello { .. } | ClientMessage::Disconnect => {
            tracing::debug!("Ignoring out-of-band message from {}", player_id);
        }
    }

    Ok(())
}

async fn handle_create_room(player_id: PlayerId, settings: RoomSettings, state: &SharedState) {
    let Some(player_name) = player_name(player_id, state).await else {
        return;
    };
    // One room per connection.
    if current_room(player_id, state).await.is_some() {
        handle_leave_room(player_id, state).await;
    }

    let room_state = state
        .registry
        .create_room(player_id, player_name, settings)
        .await;
    let room_id = room_state.room_id.clone();
    set_room(player_id, Some(room_id.clone()), state).await;

    send_to_player(
        player_id,
        ServerMessage::RoomCreated {
            room_id,
            room_state,
        },
        state,
    )
    .await;
}

async fn handle_join_room(player_id: PlayerId, raw_room_id: &str, state: &SharedState) {
    let Some(player_name) = player_name(player_id, state).await else {
        return;
    };
    let Ok(room_id) = raw_room_id.parse::<RoomCode>() else {
        send_to_player(
            player_id,
            ServerMessage::Error {
                code: ErrorCode::RoomNotFound,
                message: format!("Room {} not found", raw_room_id),
            },
            state,
        )
        .await;
        return;
    };

    let previous = current_room(player_id, state).await;
    if previous.as_ref() == Some(&room_id) {
        if let Some(room_state) = state.registry.snapshot(&room_id).await {
            send_to_player(player_id, ServerMessage::RoomJoined { room_id, room_state }, state)
                .await;
        }
        return;
    }

    // The current room is only given up once the new one has accepted the player.
    let room_state = match state
        .registry
        .join_room(&room_id, player_id, player_name)
        .await
    {
        Ok(snapshot) => snapshot,
        Err(e) => {
            send_to_player(player_id, ServerMessage::error(&e), state).await;
            return;
        }
    };
    if previous.is_some() {
        handle_leave_room(player_id, state).await;
    }
    set_room(player_id, Some(room_id.clone()), state).await;

    let members: Vec<PlayerId> = room_state.players.iter().map(|p| p.id).collect();
    let players = room_state.players.clone();

    send_to_player(
        player_id,
        ServerMessage::RoomJoined {
            room_id,
            room_state,
        },
        state,
    )
    .await;

    broadcast_to_list(&members, &ServerMessage::PlayerJoined { players }, state).await;
}

async fn handle_guess(player_id: PlayerId, guess: Coord, state: &SharedState) {
    let Some(room_id) = current_room(player_id, state).await else {
        return;
    };

    match state.registry.submit_guess(&room_id, player_id, guess).await {
        SubmitOutcome::Ignored => {}
        SubmitOutcome::Waiting => {
            send_to_player(player_id, ServerMessage::GuessAccepted, state).await;
        }
        SubmitOutcome::RoundFinished { members, result } => {
            broadcast_to_list(&members, &ServerMessage::RoundResult { result }, state).await;
        }
    }
}

async fn handle_leave_room(player_id: PlayerId, state: &SharedState) {
    let room_id = {
        let mut conns = state.connections.write().await;
        match conns.get_mut(&player_id) {
            Some(conn) => conn.room_id.take(),
            None => None,
        }
    };

    let Some(room_id) = room_id else {
        return;
    };

    if let Some(LeaveOutcome::Left {
        remaining,
        round_result,
    }) = state.registry.leave_room(&room_id, player_id).await
    {
        broadcast_to_list(&remaining, &ServerMessage::PlayerLeft { player_id }, state)
            .await;
        if let Some(result) = round_result {
            broadcast_to_list(&remaining, &ServerMessage::RoundResult { result }, state)
                .await;
        }
    }

    send_to_player(player_id, ServerMessage::RoomLeft, state).await;
}

pub async fn handle_disconnect(player_id: PlayerId, state: &SharedState) {
    // Leave room first
    handle_leave_room(player_id, state).await;

    // Remove connection
    state.connections.write().await.remove(&player_id);
}

async fn announce_round(announcement: Announcement, state: &SharedState) {
    let deadline = round_deadline(&announcement.round);
    broadcast_to_list(
        &announcement.members,
        &ServerMessage::RoundStarted {
            round: announcement.round,
            deadline,
        },
        state,
    )
    .await;
}

/// Advisory end of the round timer as a unix timestamp.
fn round_deadline(round: &RoundStart) -> Option<i64> {
    (round.time_limit > 0)
        .then(|| chrono::Utc::now().timestamp() + i64::from(round.time_limit))
}

async fn current_room(player_id: PlayerId, state: &SharedState) -> Option<RoomCode> {
    let conns = state.connections.read().await;
    conns.get(&player_id).and_then(|c| c.room_id.clone())
}

async fn player_name(player_id: PlayerId, state: &SharedState) -> Option<String> {
    let conns = state.connections.read().await;
    conns.get(&player_id).map(|c| c.player_name.clone())
}

async fn set_room(player_id: PlayerId, room_id: Option<RoomCode>, state: &SharedState) {
    let mut conns = state.connections.write().await;
    if let Some(conn) = conns.get_mut(&player_id) {
        conn.room_id = room_id;
    }
}

async fn send_to_player(player_id: PlayerId, msg: ServerMessage, state: &SharedState) {
    let tx = {
        let conns = state.connections.read().await;
        conns.get(&player_id).map(|c| c.tx.clone())
    };
    if let Some(tx) = tx {
        let _ = tx.send(msg).await;
    }
}

/// Broadcast a message to a list of player IDs.
async fn broadcast_to_list(member_ids: &[PlayerId], msg: &ServerMessage, state: &SharedState) {
    let senders: Vec<_> = {
        let conns = state.connections.read().await;
        member_ids
            .iter()
            .filter_map(|id| conns.get(id).map(|c| c.tx.clone()))
            .collect()
    };
    for tx in senders {
        let _ = tx.send(msg.clone()).await;
    }
}
