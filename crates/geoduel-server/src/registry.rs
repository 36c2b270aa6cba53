use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use geoduel_common::game::{
    GameError, GamePhase, GuessOutcome, RoomSettings, RoundResult, RoundStart,
};
use geoduel_common::location::{Coord, Location, LocationCatalog};
use geoduel_common::player::{Player, PlayerId};
use geoduel_common::protocol::RoomSnapshot;
use geoduel_common::room_code::RoomCode;

use crate::room::Room;

type RoomHandle = Arc<Mutex<Room>>;

/// A round announcement and the members it goes to.
#[derive(Debug, Clone)]
pub struct Announcement {
    pub members: Vec<PlayerId>,
    pub round: RoundStart,
}

#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// Stale or duplicate submission, nothing to report.
    Ignored,
    Waiting,
    RoundFinished {
        members: Vec<PlayerId>,
        result: RoundResult,
    },
}

#[derive(Debug, Clone)]
pub enum LeaveOutcome {
    /// The last player left and the room was deleted.
    RoomClosed,
    Left {
        remaining: Vec<PlayerId>,
        /// Set when the departure completed a round the others had already guessed.
        round_result: Option<RoundResult>,
    },
}

/// Owns every active room.
///
/// The map lock is only held to look rooms up, insert or delete them. Each
/// state transition runs under that room's own mutex. Lock order is always
/// map, then room.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomCode, RoomHandle>>,
    catalog: Arc<LocationCatalog>,
}

impl RoomRegistry {
    pub fn new(catalog: Arc<LocationCatalog>) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            catalog,
        }
    }

    async fn get(&self, room_id: &RoomCode) -> Option<RoomHandle> {
        self.rooms.read().await.get(room_id).cloned()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn snapshot(&self, room_id: &RoomCode) -> Option<RoomSnapshot> {
        let handle = self.get(room_id).await?;
        let room = handle.lock().await;
        Some(room.snapshot())
    }

    pub async fn create_room(
        &self,
        host_id: PlayerId,
        host_name: String,
        settings: RoomSettings,
    ) -> RoomSnapshot {
        let mut rooms = self.rooms.write().await;
        let code = generate_unique_room_code(&rooms);
        let room = Room::new(code.clone(), Player::new(host_id, host_name), settings);
        let snapshot = room.snapshot();
        rooms.insert(code.clone(), Arc::new(Mutex::new(room)));

        tracing::info!(
            room = %code,
            mode = ?snapshot.settings.game_mode,
            rounds = snapshot.settings.total_rounds,
            category = %snapshot.settings.category,
            "Room created"
        );
        snapshot
    }

    pub async fn join_room(
        &self,
        room_id: &RoomCode,
        player_id: PlayerId,
        name: String,
    ) -> Result<RoomSnapshot, GameError> {
        let handle = self.get(room_id).await.ok_or(GameError::RoomNotFound)?;
        let mut room = handle.lock().await;
        // Emptied by a concurrent leave and already dropped from the map.
        if room.game.is_empty() {
            return Err(GameError::RoomNotFound);
        }
        room.game.add_player(Player::new(player_id, name))?;
        tracing::info!(room = %room_id, players = room.game.players.len(), "Player joined");
        Ok(room.snapshot())
    }

    /// Remove a player. `None` if the room or the player was already gone.
    pub async fn leave_room(
        &self,
        room_id: &RoomCode,
        player_id: PlayerId,
    ) -> Option<LeaveOutcome> {
        let mut rooms = self.rooms.write().await;
        let handle = rooms.get(room_id)?.clone();
        let mut room = handle.lock().await;

        if !room.game.remove_player(player_id) {
            return None;
        }

        if room.game.is_empty() {
            rooms.remove(room_id);
            tracing::info!(room = %room_id, "Room closed");
            return Some(LeaveOutcome::RoomClosed);
        }
        drop(rooms);

        // The departed player forfeits; the round resolves if everyone left has guessed.
        let round_result = if room.game.phase == GamePhase::Playing && room.game.all_submitted() {
            room.game.finish_round().ok()
        } else {
            None
        };
        if let Some(result) = &round_result {
            log_round(room_id, result);
        }

        tracing::info!(room = %room_id, remaining = room.game.players.len(), "Player left");
        Some(LeaveOutcome::Left {
            remaining: room.member_ids(),
            round_result,
        })
    }

    pub async fn start_game(&self, room_id: &RoomCode) -> Option<Announcement> {
        let handle = self.get(room_id).await?;
        let mut room = handle.lock().await;

        let locations = draw_locations(&self.catalog, &room.game.settings);
        if let Err(e) = room.game.start(locations) {
            tracing::debug!(room = %room_id, "Start ignored: {}", e);
            return None;
        }

        tracing::info!(room = %room_id, players = room.game.players.len(), "Game started");
        Some(Announcement {
            members: room.member_ids(),
            round: room.game.round_start()?,
        })
    }

    pub async fn submit_guess(
        &self,
        room_id: &RoomCode,
        player_id: PlayerId,
        guess: Coord,
    ) -> SubmitOutcome {
        let Some(handle) = self.get(room_id).await else {
            return SubmitOutcome::Ignored;
        };
        let mut room = handle.lock().await;

        match room.game.submit_guess(player_id, guess) {
            Ok(GuessOutcome::Waiting) => SubmitOutcome::Waiting,
            Ok(GuessOutcome::RoundFinished(result)) => {
                log_round(room_id, &result);
                SubmitOutcome::RoundFinished {
                    members: room.member_ids(),
                    result,
                }
            }
            Err(e) => {
                tracing::debug!(room = %room_id, player = %player_id, "Guess ignored: {}", e);
                SubmitOutcome::Ignored
            }
        }
    }

    /// Re-announce the target of the round in progress.
    pub async fn start_next_round(&self, room_id: &RoomCode) -> Option<Announcement> {
        let handle = self.get(room_id).await?;
        let room = handle.lock().await;
        Some(Announcement {
            members: room.member_ids(),
            round: room.game.round_start()?,
        })
    }

    pub async fn reset_game(&self, room_id: &RoomCode) -> Option<RoomSnapshot> {
        let handle = self.get(room_id).await?;
        let mut room = handle.lock().await;
        room.game.reset();
        tracing::info!(room = %room_id, "Game reset");
        Some(room.snapshot())
    }
}

fn log_round(room_id: &RoomCode, result: &RoundResult) {
    tracing::info!(
        room = %room_id,
        round = result.round,
        target = %result.target.name,
        game_over = result.is_game_over,
        "Round finished"
    );
}

fn draw_locations(catalog: &LocationCatalog, settings: &RoomSettings) -> Vec<Location> {
    let mut rng = rand::thread_rng();
    catalog.pick_many(&settings.category, settings.total_rounds as usize, &mut rng)
}

/// Generate a room code, retrying on collision with existing rooms.
fn generate_unique_room_code(existing: &HashMap<RoomCode, RoomHandle>) -> RoomCode {
    let mut rng = rand::thread_rng();
    loop {
        let code = RoomCode::generate(&mut rng);
        if !existing.contains_key(&code) {
            return code;
        }
    }
}
