use geoduel_common::game::{GameState, RoomSettings};
use geoduel_common::player::{Player, PlayerId};
use geoduel_common::protocol::RoomSnapshot;
use geoduel_common::room_code::RoomCode;

/// One registry entry: a room code bound to its game state machine.
pub struct Room {
    pub id: RoomCode,
    pub game: GameState,
}

impl Room {
    pub fn new(id: RoomCode, host: Player, settings: RoomSettings) -> Self {
        Self {
            id,
            game: GameState::new(host, settings),
        }
    }

    /// Everyone who should receive broadcasts for this room.
    pub fn member_ids(&self) -> Vec<PlayerId> {
        self.game.player_ids()
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            room_id: self.id.clone(),
            host_id: self.game.host_id(),
            players: self.game.player_snapshots(),
            state: self.game.phase,
            current_round: self.game.current_round,
            settings: self.game.settings.clone(),
        }
    }
}
