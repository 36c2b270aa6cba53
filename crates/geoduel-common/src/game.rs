use serde::{Deserialize, Serialize};

use crate::location::{Coord, Location, CATEGORY_ALL};
use crate::player::{Player, PlayerId, PlayerSnapshot};
use crate::scoring::{damage_for_distances, distance_km, score_for_distance};

pub const MAX_PLAYERS: usize = 2;
pub const DEFAULT_ROUNDS: u8 = 5;
pub const MAX_ROUNDS: u8 = 20;

/// Guess submitted on behalf of a player whose round timer ran out.
pub const SENTINEL_GUESS: Coord = Coord::new(0.0, 0.0);

// -- Settings --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameMode {
    #[default]
    #[serde(alias = "normal")]
    Classic,
    BattleRoyale,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomSettings {
    #[serde(deserialize_with = "saturating_rounds")]
    pub total_rounds: u8,
    pub category: String,
    /// Seconds per round, 0 for unlimited. Advisory only.
    pub time_limit: u32,
    pub game_mode: GameMode,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            total_rounds: DEFAULT_ROUNDS,
            category: CATEGORY_ALL.to_string(),
            time_limit: 0,
            game_mode: GameMode::Classic,
        }
    }
}

/// Accept any unsigned round count; `normalized` clamps it afterwards.
fn saturating_rounds<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let rounds = u64::deserialize(deserializer)?;
    Ok(u8::try_from(rounds).unwrap_or(u8::MAX))
}

impl RoomSettings {
    pub fn normalized(mut self) -> Self {
        self.total_rounds = self.total_rounds.clamp(1, MAX_ROUNDS);
        self.category = self.category.trim().to_ascii_lowercase();
        if self.category.is_empty() {
            self.category = CATEGORY_ALL.to_string();
        }
        self
    }
}

// -- Round payloads --

/// Announcement of the target for the current round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundStart {
    pub location: Location,
    pub total_rounds: u8,
    /// 1-based.
    pub current_round: u8,
    pub game_mode: GameMode,
    pub time_limit: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRoundResult {
    pub id: PlayerId,
    pub name: String,
    pub guess: Coord,
    pub distance_km: f64,
    /// Points earned for the guess. Only added to the total in classic mode.
    pub points: u32,
    pub score_added: u32,
    pub damage_taken: u32,
    pub total_score: u32,
    pub health: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundResult {
    /// 1-based number of the round that just finished.
    pub round: u8,
    pub target: Location,
    pub results: Vec<PlayerRoundResult>,
    pub is_game_over: bool,
    pub next_round: u8,
    pub winner: Option<PlayerId>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GuessOutcome {
    /// Guess recorded, other players still guessing.
    Waiting,
    RoundFinished(RoundResult),
}

// -- Game State Machine --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GamePhase {
    Waiting,
    Playing,
    Finished,
}

#[derive(Debug, Clone)]
pub struct GameState {
    pub phase: GamePhase,
    /// Join order; the first player is the host.
    pub players: Vec<Player>,
    pub locations: Vec<Location>,
    /// 0-based index of the round being played.
    pub current_round: u8,
    pub settings: RoomSettings,
}

impl GameState {
    pub fn new(host: Player, settings: RoomSettings) -> Self {
        Self {
            phase: GamePhase::Waiting,
            players: vec![host],
            locations: Vec::new(),
            current_round: 0,
            settings: settings.normalized(),
        }
    }

    pub fn host_id(&self) -> Option<PlayerId> {
        self.players.first().map(|p| p.id)
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.players.iter().map(|p| p.id).collect()
    }

    pub fn player_snapshots(&self) -> Vec<PlayerSnapshot> {
        self.players.iter().map(Player::snapshot).collect()
    }

    pub fn add_player(&mut self, player: Player) -> Result<(), GameError> {
        if self.phase != GamePhase::Waiting {
            return Err(GameError::GameInProgress);
        }
        if self.players.iter().any(|p| p.id == player.id) {
            return Ok(());
        }
        if self.players.len() >= MAX_PLAYERS {
            return Err(GameError::RoomFull);
        }
        self.players.push(player);
        Ok(())
    }

    /// Remove a player. Returns false if they were not in the room.
    pub fn remove_player(&mut self, player_id: PlayerId) -> bool {
        let before = self.players.len();
        self.players.retain(|p| p.id != player_id);
        self.players.len() != before
    }

    pub fn start(&mut self, locations: Vec<Location>) -> Result<(), GameError> {
        if self.phase != GamePhase::Waiting {
            return Err(GameError::GameInProgress);
        }
        if locations.len() < self.settings.total_rounds as usize {
            return Err(GameError::NotEnoughLocations);
        }
        self.locations = locations;
        self.current_round = 0;
        self.phase = GamePhase::Playing;
        for player in &mut self.players {
            player.clear_round();
        }
        Ok(())
    }

    pub fn current_location(&self) -> Option<&Location> {
        self.locations.get(self.current_round as usize)
    }

    /// The target for the round in progress, if the game is being played.
    pub fn round_start(&self) -> Option<RoundStart> {
        if self.phase != GamePhase::Playing {
            return None;
        }
        let location = self.current_location()?.clone();
        Some(RoundStart {
            location,
            total_rounds: self.settings.total_rounds,
            current_round: self.current_round + 1,
            game_mode: self.settings.game_mode,
            time_limit: self.settings.time_limit,
        })
    }

    pub fn all_submitted(&self) -> bool {
        !self.players.is_empty() && self.players.iter().all(|p| p.has_submitted)
    }

    pub fn submit_guess(
        &mut self,
        player_id: PlayerId,
        guess: Coord,
    ) -> Result<GuessOutcome, GameError> {
        if self.phase != GamePhase::Playing {
            return Err(GameError::NotPlaying);
        }
        let player = self
            .players
            .iter_mut()
            .find(|p| p.id == player_id)
            .ok_or(GameError::PlayerNotFound)?;
        if !player.submit(guess) {
            return Err(GameError::DuplicateSubmission);
        }

        if self.all_submitted() {
            self.finish_round().map(GuessOutcome::RoundFinished)
        } else {
            Ok(GuessOutcome::Waiting)
        }
    }

    /// Score the current round and advance to the next one.
    pub fn finish_round(&mut self) -> Result<RoundResult, GameError> {
        if self.phase != GamePhase::Playing {
            return Err(GameError::NotPlaying);
        }
        if !self.all_submitted() {
            return Err(GameError::RoundIncomplete);
        }
        let target = self
            .current_location()
            .cloned()
            .ok_or(GameError::NotPlaying)?;

        let guesses: Vec<Coord> = self
            .players
            .iter()
            .map(|p| p.guess.unwrap_or(SENTINEL_GUESS))
            .collect();
        let distances: Vec<f64> = guesses
            .iter()
            .map(|&g| distance_km(g, target.coord()))
            .collect();
        let points: Vec<u32> = distances.iter().map(|&d| score_for_distance(d)).collect();
        let mut damage = vec![0u32; self.players.len()];

        match self.settings.game_mode {
            GameMode::Classic => {
                for (player, &pts) in self.players.iter_mut().zip(&points) {
                    player.add_score(pts);
                }
            }
            GameMode::BattleRoyale => {
                if let [a, b] = distances.as_slice() {
                    let (winner, loser) = if a <= b { (0, 1) } else { (1, 0) };
                    damage[loser] = damage_for_distances(distances[winner], distances[loser]);
                    self.players[loser].take_damage(damage[loser]);
                }
            }
        }

        let classic = self.settings.game_mode == GameMode::Classic;
        let results = self
            .players
            .iter()
            .enumerate()
            .map(|(i, p)| PlayerRoundResult {
                id: p.id,
                name: p.name.clone(),
                guess: guesses[i],
                distance_km: distances[i],
                points: points[i],
                score_added: if classic { points[i] } else { 0 },
                damage_taken: damage[i],
                total_score: p.score,
                health: p.health,
            })
            .collect();

        let round = self.current_round + 1;
        self.current_round += 1;

        let is_game_over = self.current_round >= self.settings.total_rounds
            || (self.settings.game_mode == GameMode::BattleRoyale
                && self.players.iter().any(Player::is_eliminated));

        if is_game_over {
            self.phase = GamePhase::Finished;
        } else {
            for player in &mut self.players {
                player.clear_round();
            }
        }

        Ok(RoundResult {
            round,
            target,
            results,
            is_game_over,
            next_round: self.current_round + 1,
            winner: self.winner(),
        })
    }

    /// Back to the lobby with the same members and settings.
    pub fn reset(&mut self) {
        self.phase = GamePhase::Waiting;
        self.current_round = 0;
        self.locations.clear();
        for player in &mut self.players {
            player.reset();
        }
    }

    /// The winning player once the game is finished, `None` on a draw.
    pub fn winner(&self) -> Option<PlayerId> {
        if self.phase != GamePhase::Finished {
            return None;
        }
        let mode = self.settings.game_mode;
        let key = move |p: &Player| match mode {
            GameMode::Classic => p.score,
            GameMode::BattleRoyale => p.health,
        };
        let best = self.players.iter().map(key).max()?;
        let mut leaders = self.players.iter().filter(|p| key(*p) == best);
        match (leaders.next(), leaders.next()) {
            (Some(p), None) => Some(p.id),
            _ => None,
        }
    }
}

// -- Errors --

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("room not found")]
    RoomNotFound,
    #[error("game already in progress")]
    GameInProgress,
    #[error("room is full")]
    RoomFull,
    #[error("guess already submitted this round")]
    DuplicateSubmission,
    #[error("game is not being played")]
    NotPlaying,
    #[error("player is not in this room")]
    PlayerNotFound,
    #[error("not every player has guessed yet")]
    RoundIncomplete,
    #[error("not enough locations for every round")]
    NotEnoughLocations,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::LocationCatalog;
    use crate::scoring::MAX_HEALTH;
    use rand::SeedableRng;
    use uuid::Uuid;

    fn make_game(mode: GameMode, rounds: u8) -> (GameState, PlayerId, PlayerId) {
        let settings = RoomSettings {
            total_rounds: rounds,
            game_mode: mode,
            ..RoomSettings::default()
        };
        let host = Player::new(Uuid::new_v4(), "Ayu".into());
        let host_id = host.id;
        let mut game = GameState::new(host, settings);
        let guest = Player::new(Uuid::new_v4(), "Budi".into());
        let guest_id = guest.id;
        game.add_player(guest).unwrap();
        (game, host_id, guest_id)
    }

    fn draw(game: &GameState) -> Vec<Location> {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        LocationCatalog::builtin().pick_many(
            &game.settings.category,
            game.settings.total_rounds as usize,
            &mut rng,
        )
    }

    fn start(game: &mut GameState) {
        let locations = draw(game);
        game.start(locations).unwrap();
    }

    fn target(game: &GameState) -> Coord {
        game.current_location().unwrap().coord()
    }

    #[test]
    fn test_settings_defaults() {
        let settings: RoomSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, RoomSettings::default());
        assert_eq!(settings.total_rounds, 5);
        assert_eq!(settings.category, "all");
        assert_eq!(settings.time_limit, 0);
        assert_eq!(settings.game_mode, GameMode::Classic);
    }

    #[test]
    fn test_settings_wire_names() {
        let settings: RoomSettings =
            serde_json::from_str(r#"{"game_mode":"battle-royale","total_rounds":3}"#).unwrap();
        assert_eq!(settings.game_mode, GameMode::BattleRoyale);
        assert_eq!(settings.total_rounds, 3);

        let legacy: RoomSettings = serde_json::from_str(r#"{"game_mode":"normal"}"#).unwrap();
        assert_eq!(legacy.game_mode, GameMode::Classic);
    }

    #[test]
    fn test_settings_normalized() {
        let s = RoomSettings {
            total_rounds: 0,
            category: "  ".into(),
            ..RoomSettings::default()
        }
        .normalized();
        assert_eq!(s.total_rounds, 1);
        assert_eq!(s.category, "all");

        let s = RoomSettings {
            total_rounds: 200,
            category: "Sumatera".into(),
            ..RoomSettings::default()
        }
        .normalized();
        assert_eq!(s.total_rounds, MAX_ROUNDS);
        assert_eq!(s.category, "sumatera");
    }

    #[test]
    fn test_oversized_round_count_saturates() {
        let settings: RoomSettings = serde_json::from_str(r#"{"total_rounds":300}"#).unwrap();
        assert_eq!(settings.total_rounds, u8::MAX);
        assert_eq!(settings.normalized().total_rounds, MAX_ROUNDS);

        assert!(serde_json::from_str::<RoomSettings>(r#"{"total_rounds":-1}"#).is_err());
    }

    #[test]
    fn test_room_holds_at_most_two() {
        let (mut game, _, _) = make_game(GameMode::Classic, 5);
        let third = Player::new(Uuid::new_v4(), "Citra".into());
        assert_eq!(game.add_player(third), Err(GameError::RoomFull));
        assert_eq!(game.players.len(), 2);
    }

    #[test]
    fn test_join_after_start_rejected() {
        let host = Player::new(Uuid::new_v4(), "Ayu".into());
        let mut game = GameState::new(host, RoomSettings::default());
        start(&mut game);
        let late = Player::new(Uuid::new_v4(), "Budi".into());
        assert_eq!(game.add_player(late), Err(GameError::GameInProgress));
    }

    #[test]
    fn test_start_sets_playing() {
        let (mut game, _, _) = make_game(GameMode::Classic, 5);
        start(&mut game);
        assert_eq!(game.phase, GamePhase::Playing);
        assert_eq!(game.locations.len(), 5);
        let announce = game.round_start().unwrap();
        assert_eq!(announce.current_round, 1);
        assert_eq!(announce.total_rounds, 5);
        assert_eq!(announce.location, game.locations[0]);
    }

    #[test]
    fn test_start_twice_rejected() {
        let (mut game, _, _) = make_game(GameMode::Classic, 2);
        start(&mut game);
        let again = draw(&game);
        assert_eq!(game.start(again), Err(GameError::GameInProgress));
    }

    #[test]
    fn test_start_needs_a_location_per_round() {
        let (mut game, _, _) = make_game(GameMode::Classic, 3);
        assert_eq!(game.start(Vec::new()), Err(GameError::NotEnoughLocations));
        assert_eq!(game.phase, GamePhase::Waiting);
    }

    #[test]
    fn test_guess_before_start_rejected() {
        let (mut game, host, _) = make_game(GameMode::Classic, 1);
        assert_eq!(
            game.submit_guess(host, Coord::new(0.0, 0.0)),
            Err(GameError::NotPlaying)
        );
    }

    #[test]
    fn test_unknown_player_rejected() {
        let (mut game, _, _) = make_game(GameMode::Classic, 1);
        start(&mut game);
        assert_eq!(
            game.submit_guess(Uuid::new_v4(), Coord::new(0.0, 0.0)),
            Err(GameError::PlayerNotFound)
        );
    }

    #[test]
    fn test_duplicate_guess_has_no_effect() {
        let (mut game, host, _) = make_game(GameMode::Classic, 2);
        start(&mut game);
        let first = Coord::new(-6.0, 106.0);
        assert_eq!(game.submit_guess(host, first), Ok(GuessOutcome::Waiting));
        assert_eq!(
            game.submit_guess(host, Coord::new(10.0, 10.0)),
            Err(GameError::DuplicateSubmission)
        );
        assert_eq!(game.players[0].guess, Some(first));
        assert_eq!(game.current_round, 0);
    }

    #[test]
    fn test_round_finishes_only_when_all_guessed() {
        let (mut game, host, guest) = make_game(GameMode::Classic, 3);
        start(&mut game);
        assert_eq!(game.finish_round(), Err(GameError::RoundIncomplete));

        let t = target(&game);
        assert_eq!(game.submit_guess(host, t), Ok(GuessOutcome::Waiting));
        assert_eq!(game.current_round, 0);

        match game.submit_guess(guest, t).unwrap() {
            GuessOutcome::RoundFinished(result) => {
                assert_eq!(result.round, 1);
                assert_eq!(result.next_round, 2);
                assert!(!result.is_game_over);
            }
            GuessOutcome::Waiting => panic!("round should have finished"),
        }
        assert_eq!(game.current_round, 1);
        assert!(game.players.iter().all(|p| !p.has_submitted && p.guess.is_none()));
        assert_eq!(game.round_start().unwrap().current_round, 2);
    }

    #[test]
    fn test_classic_perfect_single_round() {
        let (mut game, host, guest) = make_game(GameMode::Classic, 1);
        start(&mut game);
        let t = target(&game);
        game.submit_guess(host, t).unwrap();
        let result = match game.submit_guess(guest, t).unwrap() {
            GuessOutcome::RoundFinished(r) => r,
            GuessOutcome::Waiting => panic!("round should have finished"),
        };

        assert!(result.is_game_over);
        for entry in &result.results {
            assert_eq!(entry.distance_km, 0.0);
            assert_eq!(entry.score_added, 5000);
            assert_eq!(entry.total_score, 5000);
            assert_eq!(entry.damage_taken, 0);
        }
        assert_eq!(game.phase, GamePhase::Finished);
        assert_eq!(game.current_round, 1);
        // Tie on score.
        assert_eq!(result.winner, None);
        assert!(game.round_start().is_none());
    }

    #[test]
    fn test_classic_scores_accumulate() {
        let (mut game, host, guest) = make_game(GameMode::Classic, 2);
        start(&mut game);
        for _ in 0..2 {
            let t = target(&game);
            game.submit_guess(host, t).unwrap();
            game.submit_guess(guest, Coord::new(t.lat + 1.0, t.lng)).unwrap();
        }
        assert_eq!(game.phase, GamePhase::Finished);
        assert_eq!(game.players[0].score, 10_000);
        assert!(game.players[1].score < 10_000);
        assert!(game.players[1].score > 0);
        assert_eq!(game.winner(), Some(host));
        assert!(game.players.iter().all(|p| p.health == MAX_HEALTH));
    }

    #[test]
    fn test_battle_royale_damage() {
        let (mut game, host, guest) = make_game(GameMode::BattleRoyale, 5);
        start(&mut game);
        let t = target(&game);
        game.submit_guess(host, t).unwrap();
        // ~300 km due north of the target.
        let far = Coord::new(t.lat + 300.0 / 111.195, t.lng);
        let result = match game.submit_guess(guest, far).unwrap() {
            GuessOutcome::RoundFinished(r) => r,
            GuessOutcome::Waiting => panic!("round should have finished"),
        };

        let loser = &result.results[1];
        assert!((loser.distance_km - 300.0).abs() < 1.0);
        assert_eq!(loser.damage_taken, 2000);
        assert_eq!(loser.health, 3000);
        assert_eq!(result.results[0].damage_taken, 0);
        assert_eq!(result.results[0].health, MAX_HEALTH);
        // No score accumulation in battle royale.
        assert!(result.results.iter().all(|r| r.total_score == 0 && r.score_added == 0));
        assert_eq!(result.results[0].points, 5000);
        assert!(!result.is_game_over);
    }

    #[test]
    fn test_battle_royale_tie_deals_no_damage() {
        let (mut game, host, guest) = make_game(GameMode::BattleRoyale, 3);
        start(&mut game);
        let t = target(&game);
        let guess = Coord::new(t.lat + 1.0, t.lng);
        game.submit_guess(host, guess).unwrap();
        game.submit_guess(guest, guess).unwrap();
        assert!(game.players.iter().all(|p| p.health == MAX_HEALTH));
    }

    #[test]
    fn test_battle_royale_ends_on_zero_health() {
        let (mut game, host, guest) = make_game(GameMode::BattleRoyale, 10);
        start(&mut game);
        let mut last = None;
        for _ in 0..3 {
            let t = target(&game);
            game.submit_guess(host, t).unwrap();
            match game.submit_guess(guest, Coord::new(t.lat + 5.0, t.lng)).unwrap() {
                GuessOutcome::RoundFinished(r) => last = Some(r),
                GuessOutcome::Waiting => panic!("round should have finished"),
            }
        }
        let result = last.unwrap();
        assert!(result.is_game_over);
        assert_eq!(game.phase, GamePhase::Finished);
        assert_eq!(game.current_round, 3);
        assert_eq!(game.players[1].health, 0);
        assert_eq!(result.winner, Some(host));
    }

    #[test]
    fn test_battle_royale_survivor_with_more_health_wins() {
        let (mut game, host, guest) = make_game(GameMode::BattleRoyale, 1);
        start(&mut game);
        let t = target(&game);
        game.submit_guess(host, t).unwrap();
        let result = match game.submit_guess(guest, Coord::new(t.lat + 1.0, t.lng)).unwrap() {
            GuessOutcome::RoundFinished(r) => r,
            GuessOutcome::Waiting => panic!("round should have finished"),
        };
        assert!(result.is_game_over);
        assert!(game.players.iter().all(|p| p.health > 0));
        assert!(game.players[1].health < game.players[0].health);
        assert_eq!(result.winner, Some(host));
    }

    #[test]
    fn test_battle_royale_solo_takes_no_damage() {
        let host = Player::new(Uuid::new_v4(), "Ayu".into());
        let host_id = host.id;
        let settings = RoomSettings {
            game_mode: GameMode::BattleRoyale,
            ..RoomSettings::default()
        };
        let mut game = GameState::new(host, settings);
        start(&mut game);
        let result = match game.submit_guess(host_id, SENTINEL_GUESS).unwrap() {
            GuessOutcome::RoundFinished(r) => r,
            GuessOutcome::Waiting => panic!("solo round should finish immediately"),
        };
        assert_eq!(result.results[0].health, MAX_HEALTH);
    }

    #[test]
    fn test_remove_player_mid_round_lets_round_finish() {
        let (mut game, host, guest) = make_game(GameMode::Classic, 3);
        start(&mut game);
        game.submit_guess(host, target(&game)).unwrap();
        assert!(game.remove_player(guest));
        assert!(game.all_submitted());
        let result = game.finish_round().unwrap();
        assert_eq!(result.results.len(), 1);
        assert!(!game.remove_player(guest));
    }

    #[test]
    fn test_reset_restores_lobby() {
        let (mut game, host, guest) = make_game(GameMode::BattleRoyale, 1);
        start(&mut game);
        let t = target(&game);
        game.submit_guess(host, t).unwrap();
        game.submit_guess(guest, Coord::new(t.lat + 2.0, t.lng)).unwrap();
        assert_eq!(game.phase, GamePhase::Finished);

        game.reset();
        assert_eq!(game.phase, GamePhase::Waiting);
        assert_eq!(game.current_round, 0);
        assert!(game.locations.is_empty());
        assert_eq!(game.player_ids(), vec![host, guest]);
        for p in &game.players {
            assert_eq!(p.score, 0);
            assert_eq!(p.health, MAX_HEALTH);
            assert!(!p.has_submitted);
        }

        // Playable again after a reset.
        start(&mut game);
        assert_eq!(game.phase, GamePhase::Playing);
    }

    #[test]
    fn test_host_is_first_entrant() {
        let (mut game, host, guest) = make_game(GameMode::Classic, 1);
        assert_eq!(game.host_id(), Some(host));
        game.remove_player(host);
        assert_eq!(game.host_id(), Some(guest));
    }
}
