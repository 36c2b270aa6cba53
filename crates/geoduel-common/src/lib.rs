pub mod game;
pub mod location;
pub mod player;
pub mod protocol;
pub mod room_code;
pub mod scoring;
