use crate::location::Coord;

pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const MAX_SCORE: u32 = 5000;
/// Distance over which the score decays by a factor of e.
pub const SCORE_DECAY_KM: f64 = 1000.0;
pub const MAX_DAMAGE: u32 = 2000;
pub const DAMAGE_PER_KM: f64 = 10.0;
pub const MAX_HEALTH: u32 = 5000;

/// Great-circle distance in kilometres (haversine).
pub fn distance_km(a: Coord, b: Coord) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    // Rounding can push h slightly outside [0, 1] near antipodes.
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// `floor(5000 * e^(-d / 1000))`, in `0..=5000`.
pub fn score_for_distance(distance_km: f64) -> u32 {
    if distance_km.is_nan() {
        return 0;
    }
    let distance = distance_km.max(0.0);
    let score = (MAX_SCORE as f64 * (-distance / SCORE_DECAY_KM).exp()).floor();
    (score as u32).min(MAX_SCORE)
}

/// Damage dealt to the round loser in battle royale, in `0..=2000`.
///
/// Zero when the "winner" was not actually closer.
pub fn damage_for_distances(winner_km: f64, loser_km: f64) -> u32 {
    let raw = ((loser_km - winner_km) * DAMAGE_PER_KM).floor();
    if raw.is_nan() || raw <= 0.0 {
        return 0;
    }
    raw.min(MAX_DAMAGE as f64) as u32
}
