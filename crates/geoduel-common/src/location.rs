use std::path::Path;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Category filter that selects over the whole catalog.
pub const CATEGORY_ALL: &str = "all";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub lat: f64,
    pub lng: f64,
}

impl Coord {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: u32,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub categories: Vec<String>,
}

impl Location {
    pub fn coord(&self) -> Coord {
        Coord::new(self.lat, self.lng)
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c.eq_ignore_ascii_case(category))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("location catalog is empty")]
    Empty,
    #[error("failed to read location catalog: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse location catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Immutable set of candidate target locations. Never empty.
#[derive(Debug, Clone)]
pub struct LocationCatalog {
    locations: Vec<Location>,
}

impl LocationCatalog {
    pub fn new(locations: Vec<Location>) -> Result<Self, CatalogError> {
        if locations.is_empty() {
            return Err(CatalogError::Empty);
        }
        Ok(Self { locations })
    }

    /// Load a catalog from a JSON array of locations.
    pub fn from_json(data: &str) -> Result<Self, CatalogError> {
        let locations: Vec<Location> = serde_json::from_str(data)?;
        Self::new(locations)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    /// The built-in set of Indonesian landmarks.
    pub fn builtin() -> Self {
        fn entry(id: u32, name: &str, lat: f64, lng: f64, categories: &[&str]) -> Location {
            Location {
                id,
                name: name.to_string(),
                lat,
                lng,
                categories: categories.iter().map(|c| c.to_string()).collect(),
            }
        }

        Self {
            locations: vec![
                entry(1, "Monas", -6.175392, 106.827153, &["java-bali", "city"]),
                entry(2, "Candi Borobudur", -7.607873, 110.203751, &["java-bali"]),
                entry(3, "Gedung Sate", -6.902481, 107.618810, &["java-bali", "city"]),
                entry(4, "Jembatan Ampera", -2.992015, 104.760089, &["sumatera", "city"]),
                entry(5, "Piaynemo, Raja Ampat", -0.565076, 130.270920, &["extreme"]),
                entry(6, "Simpang Lima Semarang", -6.991196, 110.422891, &["java-bali", "city"]),
                entry(7, "Tugu Yogyakarta", -7.782873, 110.367073, &["java-bali", "city"]),
                entry(8, "Kelingking Beach", -8.750694, 115.474636, &["java-bali", "extreme"]),
                entry(9, "Danau Toba", 2.615590, 98.830780, &["sumatera", "extreme"]),
                entry(10, "Jam Gadang", -0.305290, 100.369320, &["sumatera", "city"]),
                entry(11, "Pantai Losari", -5.143470, 119.407600, &["city"]),
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    /// Pick a location uniformly among those tagged with `category`.
    ///
    /// `all` (or an empty filter) selects over the whole catalog, and so does
    /// a filter that matches nothing.
    pub fn pick_random(&self, category: &str, rng: &mut impl Rng) -> &Location {
        let matching: Vec<&Location> = if category.is_empty() || category == CATEGORY_ALL {
            Vec::new()
        } else {
            self.locations
                .iter()
                .filter(|l| l.has_category(category))
                .collect()
        };

        if let Some(location) = matching.choose(rng).copied() {
            return location;
        }
        let index = rng.gen_range(0..self.locations.len());
        &self.locations[index]
    }

    /// Draw `count` locations for one game session. Repeats are allowed.
    pub fn pick_many(&self, category: &str, count: usize, rng: &mut impl Rng) -> Vec<Location> {
        (0..count)
            .map(|_| self.pick_random(category, rng).clone())
            .collect()
    }
}

impl Default for LocationCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
