//! World configuration: seed, size, terrain generator knobs, points of
//! interest, and the spawn point.
//!
//! The server never interprets the generator knobs; it only hands them to
//! clients, which run the terrain generator themselves.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::world::position::Position;

/// World dimensions in tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapSize {
    pub x: u32,
    pub y: u32,
}

/// One terrain generator parameter. Whole numbers stay integers on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeneratorKnob {
    Int(i64),
    Float(f64),
}

impl GeneratorKnob {
    pub fn as_f64(self) -> f64 {
        match self {
            GeneratorKnob::Int(v) => v as f64,
            GeneratorKnob::Float(v) => v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub map_seed: i64,
    pub map_size: MapSize,
    pub map_generator_settings: IndexMap<String, GeneratorKnob>,
    pub map_poi: IndexMap<String, Position>,
    pub player_spawn_point: Position,
}

impl ServerConfig {
    /// The subset of the config clients need to regenerate the base terrain.
    pub fn map_data(&self) -> MapData<'_> {
        MapData {
            map_seed: self.map_seed,
            map_size: self.map_size,
            map_generator_settings: &self.map_generator_settings,
            map_poi: &self.map_poi,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        let map_size = MapSize { x: 200, y: 300 };
        let center = map_size.x as f64 / 2.0;

        use GeneratorKnob::{Float, Int};
        let map_generator_settings = [
            ("start_height", Int(12)),
            ("map_octaves", Int(7)),
            ("map_period", Int(7)),
            ("map_lacunarity", Float(0.85)),
            ("ore_octaves", Float(4.42)),
            ("ore_period", Float(1.85)),
            ("ore_lacunarity", Float(0.5)),
            ("ore_persistency", Float(0.45)),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();

        let map_poi = [("shop", 8.0), ("refinery", 16.0), ("rocket", 24.0)]
            .into_iter()
            .map(|(name, offset)| (name.to_string(), Position::new(center + offset, 0.0)))
            .collect();

        Self {
            map_seed: 42069,
            map_size,
            map_generator_settings,
            map_poi,
            player_spawn_point: Position::new(3200.0, 300.0),
        }
    }
}

/// Borrowed reply body for a map-data request.
#[derive(Debug, Serialize)]
pub struct MapData<'a> {
    pub map_seed: i64,
    pub map_size: MapSize,
    pub map_generator_settings: &'a IndexMap<String, GeneratorKnob>,
    pub map_poi: &'a IndexMap<String, Position>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_poi_sit_right_of_center() {
        let config = ServerConfig::default();
        assert_eq!(config.map_poi["shop"], Position::new(108.0, 0.0));
        assert_eq!(config.map_poi["refinery"], Position::new(116.0, 0.0));
        assert_eq!(config.map_poi["rocket"], Position::new(124.0, 0.0));
    }

    #[test]
    fn map_data_omits_spawn_point() {
        let config = ServerConfig::default();
        let value = serde_json::to_value(config.map_data()).unwrap();
        assert_eq!(value["map_seed"], 42069);
        assert!(value.get("player_spawn_point").is_none());
        let knobs: Vec<_> = value["map_generator_settings"]
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        assert_eq!(knobs.first().map(String::as_str), Some("start_height"));
    }

    #[test]
    fn whole_number_knobs_stay_integers() {
        let config = ServerConfig::default();
        let json = serde_json::to_string(&config.map_data()).unwrap();
        assert!(json.contains(r#""start_height":12,"#));
        assert!(json.contains(r#""map_lacunarity":0.85"#));

        let back: ServerConfig =
            serde_json::from_str(&serde_json::to_string(&config).unwrap()).unwrap();
        assert_eq!(back.map_generator_settings["map_octaves"], GeneratorKnob::Int(7));
        assert_eq!(back.map_generator_settings["ore_period"].as_f64(), 1.85);
    }
}
