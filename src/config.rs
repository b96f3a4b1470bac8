//! Environment parameters consumed by the surveillance core.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, TopologyError};
use crate::facts::Point2D;

pub const NUMBER_ROOMS: usize = 4;
pub const NUMBER_CORRIDORS: usize = 3;
pub const NUMBER_DOORS: usize = 7;

/// Width and height of the area waypoints are sampled from.
pub const ENVIRONMENT_SIZE: [f32; 2] = [10.0, 10.0];
pub const INIT_POINT: [f32; 2] = [0.0, 0.0];

pub const SURVEILLANCE_TICKS: u32 = 20;
pub const SURVEILLANCE_TICK_MS: u64 = 150;
pub const POLL_INTERVAL_MS: u64 = 100;

pub const ROBOT: &str = "Robot1";
/// Home corridor hosting the charging station; the robot spawns here.
pub const CHARGE_LOCATION: &str = "E";

pub const ONTOLOGY_IRI: &str = "http://bnc/exp-rob-lab/2022-23";
pub const ONTOLOGY_FILE: &str = "topological_map/topological_map.json";

/// Seed timestamp far enough in the past to make every location urgent at boot.
pub const PAST_EPOCH: i64 = 1_000_000_000;
pub const URGENCY_THRESHOLD_SECS: i64 = 7;

/// Layout, timing and naming parameters. Loaded from JSON, defaults otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveillanceConfig {
    pub rooms: usize,
    /// Interior corridors plus the home corridor.
    pub corridors: usize,
    pub doors: usize,
    pub environment_size: [f32; 2],
    pub init_point: [f32; 2],
    pub surveillance_ticks: u32,
    pub surveillance_tick_ms: u64,
    pub poll_interval_ms: u64,
    pub robot: String,
    pub charge_location: String,
    pub ontology_iri: String,
    pub ontology_file: PathBuf,
    /// Where to dump the populated ontology after map generation, if anywhere.
    pub debug_ontology_file: Option<PathBuf>,
    pub past_epoch: i64,
    pub urgency_threshold_secs: i64,
}

impl Default for SurveillanceConfig {
    fn default() -> Self {
        Self {
            rooms: NUMBER_ROOMS,
            corridors: NUMBER_CORRIDORS,
            doors: NUMBER_DOORS,
            environment_size: ENVIRONMENT_SIZE,
            init_point: INIT_POINT,
            surveillance_ticks: SURVEILLANCE_TICKS,
            surveillance_tick_ms: SURVEILLANCE_TICK_MS,
            poll_interval_ms: POLL_INTERVAL_MS,
            robot: ROBOT.to_string(),
            charge_location: CHARGE_LOCATION.to_string(),
            ontology_iri: ONTOLOGY_IRI.to_string(),
            ontology_file: PathBuf::from(ONTOLOGY_FILE),
            debug_ontology_file: None,
            past_epoch: PAST_EPOCH,
            urgency_threshold_secs: URGENCY_THRESHOLD_SECS,
        }
    }
}

impl SurveillanceConfig {
    /// Reads a JSON config file; missing fields fall back to the defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn interior_corridors(&self) -> usize {
        self.corridors.saturating_sub(1)
    }

    /// Door count the wiring pattern needs: one per room, one between each pair of
    /// consecutive interior corridors, one from each interior corridor to home.
    pub fn required_doors(&self) -> usize {
        let interior = self.interior_corridors();
        self.rooms + interior.saturating_sub(1) + interior
    }

    /// Checks that the counts fit the wiring pattern.
    pub fn validate_layout(&self) -> Result<(), TopologyError> {
        let interior = self.interior_corridors();
        if interior == 0 {
            return Err(TopologyError::NoInteriorCorridor);
        }
        if self.rooms < interior {
            return Err(TopologyError::TooFewRooms {
                rooms: self.rooms,
                interior,
            });
        }
        if self.doors != self.required_doors() {
            return Err(TopologyError::DoorCount {
                rooms: self.rooms,
                corridors: self.corridors,
                required: self.required_doors(),
                doors: self.doors,
            });
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.validate_layout()?;
        if self.environment_size.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(Error::Config("environment size must be positive".to_string()));
        }
        Ok(())
    }

    pub fn init_point(&self) -> Point2D {
        Point2D::new(self.init_point[0], self.init_point[1])
    }

    pub fn surveillance_tick(&self) -> Duration {
        Duration::from_millis(self.surveillance_tick_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_is_valid() {
        let config = SurveillanceConfig::default();
        assert_eq!(config.required_doors(), NUMBER_DOORS);
        config.validate().expect("default config must validate");
    }

    #[test]
    fn rejects_inconsistent_door_count() {
        let config = SurveillanceConfig {
            doors: 6,
            ..Default::default()
        };
        assert_eq!(
            config.validate_layout(),
            Err(TopologyError::DoorCount {
                rooms: 4,
                corridors: 3,
                required: 7,
                doors: 6,
            })
        );
        assert!(matches!(config.validate(), Err(Error::Topology(_))));
    }

    #[test]
    fn rejects_degenerate_environment_size() {
        let config = SurveillanceConfig {
            environment_size: [0.0, 10.0],
            ..Default::default()
        };
        config.validate_layout().expect("layout itself is fine");
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "surveillance_ticks": 5, "poll_interval_ms": 10 }"#)
            .expect("write config");

        let config = SurveillanceConfig::from_file(&path).expect("config loads");
        assert_eq!(config.surveillance_ticks, 5);
        assert_eq!(config.poll_interval(), Duration::from_millis(10));
        assert_eq!(config.robot, ROBOT);
        assert_eq!(config.rooms, NUMBER_ROOMS);
    }
}
