//! Randomized map generation.
//!
//! Rooms, doors and interior corridors are numbered, shuffled independently, then
//! wired with a fixed pattern: each room gets its own door, rooms hang off the
//! interior corridors in contiguous blocks, consecutive interior corridors share a
//! door, and every interior corridor has one door into home. The result is always
//! connected no matter how the shuffles fall.

use std::collections::{BTreeMap, BTreeSet};

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;

use crate::config::SurveillanceConfig;
use crate::error::{Result, TopologyError};
use crate::facts::{Door, Location, LocationKind, Map};
use crate::kb::KnowledgeBaseClient;

/// Generates map layouts for one [`SurveillanceConfig`].
#[derive(Debug, Clone)]
pub struct TopologyGenerator {
    config: SurveillanceConfig,
}

/// Every `hasDoor` assertion of a generated map, in insertion order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wiring {
    pub rooms: Vec<String>,
    pub corridors: Vec<String>,
    pub doors: Vec<String>,
    pub has_door: Vec<(String, String)>,
}

impl TopologyGenerator {
    pub fn new(config: SurveillanceConfig) -> Self {
        Self { config }
    }

    /// Shuffles identifiers and wires them. Pure: touches no knowledge base.
    pub fn generate<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> std::result::Result<Wiring, TopologyError> {
        self.config.validate_layout()?;
        let home = self.config.charge_location.as_str();
        let interior = self.config.interior_corridors();

        let mut rooms: Vec<String> = (1..=self.config.rooms).map(|i| format!("R{i}")).collect();
        let mut doors: Vec<String> = (1..=self.config.doors).map(|i| format!("D{i}")).collect();
        let mut corridors: Vec<String> = (1..=interior).map(|i| format!("C{i}")).collect();
        rooms.shuffle(rng);
        doors.shuffle(rng);
        corridors.shuffle(rng);

        let mut has_door = Vec::with_capacity(2 * self.config.doors);
        for (room, door) in rooms.iter().zip(&doors) {
            has_door.push((room.clone(), door.clone()));
        }

        // Room i belongs to corridor i * interior / rooms.
        for (i, door) in doors.iter().take(rooms.len()).enumerate() {
            let corridor = &corridors[i * interior / rooms.len()];
            has_door.push((corridor.clone(), door.clone()));
        }

        let mut next = doors[rooms.len()..].iter();
        for pair in corridors.windows(2) {
            if let Some(door) = next.next() {
                has_door.push((pair[0].clone(), door.clone()));
                has_door.push((pair[1].clone(), door.clone()));
            }
        }
        for corridor in &corridors {
            if let Some(door) = next.next() {
                has_door.push((corridor.clone(), door.clone()));
                has_door.push((home.to_string(), door.clone()));
            }
        }

        corridors.push(home.to_string());
        Ok(Wiring {
            rooms,
            corridors,
            doors,
            has_door,
        })
    }

    /// Builds the map model for `wiring`, with home visited at `now` and every
    /// other location at the configured past epoch.
    pub fn map(&self, wiring: &Wiring, now: i64) -> Map {
        let home = &self.config.charge_location;
        let mut doors_of: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
        let mut sides_of: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for (location, door) in &wiring.has_door {
            doors_of
                .entry(location.as_str())
                .or_default()
                .insert(door.clone());
            sides_of.entry(door.as_str()).or_default().push(location.clone());
        }

        let locations = wiring
            .rooms
            .iter()
            .map(|r| (r, LocationKind::Room))
            .chain(wiring.corridors.iter().map(|c| {
                let kind = if c == home {
                    LocationKind::Home
                } else {
                    LocationKind::Corridor
                };
                (c, kind)
            }))
            .map(|(id, kind)| Location {
                id: id.clone(),
                kind,
                doors: doors_of.get(id.as_str()).cloned().unwrap_or_default(),
                visited_at: if kind == LocationKind::Home {
                    now
                } else {
                    self.config.past_epoch
                },
            })
            .collect();

        let doors = wiring
            .doors
            .iter()
            .filter_map(|d| match sides_of.get(d.as_str()).map(Vec::as_slice) {
                Some([a, b]) => Some(Door {
                    id: d.clone(),
                    connects: (a.clone(), b.clone()),
                }),
                _ => None,
            })
            .collect();

        Map {
            locations,
            doors,
            home: home.clone(),
        }
    }

    /// Generates a map and loads it into the knowledge base.
    ///
    /// Not safe to call twice against the same knowledge base: facts are added,
    /// never cleared.
    #[tracing::instrument(skip_all)]
    pub async fn build_environment(&self, kb: &KnowledgeBaseClient, now: i64) -> Result<Map> {
        let wiring = self.generate(&mut rand::thread_rng())?;
        info!(rooms = ?wiring.rooms, doors = ?wiring.doors, corridors = ?wiring.corridors, "generating map");

        for (location, door) in &wiring.has_door {
            kb.add_object_property("hasDoor", location, door).await?;
        }

        let individuals: Vec<String> = wiring
            .rooms
            .iter()
            .chain(&wiring.corridors)
            .chain(&wiring.doors)
            .cloned()
            .collect();
        kb.disjoint_individuals(&individuals).await?;

        let robot = self.config.robot.as_str();
        let home = self.config.charge_location.as_str();
        kb.add_object_property("isIn", robot, home).await?;
        kb.add_timestamp("now", robot, now).await?;

        // Everything starts long unvisited so the first cycle sees it all as urgent.
        for location in wiring.rooms.iter().chain(&wiring.corridors) {
            kb.add_timestamp("visitedAt", location, self.config.past_epoch)
                .await?;
        }

        // The robot spawns at home, which is therefore not urgent.
        kb.reason().await?;
        let previous = kb
            .query_timestamps("visitedAt", home)
            .await?
            .first()
            .copied()
            .unwrap_or(self.config.past_epoch);
        kb.replace_timestamp("visitedAt", home, now, previous).await?;

        if let Some(path) = &self.config.debug_ontology_file {
            kb.save_file(&path.to_string_lossy()).await?;
        }

        info!("map generated in the ontology");
        Ok(self.map(&wiring, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator() -> TopologyGenerator {
        TopologyGenerator::new(SurveillanceConfig::default())
    }

    #[test]
    fn default_wiring_matches_layout() {
        let generator = generator();
        let wiring = generator.generate(&mut rand::thread_rng()).unwrap();
        assert_eq!(wiring.rooms.len(), 4);
        assert_eq!(wiring.doors.len(), 7);
        assert_eq!(wiring.corridors.len(), 3);
        assert_eq!(wiring.corridors.last().map(String::as_str), Some("E"));
        // 4 room doors, both sides of 3 corridor doors, plus 4 corridor-side room doors.
        assert_eq!(wiring.has_door.len(), 4 + 4 + 2 * 3);
    }

    #[test]
    fn every_room_has_one_door_and_map_is_connected() {
        let generator = generator();
        for _ in 0..200 {
            let wiring = generator.generate(&mut rand::thread_rng()).unwrap();
            let map = generator.map(&wiring, 2_000_000_000);
            for room in map.rooms() {
                assert_eq!(room.doors.len(), 1, "room {} has {:?}", room.id, room.doors);
            }
            assert_eq!(map.doors.len(), 7);
            assert!(map.is_connected());
        }
    }

    #[test]
    fn larger_layouts_stay_connected() {
        let generator = TopologyGenerator::new(SurveillanceConfig {
            rooms: 7,
            corridors: 4,
            doors: 7 + 2 + 3,
            ..Default::default()
        });
        for _ in 0..50 {
            let wiring = generator.generate(&mut rand::thread_rng()).unwrap();
            let map = generator.map(&wiring, 0);
            assert!(map.is_connected());
            assert_eq!(map.rooms().count(), 7);
        }
    }

    #[test]
    fn inconsistent_counts_are_refused_before_shuffling() {
        let generator = TopologyGenerator::new(SurveillanceConfig {
            rooms: 1,
            corridors: 3,
            doors: 4,
            ..Default::default()
        });
        assert_eq!(
            generator.generate(&mut rand::thread_rng()),
            Err(TopologyError::TooFewRooms {
                rooms: 1,
                interior: 2,
            })
        );

        let generator = TopologyGenerator::new(SurveillanceConfig {
            corridors: 1,
            ..Default::default()
        });
        assert_eq!(
            generator.generate(&mut rand::thread_rng()),
            Err(TopologyError::NoInteriorCorridor)
        );
    }

    #[test]
    fn home_is_fresh_and_the_rest_is_stale() {
        let generator = generator();
        let wiring = generator.generate(&mut rand::thread_rng()).unwrap();
        let map = generator.map(&wiring, 1_700_000_000);
        for location in &map.locations {
            if location.id == "E" {
                assert_eq!(location.kind, LocationKind::Home);
                assert_eq!(location.visited_at, 1_700_000_000);
            } else {
                assert_eq!(location.visited_at, 1_000_000_000);
            }
        }
    }
}
