//! Topological map and motion primitives.
//!
//! These are the typed structures exchanged between the topology generator, the
//! coordinator and the motion task services. Geometry is deliberately thin: a
//! location is a node, a door is the edge label shared by two nodes.

use std::collections::{BTreeSet, HashSet, VecDeque};

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// A simple 2D coordinate wrapper.
///
/// Internally uses [`nalgebra::Vector2<f32>`] for downstream math convenience.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2D(pub Vector2<f32>);

impl Point2D {
    /// Convenience constructor.
    pub fn new(x: f32, y: f32) -> Self {
        Self(Vector2::new(x, y))
    }

    pub fn x(&self) -> f32 {
        self.0.x
    }

    pub fn y(&self) -> f32 {
        self.0.y
    }

    pub fn distance(&self, other: &Point2D) -> f32 {
        (self.0 - other.0).norm()
    }
}

impl Default for Point2D {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// What a location is, as far as the surveillance policy cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocationKind {
    Room,
    Corridor,
    /// The fixed corridor hosting the charging station.
    Home,
}

/// A node of the topological map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub kind: LocationKind,
    pub doors: BTreeSet<String>,
    /// Last visit, unix epoch seconds.
    pub visited_at: i64,
}

/// A door and the two locations it joins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Door {
    pub id: String,
    pub connects: (String, String),
}

/// The full map produced at start-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Map {
    pub locations: Vec<Location>,
    pub doors: Vec<Door>,
    pub home: String,
}

impl Map {
    pub fn rooms(&self) -> impl Iterator<Item = &Location> {
        self.locations
            .iter()
            .filter(|l| l.kind == LocationKind::Room)
    }

    /// Locations sharing at least one door with `id`.
    pub fn neighbours(&self, id: &str) -> Vec<&str> {
        self.doors
            .iter()
            .filter_map(|d| {
                let (a, b) = (&d.connects.0, &d.connects.1);
                if a == id {
                    Some(b.as_str())
                } else if b == id {
                    Some(a.as_str())
                } else {
                    None
                }
            })
            .collect()
    }

    /// Breadth-first closure of the "shares a door" relation.
    pub fn reachable_from(&self, id: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([id.to_string()]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            for next in self.neighbours(&current) {
                if !seen.contains(next) {
                    queue.push_back(next.to_string());
                }
            }
        }
        seen
    }

    /// True when every location can be reached from home.
    pub fn is_connected(&self) -> bool {
        let reached = self.reachable_from(&self.home);
        self.locations.iter().all(|l| reached.contains(&l.id))
    }
}

/// Planning request: where the robot is and where it should end up.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanGoal {
    pub current: Point2D,
    pub target: Point2D,
}

/// Following request: the via-points returned by a completed plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowGoal {
    pub via_points: Vec<Point2D>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(id: &str, kind: LocationKind, doors: &[&str]) -> Location {
        Location {
            id: id.to_string(),
            kind,
            doors: doors.iter().map(|d| d.to_string()).collect(),
            visited_at: 0,
        }
    }

    fn door(id: &str, a: &str, b: &str) -> Door {
        Door {
            id: id.to_string(),
            connects: (a.to_string(), b.to_string()),
        }
    }

    #[test]
    fn detects_disconnected_room() {
        let mut map = Map {
            locations: vec![
                location("E", LocationKind::Home, &["D1"]),
                location("C1", LocationKind::Corridor, &["D1", "D2"]),
                location("R1", LocationKind::Room, &["D2"]),
                location("R2", LocationKind::Room, &["D3"]),
            ],
            doors: vec![door("D1", "E", "C1"), door("D2", "C1", "R1")],
            home: "E".to_string(),
        };
        assert!(!map.is_connected());

        map.doors.push(door("D3", "R2", "C1"));
        assert!(map.is_connected());
        assert_eq!(map.neighbours("C1").len(), 3);
    }

    #[test]
    fn point_distance() {
        let a = Point2D::new(0.0, 0.0);
        let b = Point2D::new(3.0, 4.0);
        assert!((a.distance(&b) - 5.0).abs() < f32::EPSILON);
    }
}
