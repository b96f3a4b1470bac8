//! Sled-backed knowledge base.
//!
//! A local stand-in for the external ontology service. It stores asserted facts in
//! sled trees and answers the same command protocol, with the same decorated
//! response strings. `REASON` recomputes the inferred layer:
//!
//! - `LOCATION` for anything with a door, `ROOM` for exactly one door, `CORRIDOR` for
//!   two or more, `DOOR` for the doors themselves;
//! - `connectedTo` between locations sharing a door;
//! - `canReach` from each robot to the locations connected to where it `isIn`;
//! - `URGENT` for rooms whose `visitedAt` lags the robot's `now` by more than the
//!   urgency threshold. Corridors are never `URGENT`: they are passed through on
//!   the way to rooms, and target selection already ranks them above stale rooms
//!   that are not urgent.
//!
//! Queries read asserted facts plus whatever the last `REASON` inferred, so callers
//! must reason after mutating to see fresh classifications.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::response::{format_individual, format_literal};
use super::{Command, KbRequest, KnowledgeBase, PrimarySpec};
use crate::config::{ONTOLOGY_IRI, URGENCY_THRESHOLD_SECS};
use crate::error::KbError;
use crate::unix_now;

const OBJECT_TREE: &str = "object_facts";
const DATA_TREE: &str = "data_facts";
const INFERRED_OBJECT_TREE: &str = "inferred_object_facts";
const CLASS_TREE: &str = "inferred_classes";
const DISJOINT_TREE: &str = "disjoint";
const META_TREE: &str = "meta";
const IRI_KEY: &[u8] = b"iri";

const SEP: char = '\u{1f}';
const EMPTY: &[u8] = &[];

fn key(parts: &[&str]) -> Vec<u8> {
    parts.join(&SEP.to_string()).into_bytes()
}

fn prefix(parts: &[&str]) -> Vec<u8> {
    let mut k = key(parts);
    k.extend_from_slice(SEP.to_string().as_bytes());
    k
}

fn split_key(raw: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(raw)
        .split(SEP)
        .map(str::to_string)
        .collect()
}

/// The first `N` positional arguments, or a rejection naming the shortfall.
fn leading_args<const N: usize>(request: &KbRequest) -> Result<[&str; N], KbError> {
    if request.args.len() < N {
        return Err(KbError::Rejected {
            command: request.command.to_string(),
            reason: format!("expected {N} arguments, got {}", request.args.len()),
        });
    }
    Ok(std::array::from_fn(|i| request.args[i].as_str()))
}

/// Portable dump of the asserted facts, used by `LOAD FILE` and `SAVE`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    iri: String,
    object_facts: Vec<(String, String, String)>,
    /// (property, subject, datatype, value)
    data_facts: Vec<(String, String, String, String)>,
    disjoint: Vec<Vec<String>>,
}

/// Ontology kept in a sled database, answering [`KbRequest`]s in-process.
pub struct SledOntology {
    db: sled::Db,
    urgency_threshold: i64,
}

impl std::fmt::Debug for SledOntology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledOntology")
            .field("urgency_threshold", &self.urgency_threshold)
            .finish()
    }
}

impl Drop for SledOntology {
    fn drop(&mut self) {
        if let Err(e) = self.db.flush() {
            warn!(error = %e, "failed to flush ontology on drop");
        }
    }
}

impl SledOntology {
    /// Opens or creates the ontology database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KbError> {
        Ok(Self::from_db(sled::open(path)?))
    }

    /// An ontology living only as long as this value.
    pub fn temporary() -> Result<Self, KbError> {
        Ok(Self::from_db(sled::Config::new().temporary(true).open()?))
    }

    pub fn from_db(db: sled::Db) -> Self {
        Self {
            db,
            urgency_threshold: URGENCY_THRESHOLD_SECS,
        }
    }

    pub fn with_urgency_threshold(mut self, secs: i64) -> Self {
        self.urgency_threshold = secs;
        self
    }

    fn iri(&self) -> Result<String, KbError> {
        let meta = self.db.open_tree(META_TREE)?;
        Ok(meta
            .get(IRI_KEY)?
            .map(|v| String::from_utf8_lossy(&v).into_owned())
            .unwrap_or_else(|| ONTOLOGY_IRI.to_string()))
    }

    fn handle(&self, request: &KbRequest) -> Result<Vec<String>, KbError> {
        match (request.command, request.primary) {
            (Command::Load, PrimarySpec::File) => {
                let [path, iri] = leading_args(request)?;
                self.load(path, iri)?;
                Ok(Vec::new())
            }
            (Command::Save, _) => {
                let [path] = leading_args(request)?;
                self.save(path)?;
                Ok(Vec::new())
            }
            (Command::Reason, _) => {
                self.reason()?;
                Ok(Vec::new())
            }
            (Command::Disjoint, PrimarySpec::Ind) => {
                let tree = self.db.open_tree(DISJOINT_TREE)?;
                let id = self.db.generate_id()?;
                let group = serde_json::to_vec(&request.args)
                    .map_err(|e| KbError::Snapshot(e.to_string()))?;
                tree.insert(id.to_be_bytes(), group)?;
                Ok(Vec::new())
            }
            (Command::Add, PrimarySpec::ObjectProp) => {
                let [property, subject, object] = leading_args(request)?;
                let tree = self.db.open_tree(OBJECT_TREE)?;
                tree.insert(key(&[property, subject, object]), EMPTY)?;
                Ok(Vec::new())
            }
            (Command::Replace, PrimarySpec::ObjectProp) => {
                let [property, subject, new, old] = leading_args(request)?;
                let tree = self.db.open_tree(OBJECT_TREE)?;
                tree.remove(key(&[property, subject, old]))?;
                tree.insert(key(&[property, subject, new]), EMPTY)?;
                Ok(Vec::new())
            }
            (Command::Add, PrimarySpec::DataProp) => {
                let [property, subject, datatype, value] = leading_args(request)?;
                let tree = self.db.open_tree(DATA_TREE)?;
                tree.insert(key(&[property, subject, value]), datatype.as_bytes())?;
                Ok(Vec::new())
            }
            (Command::Replace, PrimarySpec::DataProp) => {
                let [property, subject, datatype, new, old] = leading_args(request)?;
                let tree = self.db.open_tree(DATA_TREE)?;
                tree.remove(key(&[property, subject, old]))?;
                tree.insert(key(&[property, subject, new]), datatype.as_bytes())?;
                Ok(Vec::new())
            }
            (Command::Query, PrimarySpec::ObjectProp) => {
                let [property, subject] = leading_args(request)?;
                let iri = self.iri()?;
                let p = prefix(&[property, subject]);
                let mut objects = BTreeSet::new();
                for tree in [OBJECT_TREE, INFERRED_OBJECT_TREE] {
                    for entry in self.db.open_tree(tree)?.scan_prefix(&p) {
                        let (k, _) = entry?;
                        if let Some(object) = split_key(&k).pop() {
                            objects.insert(object);
                        }
                    }
                }
                Ok(objects
                    .iter()
                    .map(|o| format_individual(&iri, o))
                    .collect())
            }
            (Command::Query, PrimarySpec::DataProp) => {
                let [property, subject] = leading_args(request)?;
                let p = prefix(&[property, subject]);
                let mut values = Vec::new();
                for entry in self.db.open_tree(DATA_TREE)?.scan_prefix(&p) {
                    let (k, datatype) = entry?;
                    if let Some(value) = split_key(&k).pop() {
                        values.push(format_literal(&value, &String::from_utf8_lossy(&datatype)));
                    }
                }
                Ok(values)
            }
            (Command::Query, PrimarySpec::Class) => {
                let [individual] = leading_args(request)?;
                let iri = self.iri()?;
                let p = prefix(&[individual]);
                let mut classes = Vec::new();
                for entry in self.db.open_tree(CLASS_TREE)?.scan_prefix(&p) {
                    let (k, _) = entry?;
                    if let Some(class) = split_key(&k).pop() {
                        classes.push(format_individual(&iri, &class));
                    }
                }
                Ok(classes)
            }
            (command, primary) => Err(KbError::Rejected {
                command: command.to_string(),
                reason: format!("unsupported specifier {primary:?}"),
            }),
        }
    }

    fn object_facts(&self) -> Result<Vec<(String, String, String)>, KbError> {
        let mut facts = Vec::new();
        for entry in self.db.open_tree(OBJECT_TREE)?.iter() {
            let (k, _) = entry?;
            if let [p, s, o] = split_key(&k).as_slice() {
                facts.push((p.clone(), s.clone(), o.clone()));
            }
        }
        Ok(facts)
    }

    fn data_facts(&self) -> Result<Vec<(String, String, String, String)>, KbError> {
        let mut facts = Vec::new();
        for entry in self.db.open_tree(DATA_TREE)?.iter() {
            let (k, datatype) = entry?;
            if let [p, s, v] = split_key(&k).as_slice() {
                let datatype = String::from_utf8_lossy(&datatype).into_owned();
                facts.push((p.clone(), s.clone(), datatype, v.clone()));
            }
        }
        Ok(facts)
    }

    /// Latest integer value of a data property per subject.
    fn latest_values(&self, property: &str) -> Result<BTreeMap<String, i64>, KbError> {
        let mut latest = BTreeMap::new();
        for (p, subject, _, value) in self.data_facts()? {
            if p != property {
                continue;
            }
            if let Ok(v) = value.parse::<i64>() {
                let slot = latest.entry(subject).or_insert(v);
                *slot = (*slot).max(v);
            }
        }
        Ok(latest)
    }

    fn reason(&self) -> Result<(), KbError> {
        let objects = self.object_facts()?;

        let mut doors_of: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        let mut sides_of: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        let mut position: BTreeMap<&str, &str> = BTreeMap::new();
        for (p, s, o) in &objects {
            match p.as_str() {
                "hasDoor" => {
                    doors_of.entry(s.as_str()).or_default().insert(o.as_str());
                    sides_of.entry(o.as_str()).or_default().insert(s.as_str());
                }
                "isIn" => {
                    position.insert(s.as_str(), o.as_str());
                }
                _ => {}
            }
        }

        let mut classes: BTreeSet<(String, &str)> = BTreeSet::new();
        let mut inferred: BTreeSet<(&str, String, String)> = BTreeSet::new();

        for (location, doors) in &doors_of {
            classes.insert((location.to_string(), "LOCATION"));
            match doors.len() {
                1 => classes.insert((location.to_string(), "ROOM")),
                _ => classes.insert((location.to_string(), "CORRIDOR")),
            };
        }
        for (door, sides) in &sides_of {
            classes.insert((door.to_string(), "DOOR"));
            for a in sides {
                for b in sides {
                    if a != b {
                        inferred.insert(("connectedTo", a.to_string(), b.to_string()));
                    }
                }
            }
        }

        let now_of = self.latest_values("now")?;
        let visited = self.latest_values("visitedAt")?;
        let mut reference_now = i64::MIN;
        for (robot, here) in &position {
            classes.insert((robot.to_string(), "ROBOT"));
            reference_now = reference_now.max(now_of.get(*robot).copied().unwrap_or_else(unix_now));
            let connected: Vec<(String, String)> = inferred
                .iter()
                .filter(|(p, _, _)| *p == "connectedTo")
                .map(|(_, a, b)| (a.clone(), b.clone()))
                .collect();
            for (a, b) in &connected {
                if a.as_str() == *here {
                    inferred.insert(("canReach", robot.to_string(), b.clone()));
                }
            }
        }
        if reference_now == i64::MIN {
            reference_now = unix_now();
        }

        for (location, doors) in &doors_of {
            if doors.len() != 1 {
                continue;
            }
            if let Some(v) = visited.get(*location) {
                if reference_now - v > self.urgency_threshold {
                    classes.insert((location.to_string(), "URGENT"));
                }
            }
        }

        let inferred_tree = self.db.open_tree(INFERRED_OBJECT_TREE)?;
        let class_tree = self.db.open_tree(CLASS_TREE)?;
        inferred_tree.clear()?;
        class_tree.clear()?;
        for (p, s, o) in &inferred {
            inferred_tree.insert(key(&[*p, s.as_str(), o.as_str()]), EMPTY)?;
        }
        for (individual, class) in &classes {
            class_tree.insert(key(&[individual.as_str(), *class]), EMPTY)?;
        }
        debug!(
            inferred = inferred.len(),
            classes = classes.len(),
            "ontology reasoning pass complete"
        );
        Ok(())
    }

    fn load(&self, path: &str, iri: &str) -> Result<(), KbError> {
        self.db.open_tree(META_TREE)?.insert(IRI_KEY, iri.as_bytes())?;
        let path = Path::new(path);
        if !path.exists() {
            debug!(path = %path.display(), "no ontology snapshot, starting empty");
            return Ok(());
        }
        let raw = std::fs::read(path).map_err(|e| KbError::Snapshot(e.to_string()))?;
        let snapshot: Snapshot =
            serde_json::from_slice(&raw).map_err(|e| KbError::Snapshot(e.to_string()))?;

        let objects = self.db.open_tree(OBJECT_TREE)?;
        for (p, s, o) in &snapshot.object_facts {
            objects.insert(key(&[p.as_str(), s.as_str(), o.as_str()]), EMPTY)?;
        }
        let data = self.db.open_tree(DATA_TREE)?;
        for (p, s, datatype, v) in &snapshot.data_facts {
            data.insert(key(&[p.as_str(), s.as_str(), v.as_str()]), datatype.as_bytes())?;
        }
        let disjoint = self.db.open_tree(DISJOINT_TREE)?;
        for group in &snapshot.disjoint {
            let group =
                serde_json::to_vec(group).map_err(|e| KbError::Snapshot(e.to_string()))?;
            disjoint.insert(self.db.generate_id()?.to_be_bytes(), group)?;
        }
        self.db.flush()?;
        Ok(())
    }

    fn save(&self, path: &str) -> Result<(), KbError> {
        let mut disjoint = Vec::new();
        for entry in self.db.open_tree(DISJOINT_TREE)?.iter() {
            let (_, group) = entry?;
            disjoint.push(
                serde_json::from_slice(&group).map_err(|e| KbError::Snapshot(e.to_string()))?,
            );
        }
        let snapshot = Snapshot {
            iri: self.iri()?,
            object_facts: self.object_facts()?,
            data_facts: self.data_facts()?,
            disjoint,
        };
        let path = Path::new(path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| KbError::Snapshot(e.to_string()))?;
        }
        let raw = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| KbError::Snapshot(e.to_string()))?;
        std::fs::write(path, raw).map_err(|e| KbError::Snapshot(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl KnowledgeBase for SledOntology {
    async fn execute(&self, request: KbRequest) -> Result<Vec<String>, KbError> {
        self.handle(&request)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::kb::KnowledgeBaseClient;

    fn client() -> KnowledgeBaseClient {
        let store = SledOntology::temporary().expect("temporary sled db");
        KnowledgeBaseClient::new(Arc::new(store))
    }

    async fn corridor_with_two_rooms(kb: &KnowledgeBaseClient) {
        kb.add_object_property("hasDoor", "R1", "D1").await.unwrap();
        kb.add_object_property("hasDoor", "C1", "D1").await.unwrap();
        kb.add_object_property("hasDoor", "R2", "D2").await.unwrap();
        kb.add_object_property("hasDoor", "C1", "D2").await.unwrap();
        kb.add_object_property("isIn", "Robot1", "C1").await.unwrap();
    }

    #[tokio::test]
    async fn reasoning_classifies_and_connects() {
        let kb = client();
        corridor_with_two_rooms(&kb).await;
        kb.add_timestamp("now", "Robot1", 2_000).await.unwrap();
        kb.add_timestamp("visitedAt", "R1", 1_000).await.unwrap();
        kb.add_timestamp("visitedAt", "R2", 1_998).await.unwrap();
        kb.reason().await.unwrap();

        let reach = kb.query_object_property("canReach", "Robot1").await.unwrap();
        assert_eq!(reach, vec!["R1".to_string(), "R2".to_string()]);

        let r1 = kb.query_classes("R1").await.unwrap();
        assert!(r1.contains(&"ROOM".to_string()));
        assert!(r1.contains(&"URGENT".to_string()));

        let r2 = kb.query_classes("R2").await.unwrap();
        assert!(!r2.contains(&"URGENT".to_string()));

        let c1 = kb.query_classes("C1").await.unwrap();
        assert!(c1.contains(&"CORRIDOR".to_string()));
    }

    #[tokio::test]
    async fn replace_moves_the_robot() {
        let kb = client();
        corridor_with_two_rooms(&kb).await;
        kb.replace_object_property("isIn", "Robot1", "R2", "C1").await.unwrap();
        kb.reason().await.unwrap();

        assert_eq!(
            kb.query_object_property("isIn", "Robot1").await.unwrap(),
            vec!["R2".to_string()]
        );
        assert_eq!(
            kb.query_object_property("canReach", "Robot1").await.unwrap(),
            vec!["C1".to_string()]
        );
    }

    #[tokio::test]
    async fn timestamps_are_replaced_not_accumulated() {
        let kb = client();
        kb.add_timestamp("visitedAt", "R1", 1_000_000_000).await.unwrap();
        kb.replace_timestamp("visitedAt", "R1", 1_700_000_000, 1_000_000_000)
            .await
            .unwrap();
        assert_eq!(
            kb.query_timestamps("visitedAt", "R1").await.unwrap(),
            vec![1_700_000_000]
        );
    }

    #[tokio::test]
    async fn snapshot_round_trip_through_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("map.json");
        let path = path.to_string_lossy().into_owned();

        let kb = client();
        corridor_with_two_rooms(&kb).await;
        kb.add_timestamp("visitedAt", "R1", 42).await.unwrap();
        kb.save_file(&path).await.unwrap();

        let restored = client();
        restored.load_file(&path, ONTOLOGY_IRI).await.unwrap();
        restored.reason().await.unwrap();
        assert_eq!(
            restored.query_object_property("hasDoor", "C1").await.unwrap(),
            vec!["D1".to_string(), "D2".to_string()]
        );
        assert_eq!(restored.query_timestamps("visitedAt", "R1").await.unwrap(), vec![42]);
    }

    #[tokio::test]
    async fn unsupported_request_is_rejected() {
        let kb = client();
        let err = kb
            .execute(
                Command::Query,
                PrimarySpec::File,
                crate::kb::SecondarySpec::None,
                vec![],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, KbError::Rejected { .. }));
    }
}
