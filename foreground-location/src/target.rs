use std::{path::Path, sync::Arc};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::location::Coordinate;

/// Position of a target within its [`TargetSet`].
pub type TargetId = usize;

/// A point of interest ("pin") the session alerts about.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Target {
    #[serde(flatten)]
    pub coordinate: Coordinate,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl Target {
    pub fn new(coordinate: Coordinate, title: &str, description: &str) -> Self {
        Self {
            coordinate,
            title: title.to_string(),
            description: description.to_string(),
        }
    }

    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self::new(Coordinate::new(latitude, longitude), "", "")
    }
}

/// Accepted shapes of a target document: the `{"locations": [...]}` payload
/// or a plain list of `[lat, lon]` pairs.
#[derive(Deserialize)]
#[serde(untagged)]
enum TargetDocument {
    Payload { locations: Vec<Target> },
    Pairs(Vec<Vec<f64>>),
}

/// Ordered, immutable collection of targets. Cloning is cheap.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TargetSet {
    targets: Arc<[Target]>,
}

impl TargetSet {
    pub fn new(targets: Vec<Target>) -> Self {
        Self {
            targets: targets.into(),
        }
    }

    /// Builds untitled targets from `[latitude, longitude]` pairs.
    pub fn from_pairs<P: AsRef<[f64]>>(pairs: &[P]) -> Result<Self> {
        let targets = pairs
            .iter()
            .enumerate()
            .map(|(i, pair)| match pair.as_ref() {
                [latitude, longitude] => Ok(Target::at(*latitude, *longitude)),
                other => Err(anyhow!(
                    "target #{i} must be a [latitude, longitude] pair, got {} values",
                    other.len()
                )),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(targets))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let document: TargetDocument = serde_json::from_str(json).context(
            "target list must be {\"locations\": [{\"lat\", \"lng\", \"title\", \"description\"}, ...]} or [[lat, lon], ...]",
        )?;
        match document {
            TargetDocument::Payload { locations } => Ok(Self::new(locations)),
            TargetDocument::Pairs(pairs) => Self::from_pairs(&pairs),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("could not read target list {}", path.display()))?;
        let targets = Self::from_json(&json)
            .with_context(|| format!("could not parse target list {}", path.display()))?;
        log::debug!("loaded {} targets from {}", targets.len(), path.display());
        Ok(targets)
    }

    pub fn get(&self, id: TargetId) -> Option<&Target> {
        self.targets.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl FromIterator<Target> for TargetSet {
    fn from_iter<I: IntoIterator<Item = Target>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[test]
fn test_parse_locations_payload() {
    let json = r#"{"locations": [
        {"lat": 10, "lng": 20, "title": "A", "description": "first"},
        {"lat": 50.5, "lng": -60.25, "title": "B", "description": "second"}
    ]}"#;
    let targets = TargetSet::from_json(json).unwrap();

    assert_eq!(targets.len(), 2);
    assert_eq!(targets.get(0), Some(&Target::new(Coordinate::new(10., 20.), "A", "first")));
    assert_eq!(targets.get(1).unwrap().coordinate, Coordinate::new(50.5, -60.25));
    assert_eq!(targets.get(2), None);
}

#[test]
fn test_payload_title_and_description_are_optional() {
    let targets = TargetSet::from_json(r#"{"locations": [{"lat": 1, "lng": 2, "title": "A"}]}"#).unwrap();
    let target = targets.get(0).unwrap();
    assert_eq!(target.title, "A");
    assert_eq!(target.description, "");
}

#[test]
fn test_parse_pair_list() {
    let targets = TargetSet::from_json("[[10.0, 20.0], [50, 60]]").unwrap();
    let coordinates: Vec<_> = targets.iter().map(|t| t.coordinate).collect();
    assert_eq!(coordinates, vec![Coordinate::new(10., 20.), Coordinate::new(50., 60.)]);
    assert!(targets.iter().all(|t| t.title.is_empty()));
}

#[test]
fn test_reject_malformed_pairs() {
    let err = TargetSet::from_pairs(&[vec![1.0, 2.0], vec![3.0]]).unwrap_err();
    assert!(err.to_string().contains("target #1"), "{err}");
    assert!(TargetSet::from_json("[[1.0, 2.0, 3.0]]").is_err());
}

#[test]
fn test_reject_payload_without_coordinates() {
    assert!(TargetSet::from_json(r#"{"locations": [{"title": "A"}]}"#).is_err());
    assert!(TargetSet::from_json("not json").is_err());
}

#[test]
fn test_empty_payload() {
    let targets = TargetSet::from_json(r#"{"locations": []}"#).unwrap();
    assert!(targets.is_empty());
}

#[test]
fn test_load_from_file() {
    let path = std::env::temp_dir().join(format!("targets-{}.json", std::process::id()));
    std::fs::write(&path, r#"{"locations": [{"lat": 1, "lng": 2, "title": "A", "description": ""}]}"#).unwrap();
    let targets = TargetSet::load(&path);
    std::fs::remove_file(&path).unwrap();

    assert_eq!(targets.unwrap().len(), 1);
    assert!(TargetSet::load(Path::new("/nonexistent/targets.json")).is_err());
}
