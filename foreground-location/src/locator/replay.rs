use std::{collections::VecDeque, path::Path};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{LocatorEvent, PollingLocator};
use crate::{
    error::Provider,
    location::{Coordinate, Fix},
};

/// One entry of a recorded track.
#[derive(Deserialize)]
#[serde(untagged)]
enum TrackEntry {
    Disabled {
        provider_disabled: Provider,
    },
    Fix {
        lat: f64,
        lng: f64,
        #[serde(default)]
        time: Option<DateTime<Utc>>,
    },
}

#[derive(Debug)]
enum Step {
    Event(LocatorEvent),
    /// Stamped with the time it is polled.
    Untimed(Coordinate),
}

/// Plays back a recorded track, one entry per poll.
///
/// Track files are JSON arrays of `{"lat", "lng", "time"?}` fixes, with
/// `{"provider_disabled": "gps"}` entries marking a provider going away.
#[derive(Debug, Default)]
pub struct ReplayLocator {
    steps: VecDeque<Step>,
}

impl ReplayLocator {
    pub fn new(events: Vec<LocatorEvent>) -> Self {
        Self {
            steps: events.into_iter().map(Step::Event).collect(),
        }
    }

    pub fn from_track_json(json: &str) -> Result<Self> {
        let entries: Vec<TrackEntry> = serde_json::from_str(json).context(
            "track must be a list of {\"lat\", \"lng\", \"time\"} or {\"provider_disabled\"} entries",
        )?;
        let steps = entries
            .into_iter()
            .map(|entry| match entry {
                TrackEntry::Disabled { provider_disabled } => {
                    Step::Event(LocatorEvent::ProviderDisabled(provider_disabled))
                }
                TrackEntry::Fix { lat, lng, time: Some(time) } => {
                    Step::Event(LocatorEvent::Fix(Fix::at(Coordinate::new(lat, lng), time)))
                }
                TrackEntry::Fix { lat, lng, time: None } => Step::Untimed(Coordinate::new(lat, lng)),
            })
            .collect();
        Ok(Self { steps })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("could not read track {}", path.display()))?;
        let locator = Self::from_track_json(&json)
            .with_context(|| format!("could not parse track {}", path.display()))?;
        log::debug!("loaded {} track entries from {}", locator.remaining(), path.display());
        Ok(locator)
    }

    pub fn remaining(&self) -> usize {
        self.steps.len()
    }
}

impl PollingLocator for ReplayLocator {
    async fn poll_location(&mut self) -> Option<LocatorEvent> {
        let event = match self.steps.pop_front()? {
            Step::Event(event) => event,
            Step::Untimed(coordinate) => LocatorEvent::Fix(Fix::new(coordinate)),
        };
        log::trace!("replaying {event:?}");
        Some(event)
    }
}

#[tokio::test]
async fn test_replay_track() {
    let json = r#"[
        {"lat": 1.5, "lng": 2.5, "time": "2024-05-01T12:00:00Z"},
        {"lat": 3, "lng": 4},
        {"provider_disabled": "network"}
    ]"#;
    let mut locator = ReplayLocator::from_track_json(json).unwrap();
    assert_eq!(locator.remaining(), 3);

    let expected_time: DateTime<Utc> = "2024-05-01T12:00:00Z".parse().unwrap();
    assert_eq!(
        locator.poll_location().await,
        Some(LocatorEvent::Fix(Fix::at(Coordinate::new(1.5, 2.5), expected_time)))
    );
    match locator.poll_location().await {
        Some(LocatorEvent::Fix(fix)) => assert_eq!(fix.coordinate, Coordinate::new(3., 4.)),
        other => panic!("expected a fix, got {other:?}"),
    }
    assert_eq!(
        locator.poll_location().await,
        Some(LocatorEvent::ProviderDisabled(Provider::Network))
    );
    assert_eq!(locator.poll_location().await, None);
}

#[test]
fn test_reject_malformed_track() {
    assert!(ReplayLocator::from_track_json(r#"[{"lat": 1}]"#).is_err());
    assert!(ReplayLocator::from_track_json(r#"{"lat": 1, "lng": 2}"#).is_err());
    assert!(ReplayLocator::from_track_json(r#"[{"lat": 1, "lng": 2, "time": "yesterday"}]"#).is_err());
}
