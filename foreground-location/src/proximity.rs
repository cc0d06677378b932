use std::{collections::HashSet, str::FromStr};

use anyhow::anyhow;

use crate::{
    location::{Coordinate, Miles},
    target::{Target, TargetId, TargetSet},
};

/// Returns every target within `radius` of `fix`, in target set order.
///
/// A target exactly `radius` away is included. Distances that come out as
/// NaN never match.
pub fn evaluate<'a>(fix: &Coordinate, targets: &'a TargetSet, radius: Miles) -> Vec<&'a Target> {
    targets
        .iter()
        .filter(|target| fix.distance_to(&target.coordinate) <= radius)
        .collect()
}

fn matching_ids(fix: &Coordinate, targets: &TargetSet, radius: Miles) -> Vec<TargetId> {
    targets
        .iter()
        .enumerate()
        .filter(|(_, target)| fix.distance_to(&target.coordinate) <= radius)
        .map(|(id, _)| id)
        .collect()
}

/// When a target within radius is reported.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TriggerPolicy {
    /// Report on every fix that lies within the radius.
    #[default]
    EveryFix,
    /// Report only when the radius is entered, and report leaving it.
    OnEntry,
}

impl FromStr for TriggerPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim() {
            "every-fix" => Ok(TriggerPolicy::EveryFix),
            "on-entry" => Ok(TriggerPolicy::OnEntry),
            other => Err(anyhow!("unknown trigger policy '{other}', expected 'every-fix' or 'on-entry'")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProximityEvent {
    Entered(TargetId),
    Exited(TargetId),
}

/// Tracks which targets the device is currently within, across fixes.
#[derive(Debug, Default)]
pub struct ProximityMonitor {
    radius: Miles,
    policy: TriggerPolicy,
    in_fences: HashSet<TargetId>,
}

impl ProximityMonitor {
    pub fn new(radius: Miles, policy: TriggerPolicy) -> Self {
        Self {
            radius,
            policy,
            in_fences: HashSet::new(),
        }
    }

    pub fn check_targets(&mut self, fix: &Coordinate, targets: &TargetSet) -> Vec<ProximityEvent> {
        log::trace!("checking {} targets against {fix}", targets.len());
        let inside = matching_ids(fix, targets, self.radius);

        let events = match self.policy {
            TriggerPolicy::EveryFix => inside.iter().copied().map(ProximityEvent::Entered).collect(),
            TriggerPolicy::OnEntry => {
                let mut events = Vec::new();
                for id in 0..targets.len() {
                    let is_inside = inside.contains(&id);
                    let was_inside = self.in_fences.contains(&id);
                    if is_inside && !was_inside {
                        log::info!("entered target #{id}");
                        events.push(ProximityEvent::Entered(id));
                    } else if !is_inside && was_inside {
                        log::info!("exited target #{id}");
                        events.push(ProximityEvent::Exited(id));
                    }
                }
                events
            }
        };

        self.in_fences = inside.into_iter().collect();
        log::debug!("in_fences: {:?}", self.in_fences);
        events
    }

    /// Targets the last checked fix was within, in ascending order.
    pub fn occupied(&self) -> Vec<TargetId> {
        let mut ids: Vec<_> = self.in_fences.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn reset(&mut self) {
        self.in_fences.clear();
    }
}

#[cfg(test)]
fn two_pins() -> TargetSet {
    TargetSet::from_json(
        r#"{"locations": [
            {"lat": 10, "lng": 20, "title": "A", "description": ""},
            {"lat": 50, "lng": 60, "title": "B", "description": ""}
        ]}"#,
    )
    .unwrap()
}

#[test]
fn test_only_nearby_target_matches() {
    let targets = two_pins();
    let fix = Coordinate::new(10.0001, 20.0001);

    let matched = evaluate(&fix, &targets, Miles(100.));
    let titles: Vec<_> = matched.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["A"]);
}

#[test]
fn test_empty_target_set_never_matches() {
    let fix = Coordinate::new(10.0, 20.0);
    assert!(evaluate(&fix, &TargetSet::default(), Miles(1e9)).is_empty());
}

#[test]
fn test_all_targets_within_radius_match_in_order() {
    let targets = TargetSet::from_pairs(&[[1.0, 1.0], [0.0, 0.0], [80.0, 80.0], [0.5, 0.5]]).unwrap();
    let matched = evaluate(&Coordinate::new(0.0, 0.0), &targets, Miles(100.));
    let coordinates: Vec<_> = matched.iter().map(|t| t.coordinate).collect();
    assert_eq!(
        coordinates,
        vec![Coordinate::new(1.0, 1.0), Coordinate::new(0.0, 0.0), Coordinate::new(0.5, 0.5)]
    );
}

#[test]
fn test_radius_boundary_is_inclusive() {
    let fix = Coordinate::new(12.0, 34.0);
    let target = Coordinate::new(12.5, 34.5);
    let targets = TargetSet::new(vec![Target::new(target, "edge", "")]);
    let exact = fix.distance_to(&target);

    assert_eq!(evaluate(&fix, &targets, exact).len(), 1);
    assert!(evaluate(&fix, &targets, Miles(exact.0 * 0.999)).is_empty());
}

#[test]
fn test_identical_point_matches_zero_radius() {
    let targets = TargetSet::from_pairs(&[[40.0, -73.0]]).unwrap();
    assert_eq!(evaluate(&Coordinate::new(40.0, -73.0), &targets, Miles(0.)).len(), 1);
}

#[test]
fn test_every_fix_policy_refires() {
    let targets = two_pins();
    let mut monitor = ProximityMonitor::new(Miles(1.), TriggerPolicy::EveryFix);
    let near_a = Coordinate::new(10.0001, 20.0001);

    assert_eq!(monitor.check_targets(&near_a, &targets), vec![ProximityEvent::Entered(0)]);
    assert_eq!(monitor.check_targets(&near_a, &targets), vec![ProximityEvent::Entered(0)]);
    assert!(monitor.check_targets(&Coordinate::new(0., 0.), &targets).is_empty());
    assert!(monitor.occupied().is_empty());
}

#[test]
fn test_on_entry_policy_reports_transitions_once() {
    let targets = two_pins();
    let mut monitor = ProximityMonitor::new(Miles(1.), TriggerPolicy::OnEntry);
    let near_a = Coordinate::new(10.0001, 20.0001);
    let near_b = Coordinate::new(50.0001, 60.0001);

    assert_eq!(monitor.check_targets(&near_a, &targets), vec![ProximityEvent::Entered(0)]);
    assert!(monitor.check_targets(&near_a, &targets).is_empty());
    assert_eq!(monitor.occupied(), vec![0]);
    assert_eq!(
        monitor.check_targets(&near_b, &targets),
        vec![ProximityEvent::Exited(0), ProximityEvent::Entered(1)]
    );

    monitor.reset();
    assert_eq!(monitor.check_targets(&near_b, &targets), vec![ProximityEvent::Entered(1)]);
}

#[test]
fn test_parse_trigger_policy() {
    assert_eq!("every-fix".parse::<TriggerPolicy>().unwrap(), TriggerPolicy::EveryFix);
    assert_eq!(" on-entry ".parse::<TriggerPolicy>().unwrap(), TriggerPolicy::OnEntry);
    assert!("sometimes".parse::<TriggerPolicy>().is_err());
}
