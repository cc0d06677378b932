use super::{LocatorEvent, PollingLocator};
use crate::location::{Coordinate, Fix};

/// Reports the same location on every poll, for hosts without a provider.
#[derive(Debug, Default)]
pub struct DummyPollingLocator {
    location: Coordinate,
}

impl DummyPollingLocator {
    pub fn at(location: Coordinate) -> Self {
        Self { location }
    }
}

impl PollingLocator for DummyPollingLocator {
    async fn poll_location(&mut self) -> Option<LocatorEvent> {
        Some(LocatorEvent::Fix(Fix::new(self.location)))
    }
}
