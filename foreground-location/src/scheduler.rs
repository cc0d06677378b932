use std::time::Duration;

use crate::{
    error::{ErrorState, Provider},
    location::Fix,
};

/// The platform's location update registration.
pub trait LocationSource: Send {
    /// Ask for fixes at least every `interval`, with no minimum displacement.
    /// The platform decides the actual delivery timing.
    fn request_updates(&mut self, interval: Duration);

    fn remove_updates(&mut self);
}

pub type FixListener = Box<dyn FnMut(&Fix) + Send>;
pub type ErrorListener = Box<dyn FnMut(ErrorState) + Send>;

struct Subscription {
    interval: Duration,
    on_fix: FixListener,
    on_error: ErrorListener,
}

/// Owns the location update subscription and the most recent fix.
///
/// The platform reports back through [`UpdateScheduler::on_location_changed`]
/// and [`UpdateScheduler::on_provider_disabled`]. Calls must be serialized by
/// the owner.
pub struct UpdateScheduler<S> {
    source: S,
    subscription: Option<Subscription>,
    last_location: Option<Fix>,
}

impl<S: LocationSource> UpdateScheduler<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            subscription: None,
            last_location: None,
        }
    }

    /// Starts listening. Subscribing again replaces the listeners and
    /// re-registers with the new interval.
    pub fn subscribe<F, E>(&mut self, interval: Duration, on_fix: F, on_error: E)
    where
        F: FnMut(&Fix) + Send + 'static,
        E: FnMut(ErrorState) + Send + 'static,
    {
        log::debug!("requesting location updates every {}ms", interval.as_millis());
        self.subscription = Some(Subscription {
            interval,
            on_fix: Box::new(on_fix),
            on_error: Box::new(on_error),
        });
        self.source.request_updates(interval);
    }

    /// Stops listening and forgets the last fix. Returns false when there was
    /// nothing to unsubscribe.
    pub fn unsubscribe(&mut self) -> bool {
        match self.subscription.take() {
            Some(_) => {
                log::debug!("removing location updates");
                self.source.remove_updates();
                self.last_location = None;
                true
            }
            None => false,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn interval(&self) -> Option<Duration> {
        self.subscription.as_ref().map(|s| s.interval)
    }

    pub fn last_location(&self) -> Option<&Fix> {
        self.last_location.as_ref()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn on_location_changed(&mut self, fix: Fix) {
        let Some(subscription) = &mut self.subscription else {
            log::trace!("dropping fix {} delivered while unsubscribed", fix.coordinate);
            return;
        };
        log::trace!("lat:{}, long:{}", fix.coordinate.latitude, fix.coordinate.longitude);
        (subscription.on_fix)(&fix);
        self.last_location = Some(fix);
    }

    /// Reports the disabled provider as an error. The subscription stays in
    /// place; whether to unsubscribe is up to the caller.
    pub fn on_provider_disabled(&mut self, provider: &Provider) {
        let Some(subscription) = &mut self.subscription else {
            log::trace!("ignoring disabled provider {provider} while unsubscribed");
            return;
        };
        let error = ErrorState::from(provider);
        log::warn!("provider {provider} disabled: {error}");
        (subscription.on_error)(error);
    }
}

#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct FakeSource {
    pub requests: Vec<Duration>,
    pub removals: usize,
}

#[cfg(test)]
impl LocationSource for FakeSource {
    fn request_updates(&mut self, interval: Duration) {
        self.requests.push(interval);
    }

    fn remove_updates(&mut self) {
        self.removals += 1;
    }
}

#[cfg(test)]
fn recording_scheduler() -> (
    UpdateScheduler<FakeSource>,
    std::sync::Arc<std::sync::Mutex<Vec<Fix>>>,
    std::sync::Arc<std::sync::Mutex<Vec<ErrorState>>>,
) {
    use std::sync::{Arc, Mutex};

    let fixes = Arc::new(Mutex::new(Vec::new()));
    let errors = Arc::new(Mutex::new(Vec::new()));
    let mut scheduler = UpdateScheduler::new(FakeSource::default());
    let fixes_clone = fixes.clone();
    let errors_clone = errors.clone();
    scheduler.subscribe(
        Duration::from_millis(5000),
        move |fix| fixes_clone.lock().unwrap().push(fix.clone()),
        move |e| errors_clone.lock().unwrap().push(e),
    );
    (scheduler, fixes, errors)
}

#[test]
fn test_fixes_are_forwarded_and_latest_is_kept() {
    use crate::location::Coordinate;

    let (mut scheduler, fixes, _) = recording_scheduler();
    assert_eq!(scheduler.source().requests, vec![Duration::from_millis(5000)]);
    assert_eq!(scheduler.interval(), Some(Duration::from_millis(5000)));
    assert!(scheduler.last_location().is_none());

    scheduler.on_location_changed(Fix::new(Coordinate::new(1., 2.)));
    scheduler.on_location_changed(Fix::new(Coordinate::new(3., 4.)));

    assert_eq!(fixes.lock().unwrap().len(), 2);
    assert_eq!(scheduler.last_location().unwrap().coordinate, Coordinate::new(3., 4.));
}

#[test]
fn test_provider_disabled_reports_without_unsubscribing() {
    let (mut scheduler, _, errors) = recording_scheduler();

    scheduler.on_provider_disabled(&Provider::Gps);
    scheduler.on_provider_disabled(&Provider::Network);
    scheduler.on_provider_disabled(&Provider::from("passive"));

    assert_eq!(
        *errors.lock().unwrap(),
        vec![ErrorState::GpsOff, ErrorState::NetworkOff, ErrorState::Unknown]
    );
    assert!(scheduler.is_subscribed());
    assert_eq!(scheduler.source().removals, 0);
}

#[test]
fn test_unsubscribe_is_idempotent() {
    use crate::location::Coordinate;

    let (mut scheduler, fixes, errors) = recording_scheduler();

    assert!(scheduler.unsubscribe());
    assert!(!scheduler.unsubscribe());
    assert_eq!(scheduler.source().removals, 1);
    assert_eq!(scheduler.interval(), None);

    scheduler.on_location_changed(Fix::new(Coordinate::new(1., 2.)));
    scheduler.on_provider_disabled(&Provider::Gps);
    assert!(fixes.lock().unwrap().is_empty());
    assert!(errors.lock().unwrap().is_empty());
    assert!(scheduler.last_location().is_none());
}

#[test]
fn test_resubscribe_replaces_interval() {
    let (mut scheduler, _, _) = recording_scheduler();
    scheduler.subscribe(Duration::from_secs(1), |_| {}, |_| {});

    assert_eq!(
        scheduler.source().requests,
        vec![Duration::from_millis(5000), Duration::from_secs(1)]
    );
    assert_eq!(scheduler.interval(), Some(Duration::from_secs(1)));
}

#[test]
fn test_unsubscribe_forgets_last_location() {
    use crate::location::Coordinate;

    let (mut scheduler, _, _) = recording_scheduler();
    scheduler.on_location_changed(Fix::new(Coordinate::new(1., 2.)));
    assert!(scheduler.last_location().is_some());

    scheduler.unsubscribe();
    assert!(scheduler.last_location().is_none());

    scheduler.subscribe(Duration::from_secs(1), |_| {}, |_| {});
    assert!(scheduler.last_location().is_none());
}
