use std::{
    future::Future,
    sync::{Arc, Weak},
    time::Duration,
};

use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::MissedTickBehavior,
};

use crate::{error::Provider, location::Fix, scheduler::LocationSource, session::Session};

mod dummy;
mod replay;

pub use dummy::DummyPollingLocator;
pub use replay::ReplayLocator;

#[derive(Clone, Debug, PartialEq)]
pub enum LocatorEvent {
    Fix(Fix),
    ProviderDisabled(Provider),
}

/// A location provider that is asked for the current location, rather than
/// pushing updates on its own.
pub trait PollingLocator: Send {
    /// Returns `None` once the locator has nothing more to report.
    fn poll_location(&mut self) -> impl Future<Output = Option<LocatorEvent>> + Send;
}

/// [`LocationSource`] that publishes the requested update interval to a
/// polling task. `None` means no updates are wanted.
#[derive(Debug)]
pub struct PollingSource {
    subscription: watch::Sender<Option<Duration>>,
}

impl PollingSource {
    pub fn channel() -> (Self, watch::Receiver<Option<Duration>>) {
        let (subscription, rx) = watch::channel(None);
        (Self { subscription }, rx)
    }
}

impl LocationSource for PollingSource {
    fn request_updates(&mut self, interval: Duration) {
        self.subscription.send_replace(Some(interval));
    }

    fn remove_updates(&mut self) {
        self.subscription.send_replace(None);
    }
}

pub type SharedSession = Arc<Mutex<Session<PollingSource>>>;

/// A zero interval asks for fixes as fast as possible; tokio intervals need a
/// non-zero period.
const MIN_POLL_PERIOD: Duration = Duration::from_millis(1);

/// Polls `locator` while the session is subscribed and feeds the results into
/// the session.
///
/// The task ends when the locator runs dry or the session is dropped.
pub fn spawn_polling<L>(
    session: &SharedSession,
    mut subscription: watch::Receiver<Option<Duration>>,
    mut locator: L,
) -> JoinHandle<()>
where
    L: PollingLocator + 'static,
{
    let session = Arc::downgrade(session);
    tokio::spawn(async move {
        log::debug!("location polling task started");
        loop {
            let requested = *subscription.borrow_and_update();
            let Some(period) = requested else {
                // wait until updates are requested
                if subscription.changed().await.is_err() {
                    break;
                }
                continue;
            };

            let mut poll_interval = tokio::time::interval(period.max(MIN_POLL_PERIOD));
            poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    changed = subscription.changed() => {
                        if changed.is_err() {
                            log::debug!("location polling task finished, session is gone");
                            return;
                        }
                        // interval changed or updates removed
                        break;
                    }
                    _ = poll_interval.tick() => {
                        let Some(event) = locator.poll_location().await else {
                            log::info!("locator has no more locations");
                            return;
                        };
                        if !deliver(&session, event).await {
                            return;
                        }
                    }
                }
            }
        }
        log::debug!("location polling task finished");
    })
}

async fn deliver(session: &Weak<Mutex<Session<PollingSource>>>, event: LocatorEvent) -> bool {
    let Some(session) = session.upgrade() else {
        return false;
    };
    let mut session = session.lock().await;
    match event {
        LocatorEvent::Fix(fix) => session.on_location_changed(fix),
        LocatorEvent::ProviderDisabled(provider) => session.on_provider_disabled(&provider),
    }
    true
}

#[cfg(test)]
mod tests_support {
    use std::sync::{Arc, Mutex as StdMutex};

    use super::*;
    use crate::{
        lifecycle::Permission,
        location::Miles,
        notification::LogNotificationSink,
        session::SessionEvent,
        settings::SessionSettings,
        target::TargetSet,
    };

    pub(super) fn shared_session(
        interval: Duration,
    ) -> (SharedSession, watch::Receiver<Option<Duration>>, Arc<StdMutex<Vec<SessionEvent>>>) {
        let settings = SessionSettings {
            update_interval: interval,
            radius: Miles(1.),
            ..Default::default()
        };
        let (source, subscription) = PollingSource::channel();
        let mut session = Session::new(settings, source, LogNotificationSink);
        let events = Arc::new(StdMutex::new(Vec::new()));
        let events_clone = events.clone();
        session.on_session_event(move |e| events_clone.lock().unwrap().push(e));
        (Arc::new(Mutex::new(session)), subscription, events)
    }

    pub(super) fn pins() -> TargetSet {
        TargetSet::from_pairs(&[[10.0, 20.0]]).unwrap()
    }

    pub(super) async fn start(session: &SharedSession) {
        session.lock().await.start(pins(), Permission::Granted);
    }
}

#[tokio::test(start_paused = true)]
async fn test_polling_feeds_session_until_locator_runs_dry() {
    use crate::{lifecycle::ServiceState, location::Coordinate, session::SessionEvent};
    use tests_support::*;

    let (session, subscription, events) = shared_session(Duration::from_millis(100));
    start(&session).await;

    let locator = ReplayLocator::new(vec![
        LocatorEvent::Fix(Fix::new(Coordinate::new(0., 0.))),
        LocatorEvent::Fix(Fix::new(Coordinate::new(10.0001, 20.0001))),
    ]);
    spawn_polling(&session, subscription, locator).await.unwrap();

    let events = events.lock().unwrap().clone();
    assert_eq!(events.len(), 3);
    assert!(matches!(events[2], SessionEvent::ProximityMatch(_)));
    assert_eq!(session.lock().await.state(), ServiceState::Foreground);
}

#[tokio::test(start_paused = true)]
async fn test_provider_disabled_stops_polling_session() {
    use crate::{error::ErrorState, lifecycle::ServiceState, location::Coordinate, session::SessionEvent};
    use tests_support::*;

    let (session, subscription, events) = shared_session(Duration::from_millis(100));
    start(&session).await;

    let locator = ReplayLocator::new(vec![
        LocatorEvent::ProviderDisabled(Provider::Gps),
        LocatorEvent::Fix(Fix::new(Coordinate::new(10.0001, 20.0001))),
    ]);
    let handle = spawn_polling(&session, subscription, locator);

    // once the session unsubscribed the task idles; dropping the session ends it
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(session.lock().await.state(), ServiceState::Stopped);
    assert_eq!(*events.lock().unwrap(), vec![SessionEvent::Error(ErrorState::GpsOff)]);

    drop(session);
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_zero_interval_polls_as_fast_as_possible() {
    use crate::{lifecycle::ServiceState, location::Coordinate, session::SessionEvent};
    use tests_support::*;

    let (session, subscription, events) = shared_session(Duration::ZERO);
    start(&session).await;

    let locator = ReplayLocator::new(vec![
        LocatorEvent::Fix(Fix::new(Coordinate::new(0., 0.))),
        LocatorEvent::Fix(Fix::new(Coordinate::new(1., 1.))),
    ]);
    spawn_polling(&session, subscription, locator).await.unwrap();

    let events = events.lock().unwrap().clone();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| matches!(e, SessionEvent::LocationUpdated(_))));
    assert_eq!(session.lock().await.state(), ServiceState::Foreground);
}

#[tokio::test(start_paused = true)]
async fn test_polling_waits_for_subscription() {
    use crate::location::Coordinate;
    use tests_support::*;

    let (session, subscription, events) = shared_session(Duration::from_millis(100));
    let locator = DummyPollingLocator::default();
    let handle = spawn_polling(&session, subscription, locator);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(events.lock().unwrap().is_empty());

    start(&session).await;
    tokio::time::sleep(Duration::from_millis(250)).await;
    let polled = events.lock().unwrap().len();
    assert!(polled >= 2, "expected at least two fixes, got {polled}");
    assert_eq!(
        session.lock().await.last_location().map(|fix| fix.coordinate),
        Some(Coordinate::default())
    );

    session.lock().await.stop();
    tokio::time::sleep(Duration::from_secs(1)).await;
    let after_stop = events.lock().unwrap().len();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(events.lock().unwrap().len(), after_stop);

    handle.abort();
}
