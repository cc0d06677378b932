use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::{
    error::{ErrorState, Provider},
    lifecycle::{Action, Permission, ServiceLifecycle, ServiceState},
    location::Fix,
    notification::NotificationSink,
    proximity::{ProximityEvent, ProximityMonitor},
    scheduler::{LocationSource, UpdateScheduler},
    settings::SessionSettings,
    target::{Target, TargetSet},
};

/// What the session reports to its host.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    LocationUpdated(Fix),
    ProximityMatch(Target),
    /// Only reported with [`crate::proximity::TriggerPolicy::OnEntry`].
    TargetExited(Target),
    Error(ErrorState),
}

/// Scheduler callbacks are queued here and handled once the platform call
/// that caused them has returned, so that no callback re-enters the session.
enum Signal {
    Fix(Fix),
    Error(ErrorState),
}

/// One location tracking session.
///
/// The host owns the session and forwards platform signals to it: lifecycle
/// calls (`start`, `stop`, `bind`, `unbind`, `configuration_changed`) and
/// location callbacks (`on_location_changed`, `on_provider_disabled`).
pub struct Session<S: LocationSource> {
    settings: SessionSettings,
    lifecycle: ServiceLifecycle,
    scheduler: UpdateScheduler<S>,
    monitor: ProximityMonitor,
    targets: TargetSet,
    sink: Box<dyn NotificationSink>,
    on_session_event: Option<Box<dyn Fn(SessionEvent) + Send>>,
    signal_tx: UnboundedSender<Signal>,
    signal_rx: UnboundedReceiver<Signal>,
}

impl<S: LocationSource> Session<S> {
    pub fn new<N>(settings: SessionSettings, source: S, sink: N) -> Self
    where
        N: NotificationSink + 'static,
    {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        Self {
            monitor: ProximityMonitor::new(settings.radius, settings.policy),
            settings,
            lifecycle: ServiceLifecycle::new(),
            scheduler: UpdateScheduler::new(source),
            targets: TargetSet::default(),
            sink: Box::new(sink),
            on_session_event: None,
            signal_tx,
            signal_rx,
        }
    }

    pub fn on_session_event<F>(&mut self, f: F)
    where
        F: Fn(SessionEvent) + Send + 'static,
    {
        self.on_session_event = Some(Box::new(f));
    }

    pub fn state(&self) -> ServiceState {
        self.lifecycle.state()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn targets(&self) -> &TargetSet {
        &self.targets
    }

    pub fn last_location(&self) -> Option<&Fix> {
        self.scheduler.last_location()
    }

    pub fn scheduler(&self) -> &UpdateScheduler<S> {
        &self.scheduler
    }

    /// Starts tracking `targets`. Ignored unless the session is stopped.
    pub fn start(&mut self, targets: TargetSet, permission: Permission) {
        let actions = self.lifecycle.start(permission);
        if self.lifecycle.is_running() {
            log::info!("session started with {} targets", targets.len());
            self.targets = targets;
            self.monitor.reset();
        }
        self.apply(actions);
    }

    pub fn stop(&mut self) {
        let actions = self.lifecycle.stop();
        if !actions.is_empty() {
            log::info!("session stopped");
        }
        self.apply(actions);
    }

    pub fn bind(&mut self) {
        let actions = self.lifecycle.bind();
        self.apply(actions);
    }

    pub fn unbind(&mut self) {
        let actions = self.lifecycle.unbind();
        self.apply(actions);
    }

    pub fn configuration_changed(&mut self) {
        self.lifecycle.configuration_changed();
    }

    pub fn on_location_changed(&mut self, fix: Fix) {
        self.scheduler.on_location_changed(fix);
        self.dispatch_signals();
    }

    pub fn on_provider_disabled(&mut self, provider: &Provider) {
        self.scheduler.on_provider_disabled(provider);
        self.dispatch_signals();
    }

    fn dispatch_signals(&mut self) {
        while let Ok(signal) = self.signal_rx.try_recv() {
            match signal {
                Signal::Fix(fix) => self.handle_fix(fix),
                Signal::Error(error) => {
                    let actions = self.lifecycle.provider_disabled(error);
                    self.apply(actions);
                }
            }
        }
    }

    fn handle_fix(&mut self, fix: Fix) {
        if !self.lifecycle.is_running() {
            return;
        }

        if self.lifecycle.state() == ServiceState::Foreground {
            let notification = self.settings.notification.foreground(Some(&fix.coordinate));
            self.sink.show_foreground(&notification);
        }

        let events = self.monitor.check_targets(&fix.coordinate, &self.targets);
        self.broadcast_session_event(SessionEvent::LocationUpdated(fix));

        for event in events {
            match event {
                ProximityEvent::Entered(id) => {
                    let Some(target) = self.targets.get(id).cloned() else { continue };
                    log::info!("near target #{id} '{}' at {}", target.title, target.coordinate);
                    let alert = self.settings.notification.pin_alert(&target);
                    self.sink.notify(&alert);
                    self.broadcast_session_event(SessionEvent::ProximityMatch(target));
                }
                ProximityEvent::Exited(id) => {
                    if let Some(target) = self.targets.get(id).cloned() {
                        self.broadcast_session_event(SessionEvent::TargetExited(target));
                    }
                }
            }
        }
    }

    fn apply(&mut self, actions: Vec<Action>) {
        for action in actions {
            log::trace!("applying {action:?}");
            match action {
                Action::Subscribe => {
                    let fix_tx = self.signal_tx.clone();
                    let error_tx = self.signal_tx.clone();
                    self.scheduler.subscribe(
                        self.settings.update_interval,
                        move |fix| {
                            _ = fix_tx.send(Signal::Fix(fix.clone()));
                        },
                        move |error| {
                            _ = error_tx.send(Signal::Error(error));
                        },
                    );
                }
                Action::Unsubscribe => {
                    self.scheduler.unsubscribe();
                    // anything still queued belongs to the ended subscription
                    while self.signal_rx.try_recv().is_ok() {}
                }
                Action::EnterForeground => {
                    let last = self.scheduler.last_location().map(|fix| fix.coordinate);
                    let notification = self.settings.notification.foreground(last.as_ref());
                    self.sink.show_foreground(&notification);
                }
                Action::ExitForeground => self.sink.dismiss_foreground(),
                Action::ReportError(error) => {
                    log::error!("location session error: {error}");
                    self.broadcast_session_event(SessionEvent::Error(error));
                }
                Action::StopService => self.sink.stop_service(),
            }
        }
    }

    fn broadcast_session_event(&self, event: SessionEvent) {
        if let Some(on_session_event) = &self.on_session_event {
            on_session_event(event);
        }
    }
}

impl<S: LocationSource> Drop for Session<S> {
    fn drop(&mut self) {
        if self.scheduler.unsubscribe() {
            log::debug!("session dropped while subscribed, location updates removed");
        }
    }
}

#[cfg(test)]
mod fixtures {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{
        location::{Coordinate, Miles},
        notification::RecordingSink,
        scheduler::FakeSource,
    };

    pub(super) struct Harness {
        pub session: Session<FakeSource>,
        pub sink: RecordingSink,
        pub events: Arc<Mutex<Vec<SessionEvent>>>,
    }

    impl Harness {
        pub fn new(settings: SessionSettings) -> Self {
            let sink = RecordingSink::default();
            let events = Arc::new(Mutex::new(Vec::new()));
            let mut session = Session::new(settings, FakeSource::default(), sink.clone());
            let events_clone = events.clone();
            session.on_session_event(move |e| events_clone.lock().unwrap().push(e));
            Self { session, sink, events }
        }

        pub fn with_radius(radius: Miles) -> Self {
            Self::new(SessionSettings {
                radius,
                ..Default::default()
            })
        }

        pub fn take_events(&self) -> Vec<SessionEvent> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }

        pub fn fix(&mut self, latitude: f64, longitude: f64) {
            self.session
                .on_location_changed(Fix::new(Coordinate::new(latitude, longitude)));
        }
    }

    pub(super) fn pins() -> TargetSet {
        TargetSet::from_json(
            r#"{"locations": [
                {"lat": 10, "lng": 20, "title": "A", "description": "pin a"},
                {"lat": 50, "lng": 60, "title": "B", "description": "pin b"}
            ]}"#,
        )
        .unwrap()
    }
}

#[cfg(test)]
use fixtures::{pins, Harness};

#[test]
fn test_start_enters_foreground_with_placeholder_location() {
    use crate::notification::{Notification, SinkCall};

    let mut h = Harness::with_radius(crate::location::Miles(1.));
    h.session.start(pins(), Permission::Granted);

    assert_eq!(h.session.state(), ServiceState::Foreground);
    assert_eq!(h.session.targets().len(), 2);
    assert_eq!(h.session.scheduler().source().requests, vec![std::time::Duration::from_millis(5000)]);
    assert_eq!(
        h.sink.take(),
        vec![SinkCall::Show(Notification {
            title: "LocationUpdates".to_string(),
            text: "Latitude:0.0, longitude:0.0".to_string(),
        })]
    );
}

#[test]
fn test_fix_near_target_alerts_and_updates_foreground() {
    use crate::notification::{Notification, SinkCall};

    let mut h = Harness::with_radius(crate::location::Miles(1.));
    h.session.start(pins(), Permission::Granted);
    h.sink.take();

    h.fix(10.0001, 20.0001);

    assert_eq!(
        h.sink.take(),
        vec![
            SinkCall::Show(Notification {
                title: "LocationUpdates".to_string(),
                text: "Latitude:10.0001, longitude:20.0001".to_string(),
            }),
            SinkCall::Notify(Notification { title: "A".to_string(), text: "pin a".to_string() }),
        ]
    );
    let events = h.take_events();
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], SessionEvent::LocationUpdated(fix) if fix.coordinate.latitude == 10.0001));
    assert!(matches!(&events[1], SessionEvent::ProximityMatch(target) if target.title == "A"));
    assert_eq!(h.session.last_location().unwrap().coordinate.longitude, 20.0001);

    // still within radius, every-fix alerts again
    h.fix(10.0001, 20.0001);
    assert_eq!(
        h.take_events().iter().filter(|e| matches!(e, SessionEvent::ProximityMatch(_))).count(),
        1
    );
}

#[test]
fn test_far_fix_only_reports_location() {
    let mut h = Harness::with_radius(crate::location::Miles(100.));
    h.session.start(pins(), Permission::Granted);

    h.fix(40.7128, -74.0060);
    let events = h.take_events();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], SessionEvent::LocationUpdated(_)));
}

#[test]
fn test_background_session_does_not_touch_foreground_notification() {
    use crate::notification::SinkCall;

    let mut h = Harness::with_radius(crate::location::Miles(1.));
    h.session.bind();
    h.session.start(pins(), Permission::Granted);
    assert_eq!(h.session.state(), ServiceState::Background);

    h.fix(10.0001, 20.0001);
    let calls = h.sink.take();
    assert_eq!(calls.len(), 1);
    assert!(matches!(calls[0], SinkCall::Notify(_)));

    // UI leaves: the service shows the latest location
    h.session.unbind();
    assert_eq!(h.session.state(), ServiceState::Foreground);
    match &h.sink.take()[..] {
        [SinkCall::Show(n)] => assert_eq!(n.text, "Latitude:10.0001, longitude:20.0001"),
        other => panic!("unexpected sink calls {other:?}"),
    }

    // and hands it back when the UI returns
    h.session.bind();
    assert_eq!(h.sink.take(), vec![SinkCall::Dismiss]);
}

#[test]
fn test_start_without_permission() {
    let mut h = Harness::with_radius(crate::location::Miles(1.));
    h.session.start(pins(), Permission::Denied);

    assert_eq!(h.session.state(), ServiceState::Stopped);
    assert_eq!(h.take_events(), vec![SessionEvent::Error(ErrorState::NoLocationPermission)]);
    assert!(h.session.scheduler().source().requests.is_empty());
    assert!(h.session.targets().is_empty());

    // no fixes get through until a successful start
    h.fix(10.0001, 20.0001);
    assert!(h.take_events().is_empty());
    assert!(h.sink.take().is_empty());

    h.session.start(pins(), Permission::Granted);
    h.fix(10.0001, 20.0001);
    assert_eq!(h.take_events().len(), 2);
}

#[test]
fn test_provider_disabled_ends_session() {
    use crate::notification::SinkCall;

    let mut h = Harness::with_radius(crate::location::Miles(1.));
    h.session.start(pins(), Permission::Granted);
    h.sink.take();

    h.session.on_provider_disabled(&Provider::Network);

    assert_eq!(h.session.state(), ServiceState::Stopped);
    assert_eq!(h.take_events(), vec![SessionEvent::Error(ErrorState::NetworkOff)]);
    assert_eq!(h.sink.take(), vec![SinkCall::Dismiss, SinkCall::StopService]);
    assert_eq!(h.session.scheduler().source().removals, 1);
    assert!(!h.session.scheduler().is_subscribed());

    h.fix(10.0001, 20.0001);
    assert!(h.take_events().is_empty());
}

#[test]
fn test_stop_twice_unsubscribes_once() {
    use crate::notification::SinkCall;

    let mut h = Harness::with_radius(crate::location::Miles(1.));
    h.session.stop();
    assert!(h.sink.take().is_empty());

    h.session.start(pins(), Permission::Granted);
    h.sink.take();
    h.session.stop();
    h.session.stop();

    assert_eq!(h.session.state(), ServiceState::Stopped);
    assert_eq!(h.session.scheduler().source().removals, 1);
    assert_eq!(h.sink.take(), vec![SinkCall::Dismiss, SinkCall::StopService]);
    assert!(h.take_events().is_empty());
}

#[test]
fn test_on_entry_policy_reports_enter_and_exit() {
    use crate::{location::Miles, proximity::TriggerPolicy};

    let mut h = Harness::new(SessionSettings {
        radius: Miles(1.),
        policy: TriggerPolicy::OnEntry,
        ..Default::default()
    });
    h.session.start(pins(), Permission::Granted);

    h.fix(10.0001, 20.0001);
    h.fix(10.0002, 20.0002);
    h.fix(0., 0.);
    let events: Vec<_> = h
        .take_events()
        .into_iter()
        .filter(|e| !matches!(e, SessionEvent::LocationUpdated(_)))
        .collect();

    let a = pins().get(0).cloned().unwrap();
    assert_eq!(events, vec![SessionEvent::ProximityMatch(a.clone()), SessionEvent::TargetExited(a)]);
}

#[test]
fn test_restart_shows_placeholder_location_again() {
    use crate::notification::SinkCall;

    let mut h = Harness::with_radius(crate::location::Miles(1.));
    h.session.start(pins(), Permission::Granted);
    h.fix(10.0001, 20.0001);
    h.session.stop();
    h.sink.take();

    h.session.start(pins(), Permission::Granted);
    assert!(h.session.last_location().is_none());
    match &h.sink.take()[..] {
        [SinkCall::Show(n)] => assert_eq!(n.text, "Latitude:0.0, longitude:0.0"),
        other => panic!("unexpected sink calls {other:?}"),
    }
}

#[test]
fn test_dropping_subscribed_session_removes_updates() {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use crate::notification::LogNotificationSink;

    struct CountingSource(Arc<AtomicUsize>);

    impl LocationSource for CountingSource {
        fn request_updates(&mut self, _interval: std::time::Duration) {}

        fn remove_updates(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let removals = Arc::new(AtomicUsize::new(0));

    let mut session = Session::new(
        SessionSettings::default(),
        CountingSource(removals.clone()),
        LogNotificationSink,
    );
    session.start(pins(), Permission::Granted);
    drop(session);
    assert_eq!(removals.load(Ordering::SeqCst), 1);

    // a stopped session has nothing left to remove
    let mut session = Session::new(
        SessionSettings::default(),
        CountingSource(removals.clone()),
        LogNotificationSink,
    );
    session.start(pins(), Permission::Granted);
    session.stop();
    drop(session);
    assert_eq!(removals.load(Ordering::SeqCst), 2);
}
