use crate::error::ErrorState;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ServiceState {
    #[default]
    Stopped,
    Starting,
    Running,
    /// Persistent notification visible, no UI bound.
    Foreground,
    /// A UI client is bound, no persistent notification.
    Background,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

/// Side effects a transition asks its owner to carry out, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Subscribe,
    Unsubscribe,
    EnterForeground,
    ExitForeground,
    ReportError(ErrorState),
    StopService,
}

/// Decides when the service runs and whether it holds the foreground
/// notification. Pure: it only returns the [`Action`]s to perform.
#[derive(Debug, Default)]
pub struct ServiceLifecycle {
    state: ServiceState,
    ui_bound: bool,
    configuration_change: bool,
}

impl ServiceLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn is_ui_bound(&self) -> bool {
        self.ui_bound
    }

    pub fn is_running(&self) -> bool {
        matches!(
            self.state,
            ServiceState::Running | ServiceState::Foreground | ServiceState::Background
        )
    }

    pub fn start(&mut self, permission: Permission) -> Vec<Action> {
        if self.state != ServiceState::Stopped {
            log::debug!("start requested while {:?}, ignoring", self.state);
            return vec![];
        }

        self.transition(ServiceState::Starting);
        if permission == Permission::Denied {
            log::error!("cannot start location updates: {}", ErrorState::NoLocationPermission);
            self.transition(ServiceState::Stopped);
            return vec![Action::ReportError(ErrorState::NoLocationPermission)];
        }

        self.transition(ServiceState::Running);
        let mut actions = vec![Action::Subscribe];
        if self.ui_bound {
            self.transition(ServiceState::Background);
        } else {
            self.transition(ServiceState::Foreground);
            actions.push(Action::EnterForeground);
        }
        actions
    }

    /// A UI client bound, or rebound after having left.
    pub fn bind(&mut self) -> Vec<Action> {
        self.ui_bound = true;
        self.configuration_change = false;
        match self.state {
            ServiceState::Foreground => {
                self.transition(ServiceState::Background);
                vec![Action::ExitForeground]
            }
            ServiceState::Running => {
                self.transition(ServiceState::Background);
                vec![]
            }
            _ => vec![],
        }
    }

    /// The UI client went away. Unless that is due to a configuration change
    /// the service takes over the foreground notification.
    pub fn unbind(&mut self) -> Vec<Action> {
        self.ui_bound = false;
        if self.state != ServiceState::Background {
            return vec![];
        }
        if self.configuration_change {
            log::debug!("unbind during configuration change, staying in background");
            return vec![];
        }
        self.transition(ServiceState::Foreground);
        vec![Action::EnterForeground]
    }

    pub fn configuration_changed(&mut self) {
        self.configuration_change = true;
    }

    /// A provider went away while running. Ends the session.
    pub fn provider_disabled(&mut self, error: ErrorState) -> Vec<Action> {
        if !self.is_running() {
            log::debug!("{error} reported while {:?}, ignoring", self.state);
            return vec![];
        }
        let mut actions = vec![Action::ReportError(error)];
        actions.extend(self.shut_down());
        actions
    }

    /// Ends the session from any state. Stopping a stopped session does nothing.
    pub fn stop(&mut self) -> Vec<Action> {
        if self.state == ServiceState::Stopped {
            return vec![];
        }
        self.shut_down()
    }

    fn shut_down(&mut self) -> Vec<Action> {
        let mut actions = vec![];
        if self.state == ServiceState::Foreground {
            actions.push(Action::ExitForeground);
        }
        actions.push(Action::Unsubscribe);
        actions.push(Action::StopService);
        self.transition(ServiceState::Stopped);
        actions
    }

    fn transition(&mut self, to: ServiceState) {
        log::debug!("service state {:?} -> {to:?}", self.state);
        self.state = to;
    }
}

#[test]
fn test_start_without_ui_enters_foreground() {
    let mut lifecycle = ServiceLifecycle::new();
    assert_eq!(lifecycle.state(), ServiceState::Stopped);

    let actions = lifecycle.start(Permission::Granted);
    assert_eq!(actions, vec![Action::Subscribe, Action::EnterForeground]);
    assert_eq!(lifecycle.state(), ServiceState::Foreground);
}

#[test]
fn test_start_with_ui_bound_stays_in_background() {
    let mut lifecycle = ServiceLifecycle::new();
    assert!(lifecycle.bind().is_empty());

    assert_eq!(lifecycle.start(Permission::Granted), vec![Action::Subscribe]);
    assert_eq!(lifecycle.state(), ServiceState::Background);
}

#[test]
fn test_start_without_permission_reports_once() {
    let mut lifecycle = ServiceLifecycle::new();

    let actions = lifecycle.start(Permission::Denied);
    assert_eq!(actions, vec![Action::ReportError(ErrorState::NoLocationPermission)]);
    assert_eq!(lifecycle.state(), ServiceState::Stopped);

    // a later start with permission works normally
    assert_eq!(lifecycle.start(Permission::Granted), vec![Action::Subscribe, Action::EnterForeground]);
}

#[test]
fn test_second_start_is_ignored() {
    let mut lifecycle = ServiceLifecycle::new();
    lifecycle.start(Permission::Granted);
    assert!(lifecycle.start(Permission::Granted).is_empty());
    assert!(lifecycle.start(Permission::Denied).is_empty());
    assert_eq!(lifecycle.state(), ServiceState::Foreground);
}

#[test]
fn test_rebind_moves_to_background_and_unbind_back() {
    let mut lifecycle = ServiceLifecycle::new();
    lifecycle.start(Permission::Granted);

    assert_eq!(lifecycle.bind(), vec![Action::ExitForeground]);
    assert_eq!(lifecycle.state(), ServiceState::Background);
    assert!(lifecycle.is_ui_bound());

    assert_eq!(lifecycle.unbind(), vec![Action::EnterForeground]);
    assert_eq!(lifecycle.state(), ServiceState::Foreground);
    assert!(!lifecycle.is_ui_bound());

    // unbinding again while in foreground changes nothing
    assert!(lifecycle.unbind().is_empty());
}

#[test]
fn test_unbind_during_configuration_change_holds_background() {
    let mut lifecycle = ServiceLifecycle::new();
    lifecycle.bind();
    lifecycle.start(Permission::Granted);

    lifecycle.configuration_changed();
    assert!(lifecycle.unbind().is_empty());
    assert_eq!(lifecycle.state(), ServiceState::Background);

    // the recreated UI binds again, clearing the flag
    assert!(lifecycle.bind().is_empty());
    assert_eq!(lifecycle.unbind(), vec![Action::EnterForeground]);
    assert_eq!(lifecycle.state(), ServiceState::Foreground);
}

#[test]
fn test_provider_disabled_stops_session() {
    let mut lifecycle = ServiceLifecycle::new();
    lifecycle.start(Permission::Granted);

    assert_eq!(
        lifecycle.provider_disabled(ErrorState::GpsOff),
        vec![
            Action::ReportError(ErrorState::GpsOff),
            Action::ExitForeground,
            Action::Unsubscribe,
            Action::StopService,
        ]
    );
    assert_eq!(lifecycle.state(), ServiceState::Stopped);
    assert!(lifecycle.provider_disabled(ErrorState::GpsOff).is_empty());
}

#[test]
fn test_provider_disabled_in_background() {
    let mut lifecycle = ServiceLifecycle::new();
    lifecycle.bind();
    lifecycle.start(Permission::Granted);

    assert_eq!(
        lifecycle.provider_disabled(ErrorState::NetworkOff),
        vec![Action::ReportError(ErrorState::NetworkOff), Action::Unsubscribe, Action::StopService]
    );
    assert_eq!(lifecycle.state(), ServiceState::Stopped);
}

#[test]
fn test_stop_is_idempotent() {
    let mut lifecycle = ServiceLifecycle::new();
    assert!(lifecycle.stop().is_empty());

    lifecycle.start(Permission::Granted);
    assert_eq!(
        lifecycle.stop(),
        vec![Action::ExitForeground, Action::Unsubscribe, Action::StopService]
    );
    assert!(lifecycle.stop().is_empty());
    assert_eq!(lifecycle.state(), ServiceState::Stopped);
}
