use crate::{location::Coordinate, target::Target};

const DEFAULT_FOREGROUND_TITLE: &str = "LocationUpdates";
const DEFAULT_PIN_TITLE: &str = "You are near a pin";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub text: String,
}

/// Receives everything the session wants shown to the user.
///
/// Implemented by the host platform; the foreground notification is the one
/// that keeps the service pinned while no UI is bound.
pub trait NotificationSink: Send {
    /// Show or replace the persistent foreground notification.
    fn show_foreground(&mut self, notification: &Notification);

    fn dismiss_foreground(&mut self);

    /// Post a one-off alert, e.g. for a target that was reached.
    fn notify(&mut self, notification: &Notification);

    /// The session has ended and the hosting service may go away.
    fn stop_service(&mut self) {}
}

/// Sink that only writes notifications to the log.
#[derive(Debug, Default)]
pub struct LogNotificationSink;

impl NotificationSink for LogNotificationSink {
    fn show_foreground(&mut self, notification: &Notification) {
        log::info!("[foreground] {}: {}", notification.title, notification.text);
    }

    fn dismiss_foreground(&mut self) {
        log::info!("[foreground] dismissed");
    }

    fn notify(&mut self, notification: &Notification) {
        log::info!("[alert] {}: {}", notification.title, notification.text);
    }

    fn stop_service(&mut self) {
        log::info!("service stopped");
    }
}

/// Overrides for notification content. Blank values count as not set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NotificationSettings {
    pub foreground_title: Option<String>,
    pub foreground_text: Option<String>,
    pub pin_title: Option<String>,
    pub pin_text: Option<String>,
}

impl NotificationSettings {
    /// Content of the foreground notification for the latest known fix.
    pub fn foreground(&self, last_location: Option<&Coordinate>) -> Notification {
        let title = non_blank(&self.foreground_title)
            .unwrap_or(DEFAULT_FOREGROUND_TITLE)
            .to_string();
        let text = match non_blank(&self.foreground_text) {
            Some(text) => text.to_string(),
            None => {
                let location = last_location.copied().unwrap_or_default();
                format!("Latitude:{:?}, longitude:{:?}", location.latitude, location.longitude)
            }
        };
        Notification { title, text }
    }

    /// Content of the alert for a reached target. Targets without a title or
    /// description fall back to the configured pin texts.
    pub fn pin_alert(&self, target: &Target) -> Notification {
        let title = if !target.title.trim().is_empty() {
            target.title.clone()
        } else {
            non_blank(&self.pin_title).unwrap_or(DEFAULT_PIN_TITLE).to_string()
        };
        let text = if !target.description.trim().is_empty() {
            target.description.clone()
        } else if let Some(text) = non_blank(&self.pin_text) {
            text.to_string()
        } else {
            let c = target.coordinate;
            format!("lat:{:?}, long:{:?}", c.latitude, c.longitude)
        };
        Notification { title, text }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum SinkCall {
    Show(Notification),
    Dismiss,
    Notify(Notification),
    StopService,
}

/// Records every call, shared so a test can inspect it after handing the sink over.
#[cfg(test)]
#[derive(Clone, Debug, Default)]
pub(crate) struct RecordingSink {
    pub calls: std::sync::Arc<std::sync::Mutex<Vec<SinkCall>>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn take(&self) -> Vec<SinkCall> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }
}

#[cfg(test)]
impl NotificationSink for RecordingSink {
    fn show_foreground(&mut self, notification: &Notification) {
        self.calls.lock().unwrap().push(SinkCall::Show(notification.clone()));
    }

    fn dismiss_foreground(&mut self) {
        self.calls.lock().unwrap().push(SinkCall::Dismiss);
    }

    fn notify(&mut self, notification: &Notification) {
        self.calls.lock().unwrap().push(SinkCall::Notify(notification.clone()));
    }

    fn stop_service(&mut self) {
        self.calls.lock().unwrap().push(SinkCall::StopService);
    }
}

#[test]
fn test_foreground_defaults_show_last_location() {
    let settings = NotificationSettings::default();

    let n = settings.foreground(Some(&Coordinate::new(1.5, -2.25)));
    assert_eq!(n.title, "LocationUpdates");
    assert_eq!(n.text, "Latitude:1.5, longitude:-2.25");

    let n = settings.foreground(None);
    assert_eq!(n.text, "Latitude:0.0, longitude:0.0");
}

#[test]
fn test_foreground_overrides() {
    let settings = NotificationSettings {
        foreground_title: Some("Tracking".to_string()),
        foreground_text: Some(" ".to_string()),
        ..Default::default()
    };
    let n = settings.foreground(Some(&Coordinate::new(3., 4.)));
    assert_eq!(n.title, "Tracking");
    assert_eq!(n.text, "Latitude:3.0, longitude:4.0");
}

#[test]
fn test_pin_alert_uses_target_texts() {
    let settings = NotificationSettings {
        pin_title: Some("Pin".to_string()),
        ..Default::default()
    };
    let titled = Target::new(Coordinate::new(10., 20.), "A", "the first pin");
    assert_eq!(
        settings.pin_alert(&titled),
        Notification { title: "A".to_string(), text: "the first pin".to_string() }
    );

    let untitled = Target::at(10., 20.);
    assert_eq!(
        settings.pin_alert(&untitled),
        Notification { title: "Pin".to_string(), text: "lat:10.0, long:20.0".to_string() }
    );
    assert_eq!(NotificationSettings::default().pin_alert(&untitled).title, "You are near a pin");
}
