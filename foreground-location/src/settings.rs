use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use foreground_location_config::{
    Config, NOTIFICATION_TEXT, NOTIFICATION_TITLE, PIN_NOTIFICATION_TEXT, PIN_NOTIFICATION_TITLE,
    TRIGGER_POLICY, TRIGGER_RADIUS, UPDATE_INTERVAL_MS,
};

use crate::{location::Miles, notification::NotificationSettings, proximity::TriggerPolicy};

/// Everything a session needs to know up front. Fixed for the session's lifetime.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSettings {
    pub update_interval: Duration,
    pub radius: Miles,
    pub policy: TriggerPolicy,
    pub notification: NotificationSettings,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_millis(5000),
            radius: Miles(0.1),
            policy: TriggerPolicy::default(),
            notification: NotificationSettings::default(),
        }
    }
}

impl SessionSettings {
    /// Reads settings from `config`; keys that are not set keep their defaults.
    pub fn from_config(config: &dyn Config) -> Result<Self> {
        let mut settings = Self::default();

        if let Some(interval) = config.get_opt(UPDATE_INTERVAL_MS) {
            let millis: u64 = interval
                .trim()
                .parse()
                .with_context(|| format!("{UPDATE_INTERVAL_MS} must be a number of milliseconds, got '{interval}'"))?;
            if millis == 0 {
                return Err(anyhow!("{UPDATE_INTERVAL_MS} must be greater than zero"));
            }
            settings.update_interval = Duration::from_millis(millis);
        }
        if let Some(radius) = config.get_opt(TRIGGER_RADIUS) {
            settings.radius = radius.parse().with_context(|| format!("invalid {TRIGGER_RADIUS}"))?;
        }
        if let Some(policy) = config.get_opt(TRIGGER_POLICY) {
            settings.policy = policy.parse().with_context(|| format!("invalid {TRIGGER_POLICY}"))?;
        }

        settings.notification = NotificationSettings {
            foreground_title: config.get_opt(NOTIFICATION_TITLE),
            foreground_text: config.get_opt(NOTIFICATION_TEXT),
            pin_title: config.get_opt(PIN_NOTIFICATION_TITLE),
            pin_text: config.get_opt(PIN_NOTIFICATION_TEXT),
        };

        Ok(settings)
    }
}

#[test]
fn test_settings_from_defaults() {
    let settings = SessionSettings::from_config(&foreground_location_config::default_config()).unwrap();

    assert_eq!(settings.update_interval, Duration::from_secs(5));
    assert_eq!(settings.radius, Miles(0.1));
    assert_eq!(settings.policy, TriggerPolicy::EveryFix);
    assert_eq!(settings.notification.foreground_title, None);
    assert_eq!(settings.notification.pin_title.as_deref(), Some("You are near a pin"));
}

#[test]
fn test_settings_from_values() {
    use foreground_location_config::HashMapConfig;

    let config = HashMapConfig::from_pairs([
        (UPDATE_INTERVAL_MS, "1000"),
        (TRIGGER_RADIUS, "1609.344m"),
        (TRIGGER_POLICY, "on-entry"),
        (NOTIFICATION_TITLE, "Tracking"),
    ]);
    let settings = SessionSettings::from_config(&config).unwrap();

    assert_eq!(settings.update_interval, Duration::from_secs(1));
    assert!((settings.radius.0 - 1.0).abs() < 1e-12);
    assert_eq!(settings.policy, TriggerPolicy::OnEntry);
    assert_eq!(settings.notification.foreground_title.as_deref(), Some("Tracking"));
}

#[test]
fn test_settings_reject_invalid_values() {
    use foreground_location_config::HashMapConfig;

    for (key, value) in [
        (UPDATE_INTERVAL_MS, "soon"),
        (UPDATE_INTERVAL_MS, "0"),
        (TRIGGER_RADIUS, "-5m"),
        (TRIGGER_POLICY, "always"),
    ] {
        let config = HashMapConfig::from_pairs([(key, value)]);
        let err = SessionSettings::from_config(&config).unwrap_err();
        assert!(format!("{err:#}").contains(key), "{key}={value}: {err:#}");
    }
}
