//! Location tracking session with a foreground notification and proximity
//! alerts for a fixed set of targets.
//!
//! The host platform drives a [`Session`]: it forwards lifecycle calls
//! (start/stop, UI bind/unbind) and location callbacks, and receives
//! notifications through a [`NotificationSink`] and [`SessionEvent`]s through
//! a callback. [`locator`] provides a tokio based adapter for providers that
//! are polled.

use foreground_location_config::{Config, RUST_LOG};

pub mod error;
pub mod lifecycle;
pub mod location;
pub mod locator;
pub mod notification;
pub mod proximity;
pub mod scheduler;
pub mod session;
pub mod settings;
pub mod target;

pub use error::{ErrorState, Provider};
pub use lifecycle::{Permission, ServiceState};
pub use location::{distance, Coordinate, Fix, Miles};
pub use notification::{LogNotificationSink, Notification, NotificationSettings, NotificationSink};
pub use proximity::{evaluate, TriggerPolicy};
pub use scheduler::{LocationSource, UpdateScheduler};
pub use session::{Session, SessionEvent};
pub use settings::SessionSettings;
pub use target::{Target, TargetSet};

pub fn init_logging(cfg: &dyn Config) {
    let rust_log_config = cfg.get_opt(RUST_LOG);
    let mut logger_builder = env_logger::builder();
    if let Some(rust_log) = rust_log_config {
        logger_builder.parse_filters(&rust_log);
    } else {
        logger_builder.filter_level(log::LevelFilter::Info);
    }
    logger_builder.init();
    println!("max logging level is: {}.", log::max_level());
    println!("Use RUST_LOG environment variable to set one of the levels, e.g. RUST_LOG=error");
}
