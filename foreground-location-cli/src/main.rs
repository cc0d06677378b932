use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Result};
use clap::Parser;
use tokio::sync::{Mutex, Notify};

use foreground_location::{
    init_logging,
    locator::{spawn_polling, DummyPollingLocator, PollingSource, ReplayLocator},
    Coordinate, LogNotificationSink, Permission, ServiceState, Session, SessionEvent, SessionSettings, TargetSet,
};
use foreground_location_config::{
    env_with_defaults, CompositeConfig, HashMapConfig, TRIGGER_POLICY, TRIGGER_RADIUS, UPDATE_INTERVAL_MS,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Target list: {"locations": [{"lat", "lng", "title", "description"}]} or [[lat, lon], ...]
    #[arg(long)]
    targets: PathBuf,

    /// Recorded track to replay. Without one, --location is reported on every poll.
    #[arg(long)]
    track: Option<PathBuf>,

    /// Fixed location as LAT,LON
    #[arg(long, value_parser = parse_coordinate, default_value = "0,0")]
    location: Coordinate,

    #[arg(long)]
    interval_ms: Option<u64>,

    /// Trigger radius, e.g. 0.5mi, 250m or 1.2km
    #[arg(long)]
    radius: Option<String>,

    /// every-fix or on-entry
    #[arg(long)]
    policy: Option<String>,

    /// Start with a UI bound, i.e. without the foreground notification
    #[arg(long)]
    ui_bound: bool,

    /// Start as if location permission had been refused
    #[arg(long)]
    deny_permission: bool,
}

fn parse_coordinate(s: &str) -> Result<Coordinate> {
    let (latitude, longitude) = s
        .split_once(',')
        .ok_or_else(|| anyhow!("expected LAT,LON, got '{s}'"))?;
    Ok(Coordinate::new(latitude.trim().parse()?, longitude.trim().parse()?))
}

/// Command line values override the environment, which overrides the defaults.
fn build_config(args: &Args) -> CompositeConfig {
    let mut overrides = HashMapConfig::default();
    if let Some(interval_ms) = args.interval_ms {
        overrides.set(UPDATE_INTERVAL_MS, &interval_ms.to_string());
    }
    if let Some(radius) = &args.radius {
        overrides.set(TRIGGER_RADIUS, radius);
    }
    if let Some(policy) = &args.policy {
        overrides.set(TRIGGER_POLICY, policy);
    }
    CompositeConfig::from_configs(Box::new(overrides), Box::new(env_with_defaults()))
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = build_config(&args);
    init_logging(&config);
    log::info!("Starting up foreground location session");

    let settings = SessionSettings::from_config(&config)?;
    log::info!(
        "polling every {}ms, alerting within {} ({:.0}m)",
        settings.update_interval.as_millis(),
        settings.radius,
        settings.radius.as_meters()
    );
    let targets = TargetSet::load(&args.targets)?;

    let (source, subscription) = PollingSource::channel();
    let mut session = Session::new(settings, source, LogNotificationSink);

    let session_ended = Arc::new(Notify::new());
    let session_ended_clone = session_ended.clone();
    session.on_session_event(move |event| match event {
        SessionEvent::LocationUpdated(fix) => {
            println!("{} lat:{}, long:{}", fix.time, fix.coordinate.latitude, fix.coordinate.longitude);
        }
        SessionEvent::ProximityMatch(target) => {
            println!("near '{}' at {}", target.title, target.coordinate);
        }
        SessionEvent::TargetExited(target) => {
            println!("left '{}' at {}", target.title, target.coordinate);
        }
        SessionEvent::Error(error) => {
            println!("error {}: {error}", error.code());
            session_ended_clone.notify_one();
        }
    });

    if args.ui_bound {
        session.bind();
    }
    let permission = if args.deny_permission {
        Permission::Denied
    } else {
        Permission::Granted
    };
    session.start(targets, permission);
    if session.state() == ServiceState::Stopped {
        return Ok(());
    }

    let session = Arc::new(Mutex::new(session));
    let mut polling = match &args.track {
        Some(path) => spawn_polling(&session, subscription, ReplayLocator::load(path)?),
        None => spawn_polling(&session, subscription, DummyPollingLocator::at(args.location)),
    };

    tokio::select! {
        _ = &mut polling => log::info!("track finished"),
        _ = session_ended.notified() => log::info!("session ended"),
        _ = tokio::signal::ctrl_c() => log::info!("interrupted"),
    }

    session.lock().await.stop();
    polling.abort();
    Ok(())
}

#[test]
fn test_parse_coordinate() {
    assert_eq!(parse_coordinate("48.49, 9.21").unwrap(), Coordinate::new(48.49, 9.21));
    assert!(parse_coordinate("48.49").is_err());
    assert!(parse_coordinate("north,east").is_err());
}

#[test]
fn test_command_line_overrides_config() {
    use foreground_location_config::Config;

    let args = Args::parse_from(["foreground-location", "--targets", "pins.json", "--radius", "250m"]);
    let config = build_config(&args);
    assert_eq!(config.get(TRIGGER_RADIUS).unwrap(), "250m");

    let settings = SessionSettings::from_config(&config).unwrap();
    assert!((settings.radius.as_meters() - 250.).abs() < 1e-9);
    assert_eq!(args.location, Coordinate::new(0., 0.));
}
