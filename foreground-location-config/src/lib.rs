use std::collections::HashMap;

use anyhow::{Result, anyhow};
use dotenv::*;

pub const UPDATE_INTERVAL_MS: &str = "UPDATE_INTERVAL_MS";
pub const TRIGGER_RADIUS: &str = "TRIGGER_RADIUS";
pub const TRIGGER_POLICY: &str = "TRIGGER_POLICY";
pub const NOTIFICATION_TITLE: &str = "NOTIFICATION_TITLE";
pub const NOTIFICATION_TEXT: &str = "NOTIFICATION_TEXT";
pub const PIN_NOTIFICATION_TITLE: &str = "PIN_NOTIFICATION_TITLE";
pub const PIN_NOTIFICATION_TEXT: &str = "PIN_NOTIFICATION_TEXT";
pub const RUST_LOG: &str = "RUST_LOG";

pub trait Config: Send + Sync{
    fn get(&self, key: &str) -> Result<String>;
    fn clone_box_dyn(&self) -> Box<dyn Config>;

    /// Like `get`, but treats a missing or blank value as absent.
    fn get_opt(&self, key: &str) -> Option<String> {
        self.get(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
    }
}

impl Clone for Box<dyn Config> {
    fn clone(&self) -> Self {
        self.clone_box_dyn()
    }
}

#[derive(Clone)]
pub struct CompositeConfig {
    main: Box<dyn Config>,
    fallback: Box<dyn Config>,
}

impl CompositeConfig {
    pub fn from_configs(main: Box<dyn Config>, fallback: Box<dyn Config>) -> CompositeConfig {
        CompositeConfig{ main, fallback }
    }
}

impl Config for CompositeConfig {
    fn get(&self, key: &str) -> Result<String> {
        self.main
        .get(key)
        .or_else(|_e| self.fallback.get(key))
    }

    fn clone_box_dyn(&self) -> Box<dyn Config> {
        Box::new(CompositeConfig {
            main: self.main.clone_box_dyn(),
            fallback: self.fallback.clone_box_dyn()
        })
    }
}


/// Reads keys from the process environment, after merging in a `.env` file if one is found.
#[derive(Clone)]
pub struct EnvConfig;

impl EnvConfig {
    pub fn from_env() -> EnvConfig {
        // logging is configured from this very config, so report on stdout
        match dotenv() {
            Ok(path) => {
                let path = path.to_string_lossy();
                println!("additional environment variables loaded from {path}");
            }
            Err(e) => {
                println!("no .env file loaded: {e}");
            }
        }

        EnvConfig
    }
}

impl Config for EnvConfig{
    fn get(&self, key: &str) -> Result<String> {
        std::env::var(key).map_err(|_| anyhow!("no such environment variable {key}"))
    }
    fn clone_box_dyn(&self) -> Box<dyn Config> {
        Box::new(self.clone())
    }
}

pub fn default_config() -> impl Config {
    let default_values = [
        (UPDATE_INTERVAL_MS, "5000"),
        (TRIGGER_RADIUS, "0.1mi"),
        (TRIGGER_POLICY, "every-fix"),
        (PIN_NOTIFICATION_TITLE, "You are near a pin"),
    ];
    HashMapConfig::from_pairs(default_values)
}

/// Environment first, built-in defaults second.
pub fn env_with_defaults() -> CompositeConfig {
    CompositeConfig::from_configs(
        Box::new(EnvConfig::from_env()),
        Box::new(default_config())
    )
}

#[derive(Clone, Default)]
pub struct HashMapConfig {
    map: HashMap<String,String>
}

impl HashMapConfig {
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> HashMapConfig {
        let map = pairs.into_iter()
        .map(|(k,v)| (k.to_string(), v.to_string()))
        .collect();
        Self {map}
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.map.insert(key.to_string(), value.to_string());
    }
}

impl Config for HashMapConfig {
    fn get(&self, key: &str) -> Result<String> {
        self.map
        .get(key)
        .map(String::clone)
        .ok_or_else(||anyhow!("key '{key}' not found"))
    }

    fn clone_box_dyn(&self) -> Box<dyn Config> {
        Box::new(self.clone())
    }
}

#[test]
fn test_composite_falls_back() {
    let main = HashMapConfig::from_pairs([(TRIGGER_RADIUS, "250m")]);
    let config = CompositeConfig::from_configs(Box::new(main), Box::new(default_config()));

    assert_eq!(config.get(TRIGGER_RADIUS).unwrap(), "250m");
    assert_eq!(config.get(UPDATE_INTERVAL_MS).unwrap(), "5000");
    assert!(config.get("NO_SUCH_KEY").is_err());
}

#[test]
fn test_get_opt_ignores_blank_values() {
    let mut config = HashMapConfig::default();
    config.set(NOTIFICATION_TITLE, "  ");
    config.set(NOTIFICATION_TEXT, "tracking");

    assert_eq!(config.get_opt(NOTIFICATION_TITLE), None);
    assert_eq!(config.get_opt(NOTIFICATION_TEXT).as_deref(), Some("tracking"));
    assert_eq!(config.get_opt(RUST_LOG), None);
}

#[test]
fn test_boxed_config_clones() {
    let boxed: Box<dyn Config> = Box::new(default_config());
    let cloned = boxed.clone();
    assert_eq!(cloned.get(TRIGGER_POLICY).unwrap(), "every-fix");
}
