//! Host identity and clock, injected wherever a project needs "now" or
//! "this machine".

use std::fmt::Debug;

use chrono::{DateTime, FixedOffset, Local};

/// Format used for the time part of generated identifiers,
/// e.g. `Tue Dec 23 20:40:31 -0800 2008`.
pub const IDENTIFIER_TIME_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Source of the host name and current time.
pub trait Environment: Debug {
    /// A string naming the machine the project is created on.
    fn host_identity(&self) -> String;

    fn now(&self) -> DateTime<FixedOffset>;

    /// Identifier for a new project: `"{host} [{time}]"`.
    fn generate_identifier(&self) -> String {
        format!(
            "{} [{}]",
            self.host_identity(),
            self.now().format(IDENTIFIER_TIME_FORMAT)
        )
    }
}

/// The real machine: host name from the environment, local wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnvironment;

impl Environment for SystemEnvironment {
    fn host_identity(&self) -> String {
        ["HOSTNAME", "COMPUTERNAME"]
            .iter()
            .filter_map(|key| std::env::var(key).ok())
            .find(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "localhost".to_string())
    }

    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// A fixed host and instant, for reproducible output.
#[derive(Debug, Clone)]
pub struct FixedEnvironment {
    host: String,
    time: DateTime<FixedOffset>,
}

impl FixedEnvironment {
    pub fn new(host: impl Into<String>, time: DateTime<FixedOffset>) -> Self {
        Self {
            host: host.into(),
            time,
        }
    }
}

impl Environment for FixedEnvironment {
    fn host_identity(&self) -> String {
        self.host.clone()
    }

    fn now(&self) -> DateTime<FixedOffset> {
        self.time
    }
}
