use std::{collections::HashMap, fmt, str::FromStr};

use lazy_static::lazy_static;
use thiserror::Error;

/// Logging severity of a failed assertion, from most to least severe.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Fatal,
    Error,
    Warning,
    Info,
    Debug,
}

lazy_static! {
    static ref ROLES: HashMap<&'static str, Severity> = HashMap::from([
        ("fatal", Severity::Fatal),
        ("error", Severity::Error),
        ("warning", Severity::Warning),
        ("warn", Severity::Warning),
        ("info", Severity::Info),
        ("information", Severity::Info),
        ("debug", Severity::Debug),
    ]);
}

/// Map the value of a `role` attribute to a severity.
///
/// Returns `None` for a missing role and for roles outside the known set.
pub fn role_to_severity(role: Option<&str>) -> Option<Severity> {
    role.and_then(|role| ROLES.get(role).copied())
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Fatal => "fatal",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
            Severity::Debug => "debug",
        }
    }

    /// `tracing` has no level above ERROR, fatal records are errors with a
    /// `fatal` field.
    pub fn level(self) -> tracing::Level {
        match self {
            Severity::Fatal | Severity::Error => tracing::Level::ERROR,
            Severity::Warning => tracing::Level::WARN,
            Severity::Info => tracing::Level::INFO,
            Severity::Debug => tracing::Level::DEBUG,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq, Error)]
#[error("unknown severity {0:?}")]
pub struct UnknownSeverity(pub String);

impl FromStr for Severity {
    type Err = UnknownSeverity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        role_to_severity(Some(s)).ok_or_else(|| UnknownSeverity(s.to_string()))
    }
}

/// Emit an event at a runtime-chosen [`Severity`].
#[macro_export]
macro_rules! emit {
    ($severity:expr, $($arg:tt)+) => {
        match $severity {
            $crate::Severity::Fatal => ::tracing::error!(fatal = true, $($arg)+),
            $crate::Severity::Error => ::tracing::error!($($arg)+),
            $crate::Severity::Warning => ::tracing::warn!($($arg)+),
            $crate::Severity::Info => ::tracing::info!($($arg)+),
            $crate::Severity::Debug => ::tracing::debug!($($arg)+),
        }
    };
}
