use serde::{Deserialize, Serialize};

use crate::UniqueError;

/// Scope of a uniqueness claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Across {
    /// One claim per backend + queue
    Queue,

    /// One claim per backend, shared by every queue
    Systemwide,
}

impl Default for Across {
    fn default() -> Self {
        Self::Queue
    }
}

impl Across {
    pub fn all() -> &'static [Across] {
        &[Self::Queue, Self::Systemwide]
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Queue => "queue",
            Self::Systemwide => "systemwide",
        }
    }
}

impl std::fmt::Display for Across {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Across {
    type Err = UniqueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "queue" => Ok(Self::Queue),
            "systemwide" => Ok(Self::Systemwide),
            _ => Err(UniqueError::invalid_config(format!(
                "{:?} is not a valid value for across. Valid options are: {}",
                s,
                valid_options(Self::all().iter().map(|a| a.name())),
            ))),
        }
    }
}

/// When a claimed lock is released by the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnlockPolicy {
    /// Release only after the job completes without error
    Success,

    /// Release as soon as the worker starts the job
    Start,
}

impl Default for UnlockPolicy {
    fn default() -> Self {
        Self::Success
    }
}

impl UnlockPolicy {
    pub fn all() -> &'static [UnlockPolicy] {
        &[Self::Success, Self::Start]
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Start => "start",
        }
    }
}

impl std::fmt::Display for UnlockPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for UnlockPolicy {
    type Err = UniqueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "success" => Ok(Self::Success),
            "start" => Ok(Self::Start),
            _ => Err(UniqueError::invalid_config(format!(
                "{:?} is not a valid value for unlock_policy. Valid options are: {}",
                s,
                valid_options(Self::all().iter().map(|p| p.name())),
            ))),
        }
    }
}

// Accepts `queue`, `:queue` and surrounding whitespace
fn normalize(s: &str) -> String {
    s.trim().trim_start_matches(':').to_lowercase()
}

fn valid_options<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.map(|n| format!("`{}`", n)).collect::<Vec<_>>().join(", ")
}
