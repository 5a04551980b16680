use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::UniqueError;

/// Job backends with unique-job support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Sidekiq,
    Faktory,
}

impl Backend {
    /// Every supported backend, in registry order
    pub const ALL: [Backend; 2] = [Backend::Sidekiq, Backend::Faktory];

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Sidekiq => "sidekiq",
            Backend::Faktory => "faktory",
        }
    }

    /// Human readable list of supported backends, used in error messages
    pub fn supported() -> String {
        Self::ALL
            .iter()
            .map(|b| format!("`{}`", b.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = UniqueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().trim_start_matches(':').to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|b| b.as_str() == name)
            .ok_or_else(|| UniqueError::UnsupportedBackend {
                backend: s.to_string(),
                supported: Self::supported(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend_names() {
        assert_eq!("sidekiq".parse::<Backend>().unwrap(), Backend::Sidekiq);
        assert_eq!("Faktory".parse::<Backend>().unwrap(), Backend::Faktory);
        assert_eq!(":sidekiq".parse::<Backend>().unwrap(), Backend::Sidekiq);
    }

    #[test]
    fn test_unknown_backend_names_supported_set() {
        let err = "invalid".parse::<Backend>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("`invalid`"));
        assert!(msg.contains("`sidekiq`, `faktory`"));
    }
}
