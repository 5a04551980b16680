use crate::types::Across;
use crate::{UniqueError, UniqueResult};

/// Builds the store key (digest) naming a uniqueness scope
///
/// Segments are trimmed and lower-cased, then joined under `bgjb:uniq`.
/// `queue` keeps every segment; `systemwide` drops the last one, which is
/// normally the queue name.
pub struct LockDigest;

impl LockDigest {
    pub const NAMESPACE: &'static str = "bgjb";
    pub const BASE: &'static str = "uniq";
    pub const SEPARATOR: &'static str = ":";

    /// Build the digest from a textual scope mode, rejecting unknown modes
    pub fn build<S: AsRef<str>>(segments: &[S], across: &str) -> UniqueResult<String> {
        let across = match across.trim().trim_start_matches(':') {
            "queue" => Across::Queue,
            "systemwide" => Across::Systemwide,
            _ => {
                return Err(UniqueError::invalid_config(format!(
                    "Could not resolve the lock digest using across {:?}. \
                     Valid options are systemwide and queue",
                    across
                )))
            }
        };
        Ok(Self::for_scope(segments, across))
    }

    pub fn for_scope<S: AsRef<str>>(segments: &[S], across: Across) -> String {
        let keep = match across {
            Across::Queue => segments.len(),
            Across::Systemwide => segments.len().saturating_sub(1),
        };

        let mut parts = vec![Self::NAMESPACE.to_string(), Self::BASE.to_string()];
        parts.extend(
            segments[..keep]
                .iter()
                .map(|s| s.as_ref().trim().to_lowercase()),
        );
        parts.join(Self::SEPARATOR)
    }
}
