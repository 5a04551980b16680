use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::UniqueResult;

/// Lock id for a job: hex SHA-256 of the compact JSON `[job_class, args]`
///
/// `("DummyWorker", [1])` hashes the text `["DummyWorker",[1]]`. Object keys
/// inside arguments are serialized in sorted order.
pub fn lock_id(job_class: &str, args: &[Value]) -> UniqueResult<String> {
    let identity = serde_json::to_string(&(job_class, args))?;
    let mut hasher = Sha256::new();
    hasher.update(identity.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}
