use std::time::Duration;

#[cfg(feature = "metrics")]
pub mod metrics;
pub mod patch;

pub(crate) mod colors;

mod error;
mod merge;

pub use error::*;
pub use merge::mergeconcat;

/// The default interval for requeuing a resource that is still in progress.
pub(crate) const PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// The delay before retrying after a conflict or incomplete results.
pub(crate) const RETRY_DELAY: Duration = Duration::from_secs(1);

pub fn hash_spec<T: serde::Serialize>(spec: &T) -> String {
    use sha2::{Digest, Sha256};
    let spec_bytes = serde_json::to_vec(spec).unwrap();
    let mut hasher = Sha256::new();
    hasher.update(&spec_bytes);
    let result = hasher.finalize();
    hex::encode(result)
}

/// Deletes the named resource, treating a 404 as success.
pub async fn delete_ignore_404<K>(api: &kube::Api<K>, name: &str) -> Result<(), Error>
where
    K: Clone + serde::de::DeserializeOwned + std::fmt::Debug,
{
    match api.delete(name, &Default::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_spec_is_stable_and_sensitive() {
        let a = hash_spec(&serde_json::json!({"duration": 3, "streams": 1}));
        let b = hash_spec(&serde_json::json!({"duration": 3, "streams": 1}));
        let c = hash_spec(&serde_json::json!({"duration": 3, "streams": 2}));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
