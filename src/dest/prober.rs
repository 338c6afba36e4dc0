use crate::fingerprint::ContentHash;
use crate::types::ProbeFailurePolicy;

use super::{Destination, DestinationError};

/// Decides whether identical content already sits at a destination key.
pub struct DestinationProber<'a> {
    destination: &'a dyn Destination,
    policy: ProbeFailurePolicy,
}

impl<'a> DestinationProber<'a> {
    pub fn new(destination: &'a dyn Destination, policy: ProbeFailurePolicy) -> Self {
        Self {
            destination,
            policy,
        }
    }

    /// `true` only when the object exists and its integrity tag equals
    /// `expected`. A lookup fault is `false` under
    /// [`ProbeFailurePolicy::AssumeAbsent`] and an error under
    /// [`ProbeFailurePolicy::FailItem`].
    pub async fn exists(
        &self,
        key: &str,
        expected: &ContentHash,
    ) -> Result<bool, DestinationError> {
        match self.destination.head_object(key).await {
            Ok(None) => Ok(false),
            Ok(Some(head)) => {
                let same = expected.matches_tag(&head.integrity_tag);
                if !same {
                    tracing::debug!(
                        key = %key,
                        remote = %head.integrity_tag,
                        local = %expected,
                        "Destination object differs"
                    );
                }
                Ok(same)
            }
            Err(e) => match self.policy {
                ProbeFailurePolicy::AssumeAbsent => {
                    tracing::warn!(key = %key, "Probe failed, uploading anyway: {}", e);
                    Ok(false)
                }
                ProbeFailurePolicy::FailItem => Err(e),
            },
        }
    }
}
