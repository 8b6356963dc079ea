//! Resource limits for bundle execution

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Resource limits applied to a single invocation.
///
/// Every limit is optional. The default leaves guest execution unbounded: a
/// bundle that never returns blocks the invoking thread indefinitely. Callers
/// that run untrusted or long-lived bundles should opt into
/// [`ResourceLimits::bounded`] or set a [`timeout`](Self::timeout).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Maximum interpreter heap in bytes
    #[serde(default)]
    pub max_memory_bytes: Option<u64>,
    /// Maximum interpreter stack in bytes
    #[serde(default)]
    pub max_stack_bytes: Option<u64>,
    /// Wall-clock deadline for the whole invocation (load and call)
    #[serde(default, with = "duration_ms")]
    pub timeout: Option<Duration>,
}

impl ResourceLimits {
    /// Limits with no quota of any kind.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// A reasonable set of limits for bundles that are not fully trusted.
    pub fn bounded() -> Self {
        Self {
            max_memory_bytes: Some(64 * 1024 * 1024), // 64 MB
            max_stack_bytes: Some(1024 * 1024),       // 1 MB
            timeout: Some(Duration::from_secs(30)),   // 30 second wall clock
        }
    }

    /// Set the wall-clock deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the heap limit.
    pub fn with_max_memory_bytes(mut self, bytes: u64) -> Self {
        self.max_memory_bytes = Some(bytes);
        self
    }

    /// Returns true if no limit is set.
    pub fn is_unbounded(&self) -> bool {
        self.max_memory_bytes.is_none() && self.max_stack_bytes.is_none() && self.timeout.is_none()
    }
}

/// Helper for serializing an optional Duration as milliseconds
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.map(|d| d.as_millis()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = Option::<u64>::deserialize(deserializer)?;
        Ok(ms.map(Duration::from_millis))
    }
}
