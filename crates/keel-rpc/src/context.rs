//! Per-call context: deadline and oneway marker.

use crate::message::{META_DEADLINE, META_ONE_WAY};
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Travels with a call. The client folds it into request metadata; the
/// server reconstructs it from the frame.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    deadline: Option<SystemTime>,
    oneway: bool,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the call fire-and-forget: the client will not read a result
    /// and the server dispatches the method in the background.
    pub fn oneway(mut self) -> Self {
        self.oneway = true;
        self
    }

    pub fn is_oneway(&self) -> bool {
        self.oneway
    }

    pub fn with_deadline(mut self, deadline: SystemTime) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline `timeout` from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(SystemTime::now() + timeout)
    }

    pub fn deadline(&self) -> Option<SystemTime> {
        self.deadline
    }

    /// Time left before the deadline; `None` when no deadline is set and
    /// zero when it has already passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline.map(|deadline| {
            deadline
                .duration_since(SystemTime::now())
                .unwrap_or(Duration::ZERO)
        })
    }

    pub(crate) fn deadline_unix_millis(&self) -> Option<u64> {
        self.deadline.and_then(|deadline| {
            deadline
                .duration_since(UNIX_EPOCH)
                .ok()
                .map(|since| since.as_millis() as u64)
        })
    }

    /// Reconstructs the context a request frame carried.
    pub(crate) fn from_meta(meta: &HashMap<String, String>) -> Self {
        let oneway = meta.get(META_ONE_WAY).map(String::as_str) == Some("true");
        let deadline = meta
            .get(META_DEADLINE)
            .and_then(|raw| raw.parse::<u64>().ok())
            .map(|millis| UNIX_EPOCH + Duration::from_millis(millis));
        Self { deadline, oneway }
    }

    /// Folds this context into request metadata.
    pub(crate) fn apply_meta(&self, meta: &mut HashMap<String, String>) {
        if self.oneway {
            meta.insert(META_ONE_WAY.to_string(), "true".to_string());
        }
        if let Some(millis) = self.deadline_unix_millis() {
            meta.insert(META_DEADLINE.to_string(), millis.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_metadata() {
        let ctx = CallContext::new()
            .oneway()
            .with_timeout(Duration::from_secs(5));
        let mut meta = HashMap::new();
        ctx.apply_meta(&mut meta);
        assert_eq!(meta.get(META_ONE_WAY).map(String::as_str), Some("true"));
        assert!(meta.contains_key(META_DEADLINE));

        let back = CallContext::from_meta(&meta);
        assert!(back.is_oneway());
        let skew = back
            .deadline()
            .unwrap()
            .duration_since(ctx.deadline().unwrap())
            .unwrap_or_default();
        // Millisecond truncation only.
        assert!(skew < Duration::from_millis(2));
    }

    #[test]
    fn plain_context_adds_no_metadata() {
        let mut meta = HashMap::new();
        CallContext::new().apply_meta(&mut meta);
        assert!(meta.is_empty());
        assert!(!CallContext::from_meta(&meta).is_oneway());
    }

    #[test]
    fn expired_deadline_reports_zero_remaining() {
        let ctx = CallContext::new().with_deadline(UNIX_EPOCH + Duration::from_secs(1));
        assert_eq!(ctx.remaining(), Some(Duration::ZERO));
    }
}
