//! The job record.

use crate::JobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A job as persisted by a `JobStore`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Opaque payload. The queue never interprets it.
    pub details: String,
    /// Set exactly once, by a successful claim.
    pub locked_at: Option<DateTime<Utc>>,
}

impl Job {
    /// A job is eligible for claiming until its `locked_at` is set.
    pub fn is_eligible(&self) -> bool {
        self.locked_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_json_shape() {
        let job = Job {
            id: JobId::new(7),
            details: "echo hi".to_string(),
            locked_at: None,
        };
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "id": 7, "details": "echo hi", "locked_at": null })
        );
        assert!(job.is_eligible());
    }

    #[test]
    fn test_claimed_job_is_not_eligible() {
        let job = Job {
            id: JobId::new(1),
            details: String::new(),
            locked_at: Some(Utc::now()),
        };
        assert!(!job.is_eligible());
    }
}
