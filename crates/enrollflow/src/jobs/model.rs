// crates/enrollflow/src/jobs/model.rs
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Processing)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One item of an enrollment batch: a student code, display name and target group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentItem {
    pub codigo: String,
    #[serde(default)]
    pub nombre: String,
    pub grupo: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SucceededItem {
    pub codigo: String,
    #[serde(default)]
    pub nombre: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    pub codigo: String,
    #[serde(default)]
    pub nombre: String,
    pub error: String,
}

impl SucceededItem {
    pub fn from_item(item: &EnrollmentItem) -> Self {
        Self {
            codigo: item.codigo.clone(),
            nombre: item.nombre.clone(),
        }
    }
}

impl FailedItem {
    pub fn from_item(item: &EnrollmentItem, error: impl Into<String>) -> Self {
        Self {
            codigo: item.codigo.clone(),
            nombre: item.nombre.clone(),
            error: error.into(),
        }
    }
}

/// Rejected mutations of a job's progress record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProgressViolation {
    #[error("job not found: {0}")]
    NotFound(String),

    #[error("job is already {status}")]
    AlreadyTerminal { status: JobStatus },

    #[error("job already processed all {total} item(s)")]
    CapacityExceeded { total: u32 },

    #[error("job processed {current} of {total} item(s), cannot complete")]
    Incomplete { current: u32, total: u32 },

    #[error("inconsistent snapshot: {0}")]
    Inconsistent(String),
}

/// Snapshot of a batch job as the status endpoint reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub status: JobStatus,
    pub current: u32,
    pub total: u32,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub success: Vec<SucceededItem>,
    #[serde(default)]
    pub errors: Vec<FailedItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub total: u32,
}

impl ProgressSummary {
    pub fn is_partial_success(&self) -> bool {
        self.succeeded > 0 && self.failed > 0
    }
}

impl JobProgress {
    pub fn started(total: u32, message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Processing,
            current: 0,
            total,
            message: message.into(),
            success: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        let pct = (u64::from(self.current) * 100) / u64::from(self.total);
        pct.min(100) as u8
    }

    pub fn summary(&self) -> ProgressSummary {
        ProgressSummary {
            succeeded: self.success.len(),
            failed: self.errors.len(),
            total: self.total,
        }
    }

    /// Checks the counters against the item lists.
    pub fn check_consistency(&self) -> Result<(), ProgressViolation> {
        if self.current > self.total {
            return Err(ProgressViolation::Inconsistent(format!(
                "current {} exceeds total {}",
                self.current, self.total
            )));
        }
        let recorded = self.success.len() + self.errors.len();
        if recorded != self.current as usize {
            return Err(ProgressViolation::Inconsistent(format!(
                "{} recorded item(s) but current is {}",
                recorded, self.current
            )));
        }
        Ok(())
    }

    pub fn push_success(&mut self, item: SucceededItem) -> Result<(), ProgressViolation> {
        self.ensure_room()?;
        self.success.push(item);
        self.current += 1;
        Ok(())
    }

    pub fn push_error(&mut self, item: FailedItem) -> Result<(), ProgressViolation> {
        self.ensure_room()?;
        self.errors.push(item);
        self.current += 1;
        Ok(())
    }

    pub fn set_message(&mut self, message: impl Into<String>) -> Result<(), ProgressViolation> {
        self.ensure_processing()?;
        self.message = message.into();
        Ok(())
    }

    pub fn complete(&mut self, message: impl Into<String>) -> Result<(), ProgressViolation> {
        self.ensure_processing()?;
        if self.current < self.total {
            return Err(ProgressViolation::Incomplete {
                current: self.current,
                total: self.total,
            });
        }
        self.status = JobStatus::Completed;
        self.message = message.into();
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), ProgressViolation> {
        self.ensure_processing()?;
        self.status = JobStatus::Failed;
        self.message = message.into();
        Ok(())
    }

    fn ensure_processing(&self) -> Result<(), ProgressViolation> {
        if self.status.is_terminal() {
            return Err(ProgressViolation::AlreadyTerminal {
                status: self.status,
            });
        }
        Ok(())
    }

    fn ensure_room(&self) -> Result<(), ProgressViolation> {
        self.ensure_processing()?;
        if self.current >= self.total {
            return Err(ProgressViolation::CapacityExceeded { total: self.total });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ok(codigo: &str) -> SucceededItem {
        SucceededItem {
            codigo: codigo.into(),
            nombre: String::new(),
        }
    }

    fn bad(codigo: &str, error: &str) -> FailedItem {
        FailedItem {
            codigo: codigo.into(),
            nombre: String::new(),
            error: error.into(),
        }
    }

    #[test]
    fn parses_wire_snapshot_with_missing_optional_fields() {
        let p: JobProgress = serde_json::from_value(json!({
            "status": "processing",
            "current": 1,
            "total": 3,
            "success": [{"codigo": "S1"}],
            "errors": []
        }))
        .unwrap();

        assert_eq!(p.status, JobStatus::Processing);
        assert_eq!(p.success[0].nombre, "");
        assert_eq!(p.message, "");
        assert!(p.check_consistency().is_ok());
    }

    #[test]
    fn serializes_status_lowercase() {
        let v = serde_json::to_value(JobProgress::started(2, "go")).unwrap();
        assert_eq!(v["status"], "processing");
        assert_eq!(v["current"], 0);
        assert_eq!(v["success"], json!([]));
    }

    #[test]
    fn counters_follow_appends() {
        let mut p = JobProgress::started(3, "");
        p.push_success(ok("S1")).unwrap();
        p.push_success(ok("S2")).unwrap();
        p.push_error(bad("S3", "duplicate")).unwrap();

        assert_eq!(p.current, 3);
        assert!(p.check_consistency().is_ok());
        assert_eq!(
            p.push_success(ok("S4")),
            Err(ProgressViolation::CapacityExceeded { total: 3 })
        );

        p.complete("done").unwrap();
        let s = p.summary();
        assert_eq!((s.succeeded, s.failed), (2, 1));
        assert!(s.is_partial_success());
    }

    #[test]
    fn terminal_state_is_final() {
        let mut p = JobProgress::started(2, "");
        p.push_success(ok("S1")).unwrap();
        p.fail("disk full").unwrap();

        let terminal = ProgressViolation::AlreadyTerminal {
            status: JobStatus::Failed,
        };
        assert_eq!(p.push_error(bad("S2", "x")), Err(terminal.clone()));
        assert_eq!(p.complete("late"), Err(terminal.clone()));
        assert_eq!(p.fail("again"), Err(terminal));
        assert_eq!(p.message, "disk full");
    }

    #[test]
    fn complete_requires_all_items() {
        let mut p = JobProgress::started(2, "");
        p.push_success(ok("S1")).unwrap();
        assert_eq!(
            p.complete("early"),
            Err(ProgressViolation::Incomplete {
                current: 1,
                total: 2
            })
        );
    }

    #[test]
    fn percent_handles_empty_batch() {
        assert_eq!(JobProgress::started(0, "").percent(), 100);

        let mut p = JobProgress::started(3, "");
        p.push_success(ok("S1")).unwrap();
        assert_eq!(p.percent(), 33);
    }

    #[test]
    fn detects_inconsistent_counters() {
        let p = JobProgress {
            status: JobStatus::Processing,
            current: 2,
            total: 3,
            message: String::new(),
            success: vec![ok("S1")],
            errors: vec![],
        };
        assert!(matches!(
            p.check_consistency(),
            Err(ProgressViolation::Inconsistent(_))
        ));
    }
}
