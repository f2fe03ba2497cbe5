//! Append-only audit sinks.
//!
//! One JSON line per request outcome, written to a per-role log file. The
//! recorder is a write-only side channel: nothing in the core ever reads it
//! back, and a failed write must never fail the request it describes — it is
//! logged and swallowed.

use crate::role::Role;
use chrono::Utc;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Serialize)]
struct AuditEntry<'a> {
    route: &'a str,
    #[serde(rename = "userID")]
    user_id: &'a str,
    success: bool,
    time: String,
}

/// Per-role append-only audit log writer.
#[derive(Clone, Debug)]
pub struct AuditRecorder {
    dir: PathBuf,
}

impl AuditRecorder {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn log_file(&self, role: Role) -> PathBuf {
        let name = match role {
            Role::Patient => "patient_log.jsonl",
            Role::Doctor => "doctor_log.jsonl",
            Role::Pharmacist => "pharmacy_log.jsonl",
        };
        self.dir.join(name)
    }

    /// Appends one outcome record. Returns whether a line was written.
    ///
    /// Outcomes with no resolved role or user (for example a failed login)
    /// are skipped, matching the recorder this one descends from.
    pub fn record(
        &self,
        role: Option<Role>,
        user_id: Option<&str>,
        route: &str,
        success: bool,
    ) -> bool {
        let (Some(role), Some(user_id)) = (role, user_id) else {
            return false;
        };
        if route.is_empty() || user_id.is_empty() {
            return false;
        }

        let entry = AuditEntry {
            route,
            user_id,
            success,
            time: Utc::now().to_rfc3339(),
        };

        match self.append_line(role, &entry) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("audit write failed for {route}: {e}");
                false
            }
        }
    }

    fn append_line(&self, role: Role, entry: &AuditEntry<'_>) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_file(role))?;
        let line = serde_json::to_string(entry)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        writeln!(file, "{line}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_appends_json_lines_per_role() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let recorder = AuditRecorder::new(temp_dir.path().to_path_buf());

        assert!(recorder.record(Some(Role::Patient), Some("BM00001"), "/me", true));
        assert!(recorder.record(Some(Role::Patient), Some("BM00001"), "/messages/BM00001", false));
        assert!(recorder.record(Some(Role::Doctor), Some("TC00001"), "/me", true));

        let patient_log = fs::read_to_string(temp_dir.path().join("patient_log.jsonl"))
            .expect("patient log should exist");
        let lines: Vec<&str> = patient_log.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value =
            serde_json::from_str(lines[0]).expect("line should be JSON");
        assert_eq!(first["route"], "/me");
        assert_eq!(first["userID"], "BM00001");
        assert_eq!(first["success"], true);
        assert!(first["time"].as_str().unwrap().contains('T'));

        let doctor_log = fs::read_to_string(temp_dir.path().join("doctor_log.jsonl"))
            .expect("doctor log should exist");
        assert_eq!(doctor_log.lines().count(), 1);
    }

    #[test]
    fn test_record_skips_unresolved_outcomes() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let recorder = AuditRecorder::new(temp_dir.path().to_path_buf());

        assert!(!recorder.record(None, Some("BM00001"), "/me", false));
        assert!(!recorder.record(Some(Role::Patient), None, "/me", false));
        assert!(!recorder.record(Some(Role::Patient), Some(""), "/me", false));
        assert!(!recorder.record(Some(Role::Patient), Some("BM00001"), "", false));

        assert!(!temp_dir.path().join("patient_log.jsonl").exists());
    }
}
