//! Per-folder bookkeeping: the carried-forward stats line and the timing record.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Stats log appended to by the fuzzing loop in the working folder.
pub const STATS_FILE_NAME: &str = "_qite_stats.jsonl";

/// Timing record written into each result folder.
pub const TIMING_FILE_NAME: &str = "time.json";

/// Contents of `time.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingRecord {
    /// Seconds spent in the collection pass.
    pub coverage_computation_time: f64,
}

/// Append the last non-empty line of `working/file_name` to
/// `result_folder/file_name`. A missing or empty log is a no-op.
///
/// Lines end at `\n` only, so a CRLF log keeps its `\r`.
pub fn carry_forward_last_line(
    working: &Path,
    result_folder: &Path,
    file_name: &str,
) -> Result<Option<String>> {
    let raw = match fs::read_to_string(working.join(file_name)) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let Some(last) = raw.split('\n').rev().find(|l| !l.trim().is_empty()) else {
        return Ok(None);
    };

    let mut out = OpenOptions::new()
        .create(true)
        .append(true)
        .open(result_folder.join(file_name))?;
    out.write_all(last.as_bytes())?;
    out.write_all(b"\n")?;
    Ok(Some(last.to_string()))
}

/// Write `{"coverage_computation_time": <seconds>}` to `time.json`.
pub fn write_timing_record(result_folder: &Path, elapsed: Duration) -> Result<PathBuf> {
    let record = TimingRecord {
        coverage_computation_time: elapsed.as_secs_f64(),
    };
    let path = result_folder.join(TIMING_FILE_NAME);
    fs::write(&path, serde_json::to_string(&record)?)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_line_is_copied_verbatim() {
        let dir = tempfile::tempdir().expect("tempdir");
        let work = dir.path().join("work");
        let out = dir.path().join("0001");
        fs::create_dir_all(&work).expect("mkdir");
        fs::create_dir_all(&out).expect("mkdir");
        fs::write(
            work.join(STATS_FILE_NAME),
            "{\"iteration\": 1}\n{\"iteration\": 2, \"gates\": 14}\n\n",
        )
        .expect("write");

        let line = carry_forward_last_line(&work, &out, STATS_FILE_NAME).expect("carry");
        assert_eq!(line.as_deref(), Some("{\"iteration\": 2, \"gates\": 14}"));
        assert_eq!(
            fs::read_to_string(out.join(STATS_FILE_NAME)).expect("read"),
            "{\"iteration\": 2, \"gates\": 14}\n"
        );
    }

    #[test]
    fn test_crlf_line_keeps_carriage_return() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("0002");
        fs::create_dir(&out).expect("mkdir");
        fs::write(
            dir.path().join(STATS_FILE_NAME),
            "{\"iteration\": 1}\r\n{\"iteration\": 2}\r\n",
        )
        .expect("write");

        let line = carry_forward_last_line(dir.path(), &out, STATS_FILE_NAME).expect("carry");
        assert_eq!(line.as_deref(), Some("{\"iteration\": 2}\r"));
        assert_eq!(
            fs::read_to_string(out.join(STATS_FILE_NAME)).expect("read"),
            "{\"iteration\": 2}\r\n"
        );
    }

    #[test]
    fn test_missing_or_empty_log_is_noop() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(
            carry_forward_last_line(dir.path(), dir.path(), STATS_FILE_NAME).expect("carry"),
            None
        );

        let out = dir.path().join("out");
        fs::create_dir(&out).expect("mkdir");
        fs::write(dir.path().join(STATS_FILE_NAME), "\n\n").expect("write");
        assert_eq!(
            carry_forward_last_line(dir.path(), &out, STATS_FILE_NAME).expect("carry"),
            None
        );
        assert!(!out.join(STATS_FILE_NAME).exists());
    }

    #[test]
    fn test_timing_record_schema() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_timing_record(dir.path(), Duration::from_millis(1500)).expect("write");
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).expect("read")).expect("parse");
        assert_eq!(raw["coverage_computation_time"], 1.5);
        assert_eq!(raw.as_object().map(|o| o.len()), Some(1));
    }
}
