use std::fs;
use std::path::PathBuf;

use crate::orchestration::domain::durable_sink::{DurableSink, JobRecord};
use crate::shared::error::SinkError;

/// Writes each job as `<dir>/<job_id>.json`.
///
/// Characters outside `[A-Za-z0-9_-]` are written as `%XX` per UTF-8 byte,
/// so distinct job ids always map to distinct files.
///
/// The document is written to a temporary sibling first and renamed into
/// place, so readers never see a partial record.
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, job_id: &str) -> PathBuf {
        let mut name = String::with_capacity(job_id.len() + 5);
        for byte in job_id.bytes() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
                name.push(char::from(byte));
            } else {
                name.push_str(&format!("%{byte:02X}"));
            }
        }
        name.push_str(".json");
        self.dir.join(name)
    }
}

impl DurableSink for JsonFileSink {
    fn persist(&self, record: &JobRecord) -> Result<(), SinkError> {
        let json = serde_json::to_string_pretty(record).map_err(SinkError::Serialize)?;

        fs::create_dir_all(&self.dir).map_err(|source| SinkError::Write {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.path_for(&record.aggregate.job_id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| SinkError::Write {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| SinkError::Write {
            path: path.clone(),
            source,
        })?;

        log::debug!("Persisted job {} to {}", record.aggregate.job_id, path.display());
        Ok(())
    }
}
