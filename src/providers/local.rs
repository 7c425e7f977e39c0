use std::fs;
use std::path::Path;

use log::info;

use crate::error::Result;

use super::types::{FailedJob, FailedJobs};

/// Reads the failures of a pipeline from a JSON array of jobs.
///
/// Each entry needs `name` and `id`; `stage`, `web_url` and `allow_failure`
/// are optional. Used for offline runs and to replay a past pipeline.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a JSON array of jobs.
pub fn load_failed_jobs(path: &Path) -> Result<FailedJobs> {
    let content = fs::read_to_string(path)?;
    let jobs: Vec<FailedJob> = serde_json::from_str(&content)?;

    info!("Loaded {} failed jobs from: {}", jobs.len(), path.display());

    Ok(jobs.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_failed_jobs() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
  {{"name": "nifnif", "id": 504685380}},
  {{"name": "nafnaf", "id": 504685381, "stage": "test", "allow_failure": true}}
]"#
        )
        .unwrap();

        let failed = load_failed_jobs(file.path()).unwrap();
        assert_eq!(failed.mandatory.len(), 1);
        assert_eq!(failed.optional[0].name, "nafnaf");
        assert_eq!(failed.optional[0].stage, "test");
    }

    #[test]
    fn test_load_rejects_missing_id() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"[{{"name": "nifnif"}}]"#).unwrap();

        assert!(load_failed_jobs(file.path()).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(load_failed_jobs(Path::new("/nonexistent/failures.json")).is_err());
    }
}
