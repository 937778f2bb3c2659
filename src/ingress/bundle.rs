use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

use super::IngressError;
use crate::queue::JobIntake;
use crate::worker::Ingress;

/// Metadata file shipped inside every bundle; never relayed
pub const BUNDLE_METADATA_FILE: &str = "config.json";

#[derive(Debug, Clone, Default, Serialize)]
pub struct BundleReport {
    pub submitted: Vec<SubmittedFile>,
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<FailedFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmittedFile {
    pub path: PathBuf,
    pub job_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub path: PathBuf,
    pub error: String,
}

/// Relay every file of an already extracted bundle, one job per file
///
/// Walks `dir` recursively. Files named `config.json` at any depth are
/// skipped. A file that cannot be submitted is reported and does not stop
/// the rest of the bundle.
pub async fn relay_bundle(dir: &Path, intake: &JobIntake) -> Result<BundleReport, IngressError> {
    let files = collect_files(dir).await?;
    let mut report = BundleReport::default();

    for (path, size) in files {
        if path.file_name().is_some_and(|n| n == BUNDLE_METADATA_FILE) {
            report.skipped.push(path);
            continue;
        }
        match intake.submit(&path, size, Ingress::Bundle).await {
            Ok(job) => report.submitted.push(SubmittedFile {
                path,
                job_id: job.job_id,
            }),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Bundle file not relayed");
                report.failed.push(FailedFile {
                    path,
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        dir = %dir.display(),
        submitted = report.submitted.len(),
        skipped = report.skipped.len(),
        failed = report.failed.len(),
        "Bundle relay queued"
    );
    Ok(report)
}

/// Regular files under `dir`, sorted by path
async fn collect_files(dir: &Path) -> Result<Vec<(PathBuf, u64)>, IngressError> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        let directory_err = |source| IngressError::Directory {
            path: current.clone(),
            source,
        };
        let mut entries = tokio::fs::read_dir(&current).await.map_err(directory_err)?;
        while let Some(entry) = entries.next_entry().await.map_err(directory_err)? {
            let path = entry.path();
            let metadata = match tokio::fs::metadata(&path).await {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable bundle entry");
                    continue;
                }
            };
            if metadata.is_dir() {
                stack.push(path);
            } else if metadata.is_file() {
                files.push((path, metadata.len()));
            }
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_collect_files_recursive_sorted() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("nested/deeper")).unwrap();
        std::fs::write(root.join("b.bin"), b"b").unwrap();
        std::fs::write(root.join("config.json"), b"{}").unwrap();
        std::fs::write(root.join("nested/a.bin"), b"aa").unwrap();
        std::fs::write(root.join("nested/deeper/c.bin"), b"ccc").unwrap();

        let files = collect_files(root).await.unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|(p, _)| p.strip_prefix(root).unwrap().display().to_string())
            .collect();
        assert_eq!(names, vec!["b.bin", "config.json", "nested/a.bin", "nested/deeper/c.bin"]);
        assert_eq!(files[3].1, 3);
    }

    #[tokio::test]
    async fn test_missing_dir() {
        let err = collect_files(Path::new("/no/such/bundle")).await.unwrap_err();
        assert!(matches!(err, IngressError::Directory { .. }));
    }
}
