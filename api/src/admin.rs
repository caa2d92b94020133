//! Admin CSV upload and reprocessing jobs

use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use lemmario_lib::{export_json, parse_csv, Dataset, RowWarning};
use serde::Serialize;
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Jobs kept for status queries; the least recently touched are forgotten first.
pub const JOB_HISTORY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub job_id: String,
    pub status: JobStatus,
    /// SHA-256 of the uploaded bytes, hex encoded.
    pub checksum: String,
    pub size: usize,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_count: Option<usize>,
    pub warnings: Vec<RowWarning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    fn started(job_id: String, checksum: String, size: usize) -> Self {
        Self {
            job_id,
            status: JobStatus::Processing,
            checksum,
            size,
            started_at: Utc::now(),
            completed_at: None,
            failed_at: None,
            duration_ms: None,
            record_count: None,
            warnings: Vec::new(),
            error: None,
        }
    }

    fn complete(&mut self, record_count: usize, warnings: Vec<RowWarning>) {
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.completed_at = Some(now);
        self.duration_ms = Some((now - self.started_at).num_milliseconds());
        self.record_count = Some(record_count);
        self.warnings = warnings;
    }

    fn fail(&mut self, error: String) {
        self.status = JobStatus::Failed;
        self.failed_at = Some(Utc::now());
        self.error = Some(error);
    }
}

/// In-memory job tracking, bounded to the most recent jobs. Jobs do not
/// survive a restart.
pub struct JobRegistry {
    jobs: Mutex<LruCache<String, Job>>,
}

impl JobRegistry {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { jobs: Mutex::new(LruCache::new(capacity)) }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, Job>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, job_id: &str) -> Option<Job> {
        self.lock().get(job_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn insert(&self, job: Job) {
        if let Some((evicted, _)) = self.lock().push(job.job_id.clone(), job) {
            tracing::debug!(job_id = %evicted, "job evicted from history");
        }
    }

    fn update(&self, job_id: &str, f: impl FnOnce(&mut Job)) {
        if let Some(job) = self.lock().get_mut(job_id) {
            f(job);
        }
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new(JOB_HISTORY)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    success: bool,
    message: &'static str,
    job_id: String,
    status_url: String,
}

/// Parse the CSV, build the new dataset and persist it as `lemmi.json`.
async fn process_upload(state: Arc<AppState>, job_id: String, body: String, checksum: String) {
    tracing::info!(%job_id, "starting CSV processing");

    let built = tokio::task::spawn_blocking(move || {
        let report = parse_csv(body.as_bytes())?;
        let json = export_json(&report.records)?;
        let warnings = report.warnings.clone();
        let dataset = Dataset::from_report(report)?.with_fingerprint(checksum);
        Ok::<_, lemmario_lib::LemmarioError>((dataset, json, warnings))
    })
    .await;

    let outcome = match built {
        Ok(Ok((dataset, json, warnings))) => {
            let path = state.config.lemmi_path();
            let staging = state.config.data_dir.join(format!("lemmi.{job_id}.json.tmp"));
            let _publishing = state.publish_lock.lock().await;
            let written = async {
                tokio::fs::create_dir_all(&state.config.data_dir).await?;
                tokio::fs::write(&staging, json).await?;
                tokio::fs::rename(&staging, &path).await
            }
            .await;
            match written {
                Ok(()) => {
                    let count = dataset.len();
                    state.replace_dataset(dataset);
                    Ok((count, warnings))
                }
                Err(e) => {
                    if let Err(cleanup) = tokio::fs::remove_file(&staging).await {
                        tracing::debug!(path = %staging.display(), error = %cleanup, "no staging file to remove");
                    }
                    Err(format!("Failed to write {}: {e}", path.display()))
                }
            }
        }
        Ok(Err(e)) => Err(e.to_string()),
        Err(e) => Err(format!("processing task failed: {e}")),
    };

    match outcome {
        Ok((count, warnings)) => {
            tracing::info!(%job_id, records = count, warnings = warnings.len(), "CSV processing completed");
            state.jobs.update(&job_id, |job| job.complete(count, warnings));
        }
        Err(error) => {
            tracing::error!(%job_id, %error, "CSV processing failed");
            state.jobs.update(&job_id, |job| job.fail(error));
        }
    }
}

/// Accept a CSV body and reprocess it in the background.
pub async fn upload(State(state): State<Arc<AppState>>, body: String) -> ApiResult<UploadResponse> {
    if !state.allow_upload() {
        tracing::warn!("upload rejected: hourly limit reached");
        return Err(ApiError::TooManyRequests("Too many uploads, please try again later".to_string()));
    }
    if body.trim().is_empty() {
        return Err(ApiError::BadRequest("No file uploaded".to_string()));
    }

    let job_id = Uuid::new_v4().to_string();
    let checksum = hex::encode(Sha256::digest(body.as_bytes()));
    tracing::info!(%job_id, size = body.len(), %checksum, "CSV upload received");

    state.jobs.insert(Job::started(job_id.clone(), checksum.clone(), body.len()));
    tokio::spawn(process_upload(Arc::clone(&state), job_id.clone(), body, checksum));

    Ok(Json(UploadResponse {
        success: true,
        message: "Upload successful, processing started",
        status_url: format!("/api/admin/status/{job_id}"),
        job_id,
    }))
}

pub async fn status(State(state): State<Arc<AppState>>, Path(job_id): Path<String>) -> ApiResult<Job> {
    state
        .jobs
        .get(&job_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Job not found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_lifecycle() {
        let registry = JobRegistry::default();
        registry.insert(Job::started("a".into(), "00".into(), 3));
        assert_eq!(registry.get("a").map(|j| j.status), Some(JobStatus::Processing));

        registry.update("a", |job| job.complete(2, Vec::new()));
        let job = registry.get("a").unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.record_count, Some(2));
        assert!(job.duration_ms.is_some());

        registry.update("a", |job| job.fail("boom".into()));
        assert_eq!(registry.get("a").unwrap().error.as_deref(), Some("boom"));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn job_history_is_bounded() {
        let registry = JobRegistry::new(2);
        registry.insert(Job::started("a".into(), "00".into(), 1));
        registry.insert(Job::started("b".into(), "00".into(), 1));
        assert!(registry.get("a").is_some());
        registry.insert(Job::started("c".into(), "00".into(), 1));

        assert_eq!(registry.len(), 2);
        assert!(registry.get("b").is_none());
        assert!(registry.get("a").is_some());
        assert!(registry.get("c").is_some());

        registry.update("b", |job| job.fail("gone".into()));
        assert!(registry.get("b").is_none());
    }

    #[test]
    fn status_serialises_snake_case() {
        let json = serde_json::to_value(Job::started("a".into(), "00".into(), 3)).unwrap();
        assert_eq!(json["status"], "processing");
        assert_eq!(json["jobId"], "a");
        assert!(json.get("completedAt").is_none());
    }
}
