//! In-memory job store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use adreel_models::{sort_canonical, Job, JobId, Stage, StageName};

use crate::error::{RepositoryError, RepositoryResult};
use crate::store::JobStore;

/// In-memory [`JobStore`] backed by RwLock'd maps.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, Job>>,
    stages: RwLock<HashMap<(String, StageName), Stage>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, job: &Job, stages: &[Stage]) -> RepositoryResult<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(job.id.as_str()) {
            return Err(RepositoryError::AlreadyExists(job.id.to_string()));
        }

        // Both maps are written under the jobs lock, so the job and its
        // stages appear together.
        let mut stage_map = self.stages.write().await;
        jobs.insert(job.id.as_str().to_string(), job.clone());
        for stage in stages {
            stage_map.insert((stage.job_id.as_str().to_string(), stage.name), stage.clone());
        }
        Ok(())
    }

    async fn get_job(&self, job_id: &JobId) -> RepositoryResult<Job> {
        self.jobs
            .read()
            .await
            .get(job_id.as_str())
            .cloned()
            .ok_or_else(|| RepositoryError::JobNotFound(job_id.to_string()))
    }

    async fn update_job(&self, job: &Job) -> RepositoryResult<()> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(job.id.as_str()) {
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            }
            None => Err(RepositoryError::JobNotFound(job.id.to_string())),
        }
    }

    async fn get_stage(&self, job_id: &JobId, name: StageName) -> RepositoryResult<Stage> {
        self.stages
            .read()
            .await
            .get(&(job_id.as_str().to_string(), name))
            .cloned()
            .ok_or_else(|| {
                RepositoryError::StageNotFound(job_id.to_string(), name.as_str().to_string())
            })
    }

    async fn update_stage(&self, stage: &Stage) -> RepositoryResult<()> {
        let mut stages = self.stages.write().await;
        let key = (stage.job_id.as_str().to_string(), stage.name);
        match stages.get_mut(&key) {
            Some(existing) => {
                *existing = stage.clone();
                Ok(())
            }
            None => Err(RepositoryError::StageNotFound(
                stage.job_id.to_string(),
                stage.name.as_str().to_string(),
            )),
        }
    }

    async fn list_stages(&self, job_id: &JobId) -> RepositoryResult<Vec<Stage>> {
        let stages = self.stages.read().await;
        let mut result: Vec<Stage> = stages
            .values()
            .filter(|s| s.job_id == *job_id)
            .cloned()
            .collect();
        sort_canonical(&mut result);
        Ok(result)
    }

    async fn ping(&self) -> RepositoryResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adreel_models::AdBrief;

    fn job_with_stages() -> (Job, Vec<Stage>) {
        let job = Job::new(AdBrief::new("Solar Kettle", "energetic", "Order yours today"));
        let stages = StageName::ALL
            .iter()
            .map(|n| Stage::new(job.id.clone(), *n))
            .collect();
        (job, stages)
    }

    #[tokio::test]
    async fn test_create_and_get_roundtrip() {
        let store = MemoryJobStore::new();
        let (job, stages) = job_with_stages();

        store.create_job(&job, &stages).await.unwrap();

        let fetched = store.get_job(&job.id).await.unwrap();
        assert_eq!(fetched.id, job.id);
        assert_eq!(store.list_stages(&job.id).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_duplicate_create_is_rejected() {
        let store = MemoryJobStore::new();
        let (job, stages) = job_with_stages();

        store.create_job(&job, &stages).await.unwrap();
        let err = store.create_job(&job, &stages).await.unwrap_err();
        assert!(matches!(err, RepositoryError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_list_stages_is_canonically_ordered() {
        let store = MemoryJobStore::new();
        let job = Job::new(AdBrief::new("Solar Kettle", "energetic", "Order yours today"));
        // Insert stages in reverse order.
        let stages: Vec<Stage> = StageName::ALL
            .iter()
            .rev()
            .map(|n| Stage::new(job.id.clone(), *n))
            .collect();
        store.create_job(&job, &stages).await.unwrap();

        let listed = store.list_stages(&job.id).await.unwrap();
        let names: Vec<StageName> = listed.iter().map(|s| s.name).collect();
        assert_eq!(names.as_slice(), &StageName::ALL);
    }

    #[tokio::test]
    async fn test_update_stage_persists() {
        let store = MemoryJobStore::new();
        let (job, stages) = job_with_stages();
        store.create_job(&job, &stages).await.unwrap();

        let started = stages[0].clone().start().with_progress(40);
        store.update_stage(&started).await.unwrap();

        let fetched = store.get_stage(&job.id, StageName::ScriptGen).await.unwrap();
        assert_eq!(fetched.progress, 40);
    }

    #[tokio::test]
    async fn test_missing_job_errors() {
        let store = MemoryJobStore::new();
        let err = store.get_job(&JobId::new()).await.unwrap_err();
        assert!(matches!(err, RepositoryError::JobNotFound(_)));
    }
}
