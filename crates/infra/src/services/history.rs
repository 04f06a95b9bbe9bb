use stockyard_core::JobId;
use stockyard_jobs::JobHistoryEntry;

use super::{ServiceError, ServiceResult};
use crate::repository::JobRepository;

pub const DEFAULT_HISTORY_LIMIT: usize = 100;
pub const MAX_HISTORY_LIMIT: usize = 1000;

#[derive(Clone)]
pub struct HistoryService {
    jobs: JobRepository,
}

impl HistoryService {
    pub fn new(jobs: JobRepository) -> Self {
        Self { jobs }
    }

    /// Entries of one job, oldest first.
    pub async fn for_job(&self, job_id: JobId) -> ServiceResult<Vec<JobHistoryEntry>> {
        if self.jobs.get(job_id).await?.is_none() {
            return Err(ServiceError::not_found(format!("job {job_id}")));
        }
        Ok(self.jobs.history(job_id).await?)
    }

    /// Entries across all jobs, newest first. Limits above the maximum are clamped.
    pub async fn recent(&self, limit: Option<usize>) -> ServiceResult<Vec<JobHistoryEntry>> {
        let limit = match limit {
            None => DEFAULT_HISTORY_LIMIT,
            Some(0) => return Err(ServiceError::validation("limit must be at least 1")),
            Some(n) => n.min(MAX_HISTORY_LIMIT),
        };
        Ok(self.jobs.all_history(limit).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use stockyard_jobs::{HistoryAction, JobRecord, NewJob};

    use crate::store::InMemoryKeyedStore;

    async fn seeded(jobs: usize) -> (HistoryService, Vec<JobId>) {
        let repo = JobRepository::new(Arc::new(InMemoryKeyedStore::new()));
        let start = Utc::now();
        let mut ids = Vec::new();
        for i in 0..jobs {
            let at = start + Duration::seconds(i as i64);
            let job = JobRecord::create(
                JobId::new(),
                NewJob {
                    name: format!("job {i}"),
                    description: None,
                    client_id: None,
                    category: None,
                    start_date: None,
                    due_date: None,
                    template_id: None,
                },
                "a",
                at,
            )
            .unwrap();
            let entry = stockyard_jobs::JobHistoryEntry::new(job.job_id, HistoryAction::Created, "a", at);
            repo.insert(&job, &entry).await.unwrap();
            ids.push(job.job_id);
        }
        (HistoryService::new(repo), ids)
    }

    #[tokio::test]
    async fn recent_is_newest_first_and_bounded() {
        let (svc, ids) = seeded(3).await;

        let all = svc.recent(None).await.unwrap();
        assert_eq!(all.iter().map(|e| e.job_id).collect::<Vec<_>>(), vec![ids[2], ids[1], ids[0]]);

        assert_eq!(svc.recent(Some(2)).await.unwrap().len(), 2);
        assert_eq!(svc.recent(Some(5000)).await.unwrap().len(), 3);
        assert!(matches!(svc.recent(Some(0)).await, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn per_job_history_requires_the_job() {
        let (svc, ids) = seeded(1).await;
        assert_eq!(svc.for_job(ids[0]).await.unwrap().len(), 1);
        assert!(matches!(svc.for_job(JobId::new()).await, Err(ServiceError::NotFound(_))));
    }
}
