use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use stockyard_core::JobId;
use stockyard_jobs::{ExternalJobId, HistoryAction, JobHistoryEntry, JobRecord, NewJob};

use super::{ServiceError, ServiceResult};
use crate::config::ConfigProvider;
use crate::repository::{JobRepository, TemplateRepository};
use crate::wfm::{JobSyncClient, WfmJobRequest};

/// How long a sync claim keeps other callers off a job. Outlasts the WFM
/// client's own timeouts and retries.
pub const SYNC_LEASE_SECS: i64 = 300;

/// Result of `create`: the stored job and whether it reached WFM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobCreated {
    pub job: JobRecord,
    pub synced: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub examined: u32,
    pub synced: u32,
    pub still_pending: u32,
}

/// Job creation and WFM synchronisation.
#[derive(Clone)]
pub struct JobService {
    jobs: JobRepository,
    templates: TemplateRepository,
    sync: Arc<dyn JobSyncClient>,
    config: Arc<dyn ConfigProvider>,
}

impl JobService {
    pub fn new(
        jobs: JobRepository,
        templates: TemplateRepository,
        sync: Arc<dyn JobSyncClient>,
        config: Arc<dyn ConfigProvider>,
    ) -> Self {
        Self {
            jobs,
            templates,
            sync,
            config,
        }
    }

    /// Store a pending job, then try once to create it in WFM.
    ///
    /// The job is stored already claimed, so `reconcile` leaves it alone
    /// while the call is in flight. A sync failure is not an error: the job
    /// stays pending with the failure recorded, and `reconcile` picks it up later.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, mut input: NewJob, actor: &str) -> ServiceResult<JobCreated> {
        input.validate()?;

        let template = match input.template_id {
            Some(id) => Some(
                self.templates
                    .get(id)
                    .await?
                    .ok_or_else(|| ServiceError::not_found(format!("job template {id}")))?,
            ),
            None => None,
        };

        let defaults = self.config.app_config().await?;
        input.client_id = non_blank(input.client_id).or(defaults.wfm_client_id);
        input.category = non_blank(input.category).or(defaults.default_category);

        let now = Utc::now();
        let mut job = JobRecord::create(JobId::new(), input, actor, now)?;
        if let Some(template) = &template {
            job.apply_template(template)?;
        }
        job.claim_sync(now);

        let created = JobHistoryEntry::new(job.job_id, HistoryAction::Created, actor, now);
        let version = self.jobs.insert(&job, &created).await?;
        info!(job_id = %job.job_id, "job stored as pending");

        let (job, _) = self
            .attempt_sync(job, version, actor, &defaults.job_name_prefix)
            .await?;
        let synced = !job.is_pending();
        Ok(JobCreated { job, synced })
    }

    /// Retry every pending job, adopting WFM jobs that already carry our
    /// client reference instead of creating duplicates.
    ///
    /// Jobs under a live sync claim are counted as still pending and not
    /// touched; their owner writes the outcome.
    #[instrument(skip(self))]
    pub async fn reconcile(&self, actor: &str) -> ServiceResult<ReconcileReport> {
        let pending = self.jobs.pending().await?;
        let mut report = ReconcileReport {
            examined: pending.len() as u32,
            ..ReconcileReport::default()
        };

        let lease = Duration::seconds(SYNC_LEASE_SECS);
        let now = Utc::now();
        let (in_flight, pending): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .partition(|stored| stored.value.has_live_claim(lease, now));
        for stored in &in_flight {
            debug!(job_id = %stored.value.job_id, "sync already in flight, skipping");
        }
        report.still_pending += in_flight.len() as u32;
        if pending.is_empty() {
            return Ok(report);
        }

        let defaults = self.config.app_config().await?;
        let remote: HashMap<String, String> = self
            .sync
            .list_current_jobs()
            .await?
            .into_iter()
            .filter_map(|j| j.client_reference.map(|r| (r, j.id)))
            .collect();

        for stored in pending {
            let mut job = stored.value;
            let job_id = job.job_id;

            let outcome = match remote.get(&job.client_reference()) {
                Some(raw) => match ExternalJobId::parse(raw) {
                    Ok(external_id) => {
                        let now = Utc::now();
                        job.mark_synced(external_id.clone(), now);
                        let entry = JobHistoryEntry::new(job_id, HistoryAction::Reconciled, actor, now)
                            .with_external_id(external_id);
                        self.jobs.update(&job, stored.version, &entry).await.map(|_| true)
                    }
                    Err(e) => {
                        warn!(%job_id, external_id = %raw, error = %e, "ignoring malformed external id");
                        self.claim_and_sync(job, stored.version, actor, &defaults.job_name_prefix)
                            .await
                    }
                },
                None => {
                    self.claim_and_sync(job, stored.version, actor, &defaults.job_name_prefix)
                        .await
                }
            };

            match outcome {
                Ok(true) => report.synced += 1,
                Ok(false) => report.still_pending += 1,
                // Someone else moved the job on; it is theirs to finish.
                Err(ServiceError::Conflict(msg)) => {
                    warn!(%job_id, %msg, "job changed during reconcile");
                    report.still_pending += 1;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            examined = report.examined,
            synced = report.synced,
            still_pending = report.still_pending,
            "reconcile finished"
        );
        Ok(report)
    }

    /// Claim a job loaded at `version`, then call WFM for it. A lost claim
    /// surfaces as a conflict before anything is sent.
    async fn claim_and_sync(
        &self,
        mut job: JobRecord,
        version: u64,
        actor: &str,
        name_prefix: &str,
    ) -> ServiceResult<bool> {
        job.claim_sync(Utc::now());
        let version = self.jobs.claim(&job, version).await?;
        let (job, _) = self.attempt_sync(job, version, actor, name_prefix).await?;
        Ok(!job.is_pending())
    }

    /// One create call against a job this caller has claimed, with the
    /// outcome written back to the job root and its history. Returns the
    /// job and its new version.
    async fn attempt_sync(
        &self,
        mut job: JobRecord,
        version: u64,
        actor: &str,
        name_prefix: &str,
    ) -> ServiceResult<(JobRecord, u64)> {
        let request = WfmJobRequest {
            name: format!("{name_prefix}{}", job.name),
            description: job.description.clone(),
            client_id: job.client_id.clone(),
            category: job.category.clone(),
            start_date: job.start_date,
            due_date: job.due_date,
            client_reference: job.client_reference(),
        };

        let now = Utc::now();
        let entry = match self.sync.create_job(&request).await {
            Ok(external_id) => {
                info!(job_id = %job.job_id, %external_id, "job synced");
                job.mark_synced(external_id.clone(), now);
                JobHistoryEntry::new(job.job_id, HistoryAction::Synced, actor, now)
                    .with_external_id(external_id)
            }
            Err(e) => {
                let detail = format!("{}: {e}", e.kind());
                warn!(job_id = %job.job_id, error = %detail, "job sync failed");
                job.mark_sync_failed(detail.clone(), now);
                JobHistoryEntry::new(job.job_id, HistoryAction::SyncFailed, actor, now)
                    .with_detail(detail)
            }
        };

        let version = self.jobs.update(&job, version, &entry).await?;
        Ok((job, version))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use stockyard_core::TemplateId;
    use stockyard_jobs::{JobTemplate, SyncState, TemplateTask};

    use crate::config::{AppConfig, StaticConfigProvider};
    use crate::store::{Condition, InMemoryKeyedStore};
    use crate::wfm::{SyncError, WfmJob};

    #[derive(Default)]
    struct FakeWfm {
        latency: Mutex<std::time::Duration>,
        fail_with: Mutex<Option<SyncError>>,
        existing: Mutex<Vec<WfmJob>>,
        created: Mutex<Vec<WfmJobRequest>>,
    }

    #[async_trait]
    impl JobSyncClient for FakeWfm {
        async fn create_job(&self, request: &WfmJobRequest) -> Result<ExternalJobId, SyncError> {
            let latency = *self.latency.lock().unwrap();
            tokio::time::sleep(latency).await;
            if let Some(e) = self.fail_with.lock().unwrap().clone() {
                return Err(e);
            }
            let mut created = self.created.lock().unwrap();
            created.push(request.clone());
            Ok(ExternalJobId::parse(&format!("J{:03}", created.len())).unwrap())
        }

        async fn list_current_jobs(&self) -> Result<Vec<WfmJob>, SyncError> {
            Ok(self.existing.lock().unwrap().clone())
        }
    }

    struct Fixture {
        service: JobService,
        jobs: JobRepository,
        templates: TemplateRepository,
        wfm: Arc<FakeWfm>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryKeyedStore::new());
        let jobs = JobRepository::new(store.clone());
        let templates = TemplateRepository::new(store);
        let wfm = Arc::new(FakeWfm::default());
        let config = StaticConfigProvider::new(AppConfig {
            wfm_client_id: Some("C-9".into()),
            default_category: Some("Service".into()),
            job_name_prefix: "SY-".into(),
            low_stock_default: None,
        });
        let service = JobService::new(jobs.clone(), templates.clone(), wfm.clone(), Arc::new(config));
        Fixture {
            service,
            jobs,
            templates,
            wfm,
        }
    }

    fn new_job(name: &str) -> NewJob {
        NewJob {
            name: name.to_string(),
            description: None,
            client_id: None,
            category: Some("Install".into()),
            start_date: None,
            due_date: None,
            template_id: None,
        }
    }

    fn unavailable() -> SyncError {
        SyncError::ExternalUnavailable("503 from upstream".into())
    }

    #[tokio::test]
    async fn successful_sync_stores_external_id_and_history() {
        let f = fixture();
        let created = f.service.create(new_job("Boiler swap"), "alice").await.unwrap();

        assert!(created.synced);
        assert_eq!(created.job.sync_state(), SyncState::Synced);
        assert_eq!(created.job.external_id().unwrap().as_str(), "J001");

        let sent = f.wfm.created.lock().unwrap()[0].clone();
        assert_eq!(sent.name, "SY-Boiler swap");
        assert_eq!(sent.client_id.as_deref(), Some("C-9"));
        assert_eq!(sent.category.as_deref(), Some("Install"));
        assert_eq!(sent.client_reference, created.job.job_id.to_string());

        let history = f.jobs.history(created.job.job_id).await.unwrap();
        let actions: Vec<_> = history.iter().map(|h| h.action).collect();
        assert_eq!(actions, vec![HistoryAction::Created, HistoryAction::Synced]);
        assert!(history.iter().all(|h| h.actor == "alice"));
    }

    #[tokio::test]
    async fn failed_sync_leaves_job_pending_with_error() {
        let f = fixture();
        *f.wfm.fail_with.lock().unwrap() = Some(unavailable());

        let created = f.service.create(new_job("Boiler swap"), "bob").await.unwrap();
        assert!(!created.synced);

        let stored = f.jobs.get(created.job.job_id).await.unwrap().unwrap().value;
        assert!(stored.is_pending());
        assert!(stored.external_id().is_none());
        assert!(stored.last_sync_error.as_deref().unwrap().starts_with("external_unavailable:"));

        let history = f.jobs.history(stored.job_id).await.unwrap();
        assert_eq!(history.last().unwrap().action, HistoryAction::SyncFailed);
    }

    #[tokio::test]
    async fn invalid_input_writes_nothing() {
        let f = fixture();
        let err = f.service.create(new_job("   "), "a").await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
        assert!(f.jobs.all_history(10).await.unwrap().is_empty());
        assert!(f.wfm.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn template_tasks_are_copied_and_unknown_templates_404() {
        let f = fixture();
        let template = JobTemplate::new(
            TemplateId::new(),
            "Service",
            None,
            vec![TemplateTask {
                name: "Inspect".into(),
                description: None,
                estimated_minutes: 30,
                materials: vec![],
            }],
            "a",
            Utc::now(),
        )
        .unwrap();
        f.templates.save(&template, Condition::NotExists).await.unwrap();

        let mut input = new_job("Annual service");
        input.template_id = Some(template.id());
        let created = f.service.create(input, "a").await.unwrap();
        assert_eq!(created.job.tasks.len(), 1);

        let mut missing = new_job("Other");
        missing.template_id = Some(TemplateId::new());
        assert!(matches!(
            f.service.create(missing, "a").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn reconcile_adopts_existing_and_recreates_missing() {
        let f = fixture();
        *f.wfm.fail_with.lock().unwrap() = Some(unavailable());
        let adopted = f.service.create(new_job("One"), "a").await.unwrap().job;
        let recreated = f.service.create(new_job("Two"), "a").await.unwrap().job;

        // WFM got the first job even though we never saw the response.
        f.wfm.existing.lock().unwrap().push(WfmJob {
            id: "J777".into(),
            name: Some("SY-One".into()),
            client_reference: Some(adopted.client_reference()),
            state: None,
        });
        *f.wfm.fail_with.lock().unwrap() = None;

        let report = f.service.reconcile("ops").await.unwrap();
        assert_eq!(
            report,
            ReconcileReport {
                examined: 2,
                synced: 2,
                still_pending: 0
            }
        );

        let one = f.jobs.get(adopted.job_id).await.unwrap().unwrap().value;
        assert_eq!(one.external_id().unwrap().as_str(), "J777");
        assert_eq!(
            f.jobs.history(adopted.job_id).await.unwrap().last().unwrap().action,
            HistoryAction::Reconciled
        );

        let two = f.jobs.get(recreated.job_id).await.unwrap().unwrap().value;
        assert_eq!(two.external_id().unwrap().as_str(), "J001");
        assert_eq!(f.wfm.created.lock().unwrap().len(), 1);

        let again = f.service.reconcile("ops").await.unwrap();
        assert_eq!(again, ReconcileReport::default());
    }

    #[tokio::test]
    async fn reconcile_counts_jobs_that_still_fail() {
        let f = fixture();
        *f.wfm.fail_with.lock().unwrap() = Some(unavailable());
        let job = f.service.create(new_job("One"), "a").await.unwrap().job;

        let report = f.service.reconcile("ops").await.unwrap();
        assert_eq!(report.still_pending, 1);

        let stored = f.jobs.get(job.job_id).await.unwrap().unwrap().value;
        assert_eq!(stored.sync_attempts, 2);
    }

    #[tokio::test]
    async fn reconcile_leaves_in_flight_creates_alone() {
        let f = fixture();
        *f.wfm.latency.lock().unwrap() = std::time::Duration::from_millis(100);

        let service = f.service.clone();
        let create = tokio::spawn(async move { service.create(new_job("Slow"), "a").await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let report = f.service.reconcile("ops").await.unwrap();
        assert_eq!(
            report,
            ReconcileReport {
                examined: 1,
                synced: 0,
                still_pending: 1
            }
        );

        let created = create.await.unwrap().unwrap();
        assert!(created.synced);
        assert_eq!(f.wfm.created.lock().unwrap().len(), 1);
        assert!(created.job.sync_claimed_at().is_none());
    }

    #[tokio::test]
    async fn reconcile_takes_over_abandoned_claims() {
        let f = fixture();
        let long_ago = Utc::now() - Duration::seconds(SYNC_LEASE_SECS + 60);
        let mut job = JobRecord::create(JobId::new(), new_job("Crashed"), "a", long_ago).unwrap();
        job.claim_sync(long_ago);
        f.jobs
            .insert(&job, &JobHistoryEntry::new(job.job_id, HistoryAction::Created, "a", long_ago))
            .await
            .unwrap();

        let report = f.service.reconcile("ops").await.unwrap();
        assert_eq!(report.synced, 1);

        let stored = f.jobs.get(job.job_id).await.unwrap().unwrap().value;
        assert_eq!(stored.external_id().unwrap().as_str(), "J001");
        assert!(stored.sync_claimed_at().is_none());
    }
}
