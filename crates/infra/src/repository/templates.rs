use std::sync::Arc;

use tracing::instrument;

use stockyard_core::key::{prefix, sort};
use stockyard_core::{PartitionKey, TableKey, TemplateId};
use stockyard_jobs::{JobTemplate, TemplateHeader, TemplateTask};

use crate::services::{ServiceError, ServiceResult};
use crate::store::{Condition, ConditionalPut, KeyedStore, Record, StoreError, TransactOutcome};

/// Job templates: one root record plus one `LINE#` record per task.
#[derive(Clone)]
pub struct TemplateRepository {
    store: Arc<dyn KeyedStore>,
}

impl TemplateRepository {
    pub fn new(store: Arc<dyn KeyedStore>) -> Self {
        Self { store }
    }

    /// Write root and lines in one atomic batch.
    ///
    /// `root_condition` is `NotExists` for fresh ids and `Always` for ids
    /// derived from an uploaded file, which are rewritten on re-ingestion.
    #[instrument(skip(self, template), fields(template_id = %template.id(), tasks = template.tasks.len()))]
    pub async fn save(&self, template: &JobTemplate, root_condition: Condition) -> ServiceResult<()> {
        let id = template.id();
        let mut ops = Vec::with_capacity(template.tasks.len() + 1);
        ops.push(ConditionalPut::new(
            Record::from_value(TableKey::job_template(id), &template.header)?,
            root_condition,
        ));
        for (index, task) in template.tasks.iter().enumerate() {
            ops.push(ConditionalPut::new(
                Record::from_value(TableKey::template_line(id, index as u32 + 1), task)?,
                Condition::Always,
            ));
        }

        match self.store.transact(ops).await? {
            TransactOutcome::Committed { .. } => Ok(()),
            TransactOutcome::ConditionFailed { .. } => {
                Err(ServiceError::Conflict(format!("template {id} already exists")))
            }
        }
    }

    pub async fn get(&self, id: TemplateId) -> Result<Option<JobTemplate>, StoreError> {
        let records = self.store.query(&PartitionKey::job_template(id), None).await?;

        let Some(root) = records.iter().find(|r| r.key.sort.as_str() == sort::ROOT) else {
            return Ok(None);
        };
        let header: TemplateHeader = root.decode()?;

        // A shorter re-ingestion leaves stale trailing lines behind; the
        // root's task_count is authoritative.
        let tasks = records
            .iter()
            .filter(|r| r.key.sort.as_str().starts_with(sort::LINE))
            .take(header.task_count as usize)
            .map(Record::decode::<TemplateTask>)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(JobTemplate::from_parts(header, tasks)))
    }

    pub async fn list(&self) -> Result<Vec<TemplateHeader>, StoreError> {
        let mut headers = self
            .store
            .scan(prefix::JOB_TEMPLATE, Some(sort::ROOT))
            .await?
            .iter()
            .map(Record::decode::<TemplateHeader>)
            .collect::<Result<Vec<_>, _>>()?;
        headers.sort_by(|a, b| a.name.cmp(&b.name).then(a.created_at.cmp(&b.created_at)));
        Ok(headers)
    }
}
