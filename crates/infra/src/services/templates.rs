use chrono::Utc;
use tracing::{info, instrument};

use stockyard_core::TemplateId;
use stockyard_jobs::{JobTemplate, TemplateHeader, TemplateTask};

use super::{ServiceError, ServiceResult};
use crate::repository::TemplateRepository;
use crate::store::Condition;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTemplate {
    pub name: String,
    pub description: Option<String>,
    pub tasks: Vec<TemplateTask>,
}

#[derive(Clone)]
pub struct TemplateService {
    templates: TemplateRepository,
}

impl TemplateService {
    pub fn new(templates: TemplateRepository) -> Self {
        Self { templates }
    }

    #[instrument(skip(self, input), fields(name = %input.name, tasks = input.tasks.len()))]
    pub async fn create(&self, input: NewTemplate, actor: &str) -> ServiceResult<JobTemplate> {
        let template = JobTemplate::new(
            TemplateId::new(),
            &input.name,
            input.description,
            input.tasks,
            actor,
            Utc::now(),
        )?;
        self.templates.save(&template, Condition::NotExists).await?;
        info!(template_id = %template.id(), "template created");
        Ok(template)
    }

    pub async fn list(&self) -> ServiceResult<Vec<TemplateHeader>> {
        Ok(self.templates.list().await?)
    }

    pub async fn get(&self, id: TemplateId) -> ServiceResult<JobTemplate> {
        self.templates
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("job template {id}")))
    }
}
