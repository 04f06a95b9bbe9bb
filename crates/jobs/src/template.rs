use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockyard_core::{DomainError, DomainResult, ItemId, TemplateId};

pub const MAX_TEMPLATE_TASKS: usize = 500;
const MAX_NAME_LEN: usize = 255;

/// An inventory item a task is expected to consume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Material {
    pub item_id: ItemId,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateTask {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub estimated_minutes: u32,
    #[serde(default)]
    pub materials: Vec<Material>,
}

impl TemplateTask {
    pub fn validate(&self) -> DomainResult<()> {
        check_name("task name", &self.name)?;
        for m in &self.materials {
            if m.quantity <= 0 {
                return Err(DomainError::validation(format!(
                    "material {} must have a positive quantity",
                    m.item_id
                )));
            }
        }
        Ok(())
    }
}

/// Where a template came from when it was materialised from an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSource {
    pub bucket: String,
    pub key: String,
}

/// Template root record. Tasks live in separate line records of the same partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateHeader {
    pub template_id: TemplateId,
    pub name: String,
    pub description: Option<String>,
    pub task_count: u32,
    pub source: Option<TemplateSource>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// A reusable job template: a named, ordered list of tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTemplate {
    #[serde(flatten)]
    pub header: TemplateHeader,
    pub tasks: Vec<TemplateTask>,
}

impl JobTemplate {
    pub fn new(
        template_id: TemplateId,
        name: &str,
        description: Option<String>,
        tasks: Vec<TemplateTask>,
        created_by: &str,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let name = check_name("template name", name)?;
        if tasks.is_empty() {
            return Err(DomainError::validation("template needs at least one task"));
        }
        if tasks.len() > MAX_TEMPLATE_TASKS {
            return Err(DomainError::validation(format!(
                "template has more than {MAX_TEMPLATE_TASKS} tasks"
            )));
        }
        for task in &tasks {
            task.validate()?;
        }

        Ok(Self {
            header: TemplateHeader {
                template_id,
                name,
                description: description.filter(|d| !d.trim().is_empty()),
                task_count: tasks.len() as u32,
                source: None,
                created_by: created_by.to_string(),
                created_at,
            },
            tasks,
        })
    }

    pub fn with_source(mut self, bucket: &str, key: &str) -> Self {
        self.header.source = Some(TemplateSource {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
        self
    }

    pub fn id(&self) -> TemplateId {
        self.header.template_id
    }

    /// Reassemble from a root record and its ordered line records.
    pub fn from_parts(header: TemplateHeader, tasks: Vec<TemplateTask>) -> Self {
        Self { header, tasks }
    }
}

pub(crate) fn check_name(what: &str, raw: &str) -> DomainResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{what} cannot be empty")));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(DomainError::validation(format!(
            "{what} longer than {MAX_NAME_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}
