use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use stockyard_core::{ItemId, TemplateId};
use stockyard_events::ObjectCreated;
use stockyard_jobs::{JobTemplate, Material, TemplateTask};

use super::table::{CsvRow, parse_csv};
use super::{FileFormat, IngestError, ParseError, ParsedFile, ParsedRow, RowTally, row_failure};
use crate::repository::TemplateRepository;
use crate::retry::RetryPolicy;
use crate::services::ServiceError;
use crate::store::Condition;

const REQUIRED: &[&str] = &["template", "task"];

/// Recorded as `created_by` on templates materialised from a file.
pub const FILE_IMPORT_ACTOR: &str = "file-import";

/// One line of a template file: the task and the template it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRow {
    pub template: String,
    pub task: TemplateTask,
}

/// Job-template spreadsheet:
/// `template,task[,description,estimated_minutes,item,quantity]`.
#[derive(Clone)]
pub struct TemplateFormat {
    templates: TemplateRepository,
}

impl TemplateFormat {
    pub fn new(templates: TemplateRepository) -> Self {
        Self { templates }
    }
}

fn parse_row(row: &CsvRow<'_>) -> Result<TemplateRow, String> {
    let template = row.required("template")?.to_string();
    let name = row.required("task")?.to_string();

    let estimated_minutes = match row.non_negative("estimated_minutes")? {
        Some(m) => u32::try_from(m).map_err(|_| "estimated_minutes is too large".to_string())?,
        None => 0,
    };

    let materials = match (row.get("item"), row.integer("quantity")?) {
        (None, None) => vec![],
        (None, Some(_)) => return Err("quantity given without an item".to_string()),
        (Some(_), None) => return Err("quantity is required when item is set".to_string()),
        (Some(_), Some(q)) if q <= 0 => return Err("quantity must be positive".to_string()),
        (Some(item), Some(quantity)) => vec![Material {
            item_id: ItemId::parse(item).map_err(|e| e.to_string())?,
            quantity,
        }],
    };

    let task = TemplateTask {
        name,
        description: row.get("description").map(str::to_string),
        estimated_minutes,
        materials,
    };
    task.validate().map_err(|e| e.to_string())?;

    Ok(TemplateRow { template, task })
}

/// Rows grouped by template name, in order of first appearance.
fn group(rows: Vec<ParsedRow<TemplateRow>>) -> Vec<(String, Vec<ParsedRow<TemplateTask>>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<ParsedRow<TemplateTask>>)> = Vec::new();

    for ParsedRow { row, value } in rows {
        let slot = *index.entry(value.template.clone()).or_insert_with(|| {
            groups.push((value.template.clone(), Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(ParsedRow {
            row,
            value: value.task,
        });
    }
    groups
}

#[async_trait]
impl FileFormat for TemplateFormat {
    type Row = TemplateRow;

    fn name(&self) -> &'static str {
        "templates"
    }

    fn parse(&self, data: &[u8]) -> ParsedFile<TemplateRow> {
        parse_csv(data, REQUIRED, parse_row)
    }

    /// One atomic batch per template; its rows succeed or fail together.
    async fn write(
        &self,
        source: &ObjectCreated,
        rows: Vec<ParsedRow<TemplateRow>>,
        retry: &RetryPolicy,
    ) -> Result<RowTally, IngestError> {
        let templates = &self.templates;
        let mut tally = RowTally::default();

        for (name, lines) in group(rows) {
            let row_numbers: Vec<u32> = lines.iter().map(|l| l.row).collect();
            let tasks = lines.into_iter().map(|l| l.value).collect();
            let id = TemplateId::derived(&source.bucket, &source.key, &name);

            let saved = match JobTemplate::new(id, &name, None, tasks, FILE_IMPORT_ACTOR, Utc::now()) {
                Ok(t) => {
                    let template = &t.with_source(&source.bucket, &source.key);
                    retry
                        .run("save template", ServiceError::is_transient, move || async move {
                            templates.save(template, Condition::Always).await
                        })
                        .await
                }
                Err(e) => Err(ServiceError::from(e)),
            };

            match saved {
                Ok(()) => {
                    debug!(template = %name, %id, tasks = row_numbers.len(), "template saved");
                    tally.success += row_numbers.len() as u32;
                }
                Err(e) => {
                    let message = row_failure(e)?;
                    tally.errors.extend(
                        row_numbers
                            .into_iter()
                            .map(|row| ParseError::new(row, format!("template {name:?}: {message}"))),
                    );
                }
            }
        }

        Ok(tally)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::store::InMemoryKeyedStore;

    fn format() -> (TemplateFormat, TemplateRepository) {
        let repo = TemplateRepository::new(Arc::new(InMemoryKeyedStore::new()));
        (TemplateFormat::new(repo.clone()), repo)
    }

    #[test]
    fn material_columns_must_come_together() {
        let (f, _) = format();
        let parsed = f.parse(
            b"template,task,item,quantity,estimated_minutes\n\
              T,a,BOLT,2,15\n\
              T,b,BOLT,,\n\
              T,c,,3,\n\
              T,d,BOLT,0,\n\
              T,e,,,\n",
        );

        let ok: Vec<_> = parsed.rows.iter().map(|r| r.value.task.name.as_str()).collect();
        assert_eq!(ok, vec!["a", "e"]);
        assert_eq!(parsed.rows[0].value.task.estimated_minutes, 15);
        assert_eq!(parsed.errors.len(), 3);
    }

    #[test]
    fn grouping_keeps_first_appearance_order() {
        let rows = ["B", "A", "B"]
            .iter()
            .enumerate()
            .map(|(i, t)| ParsedRow {
                row: i as u32 + 1,
                value: TemplateRow {
                    template: t.to_string(),
                    task: TemplateTask {
                        name: format!("task {i}"),
                        description: None,
                        estimated_minutes: 0,
                        materials: vec![],
                    },
                },
            })
            .collect();

        let groups = group(rows);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "B");
        assert_eq!(groups[0].1.iter().map(|r| r.row).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[tokio::test]
    async fn reingesting_the_same_file_rewrites_the_same_template() {
        let (f, repo) = format();
        let event = ObjectCreated::new("template-uploads", "uploads/1/t.csv", 0, "v");
        let data = b"template,task\nService,Inspect\nService,Clean\n";

        for _ in 0..2 {
            let parsed = f.parse(data);
            let tally = f.write(&event, parsed.rows, &RetryPolicy::no_retry()).await.unwrap();
            assert_eq!(tally.success, 2);
        }

        let headers = repo.list().await.unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].created_by, FILE_IMPORT_ACTOR);
        assert_eq!(headers[0].source.as_ref().unwrap().key, "uploads/1/t.csv");
    }
}
