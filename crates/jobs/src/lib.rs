//! Jobs domain module.
//!
//! Job records and their sync state against the external job system, job
//! templates (tasks + materials), and the append-only job history.

pub mod history;
pub mod job;
pub mod template;

pub use history::{HistoryAction, JobHistoryEntry};
pub use job::{ExternalJobId, JobRecord, NewJob, SyncState};
pub use template::{JobTemplate, Material, TemplateHeader, TemplateSource, TemplateTask};
