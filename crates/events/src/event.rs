use chrono::{DateTime, Utc};

/// Metadata shared by every fact this system records or publishes.
///
/// Stock movements and blob notifications both implement it, so logging and
/// transport code can name an event without knowing its payload.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted `<area>.<subject>.<verb>` name, e.g. `blob.object.created`.
    fn event_type(&self) -> &'static str;

    /// Bumped whenever the serialized shape changes.
    fn schema_version(&self) -> u32 {
        1
    }

    /// Business time of the fact.
    fn occurred_at(&self) -> DateTime<Utc>;

    /// `event_type@vN`, the form written to logs.
    fn label(&self) -> String {
        format!("{}@v{}", self.event_type(), self.schema_version())
    }
}
