/// Actor recorded when the gateway forwards no caller.
pub const ANONYMOUS: &str = "anonymous";

/// Verified caller forwarded by the gateway, as a request extension.
///
/// Recorded as the actor on stock movements and job history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    actor: String,
}

impl CallerContext {
    pub fn new(actor: impl Into<String>) -> Self {
        Self { actor: actor.into() }
    }

    pub fn anonymous() -> Self {
        Self::new(ANONYMOUS)
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }
}
