//! Rebuild request and report types exchanged with the service layer.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which items a rebuild run targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RebuildMode {
    /// Re-embed only items that already carry an embedding. Used when
    /// switching embedding models.
    Existing,
    /// Re-embed everything with embeddable content, including items that
    /// were never embedded.
    All,
}

/// Immutable rebuild request. At least one include flag must be set; the
/// engine rejects the request before creating a job otherwise.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RebuildRequest {
    pub mode: RebuildMode,
    #[serde(default = "default_true")]
    pub include_sources: bool,
    #[serde(default = "default_true")]
    pub include_notes: bool,
    #[serde(default = "default_true")]
    pub include_insights: bool,
}

impl RebuildRequest {
    pub fn selects_nothing(&self) -> bool {
        !self.include_sources && !self.include_notes && !self.include_insights
    }
}

fn default_true() -> bool {
    true
}

/// Returned immediately by `submit_rebuild`; the run continues in the
/// background while the caller polls by job id.
#[derive(Debug, Clone, Serialize)]
pub struct RebuildAccepted {
    pub job_id: String,
    pub estimated_items: usize,
}

/// The three embeddable content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Source,
    Note,
    Insight,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Source => "source",
            ItemKind::Note => "note",
            ItemKind::Insight => "insight",
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a synchronous single-item embed. Item-level failures are
/// reported in the struct rather than as an `Err`; one invocation always
/// yields exactly one report.
#[derive(Debug, Clone)]
pub struct SingleEmbedReport {
    pub success: bool,
    pub item_id: String,
    pub item_kind: ItemKind,
    /// Chunks written; only meaningful for sources, zero otherwise.
    pub chunks_created: usize,
    pub elapsed: Duration,
    pub error_message: Option<String>,
}
