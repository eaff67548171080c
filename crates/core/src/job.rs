//! Tool job model, resource keys and the job state machine.
//!
//! A job is one run of an analysis tool against a target. The tools
//! themselves are opaque here; only their identity matters, because the
//! `(target, tool, mode)` triple is what deduplication is keyed on.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{AgentId, JobId, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum length of a target identifier.
pub const MAX_TARGET_LEN: usize = 128;

/// Allowed characters in a target identifier. `:` is reserved as the
/// resource key separator.
pub const TARGET_PATTERN: &str = r"^[A-Za-z0-9_.\-]+$";

static TARGET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(TARGET_PATTERN).expect("valid regex"));

// ---------------------------------------------------------------------------
// Tool / mode
// ---------------------------------------------------------------------------

/// Analysis tool a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    Photostats,
    PhotoPairing,
    PipelineValidation,
}

impl Tool {
    pub fn as_str(self) -> &'static str {
        match self {
            Tool::Photostats => "photostats",
            Tool::PhotoPairing => "photo_pairing",
            Tool::PipelineValidation => "pipeline_validation",
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tool {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [Tool::Photostats, Tool::PhotoPairing, Tool::PipelineValidation]
            .into_iter()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown tool: \"{s}\"")))
    }
}

/// Execution mode of a tool run.
///
/// `DisplayGraph` runs pipeline validation against a pipeline definition
/// rather than a collection, so its target is a pipeline identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolMode {
    #[default]
    Collection,
    DisplayGraph,
}

impl ToolMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolMode::Collection => "collection",
            ToolMode::DisplayGraph => "display_graph",
        }
    }
}

impl fmt::Display for ToolMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ToolMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "collection" => Ok(ToolMode::Collection),
            "display_graph" => Ok(ToolMode::DisplayGraph),
            other => Err(CoreError::Validation(format!("Unknown mode: \"{other}\""))),
        }
    }
}

// ---------------------------------------------------------------------------
// Resource key
// ---------------------------------------------------------------------------

/// Canonical dedup key: `<target>:<tool>`, with `:<mode>` appended for any
/// non-default mode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKey(String);

impl ResourceKey {
    pub fn new(target: &str, tool: Tool, mode: ToolMode) -> Self {
        match mode {
            ToolMode::Collection => Self(format!("{target}:{tool}")),
            other => Self(format!("{target}:{tool}:{other}")),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wrap an already canonical key, e.g. one read back from storage.
    pub fn from_canonical(key: String) -> Self {
        Self(key)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Scheduled,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Scheduled,
        JobStatus::Queued,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    /// Statuses that hold the resource key.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            JobStatus::Scheduled | JobStatus::Queued | JobStatus::Running
        )
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    /// Only jobs no worker has claimed yet may be cancelled.
    pub fn is_cancellable(self) -> bool {
        matches!(self, JobStatus::Scheduled | JobStatus::Queued)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Scheduled => "scheduled",
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown job status: \"{s}\"")))
    }
}

/// Allowed status transitions.
pub mod state_machine {
    use super::JobStatus;

    /// Returns the set of statuses reachable from `from`.
    ///
    /// `Running -> Queued` is the release path for a claim whose hand-off
    /// to the worker failed; it is not a retry.
    pub fn valid_transitions(from: JobStatus) -> &'static [JobStatus] {
        match from {
            JobStatus::Scheduled => &[JobStatus::Queued, JobStatus::Cancelled],
            JobStatus::Queued => &[JobStatus::Running, JobStatus::Cancelled],
            JobStatus::Running => &[JobStatus::Completed, JobStatus::Failed, JobStatus::Queued],
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => &[],
        }
    }

    pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
        valid_transitions(from).contains(&to)
    }

    /// Validate a transition, returning a readable message for invalid ones.
    pub fn validate_transition(from: JobStatus, to: JobStatus) -> Result<(), String> {
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(format!("Invalid transition: {from} -> {to}"))
        }
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// Public view of a job, as returned by the API and pushed on channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub resource_key: ResourceKey,
    pub target: String,
    pub tool: Tool,
    pub mode: Option<ToolMode>,
    pub status: JobStatus,
    /// 1-based rank among queued jobs. `None` unless `status == queued`.
    pub position: Option<u32>,
    pub scheduled_for: Option<Timestamp>,
    pub created_at: Timestamp,
    pub queued_at: Option<Timestamp>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub progress: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub result_ref: Option<String>,
    pub agent_id: Option<AgentId>,
}

/// Request body for `POST /api/v1/jobs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJob {
    /// Collection identifier, or pipeline identifier in `display_graph` mode.
    pub target: String,
    pub tool: Tool,
    pub mode: Option<ToolMode>,
    pub scheduled_for: Option<Timestamp>,
}

impl SubmitJob {
    /// Check target syntax and tool/mode compatibility.
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_target(&self.target)?;
        if self.mode == Some(ToolMode::DisplayGraph) && self.tool != Tool::PipelineValidation {
            return Err(CoreError::Validation(format!(
                "Mode \"display_graph\" is only supported by pipeline_validation, not {}",
                self.tool
            )));
        }
        Ok(())
    }

    pub fn resource_key(&self) -> ResourceKey {
        ResourceKey::new(&self.target, self.tool, self.mode.unwrap_or_default())
    }
}

/// Validate a target identifier.
///
/// Rules:
/// - Must not be empty.
/// - Must not exceed `MAX_TARGET_LEN` characters.
/// - Only alphanumeric, hyphen, underscore or dot characters.
pub fn validate_target(target: &str) -> Result<(), CoreError> {
    if target.is_empty() {
        return Err(CoreError::Validation("Target must not be empty".to_string()));
    }
    if target.len() > MAX_TARGET_LEN {
        return Err(CoreError::Validation(format!(
            "Target must not exceed {MAX_TARGET_LEN} characters"
        )));
    }
    if !TARGET_RE.is_match(target) {
        return Err(CoreError::Validation(
            "Target may only contain alphanumeric, hyphen, underscore, or dot characters"
                .to_string(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::state_machine::*;
    use super::*;

    fn submit(target: &str, tool: Tool, mode: Option<ToolMode>) -> SubmitJob {
        SubmitJob {
            target: target.to_string(),
            tool,
            mode,
            scheduled_for: None,
        }
    }

    // -- resource keys ------------------------------------------------------

    #[test]
    fn resource_key_default_mode_omits_mode() {
        let key = ResourceKey::new("col_1", Tool::Photostats, ToolMode::Collection);
        assert_eq!(key.as_str(), "col_1:photostats");
    }

    #[test]
    fn resource_key_display_graph_appends_mode() {
        let key = ResourceKey::new("pip_7", Tool::PipelineValidation, ToolMode::DisplayGraph);
        assert_eq!(key.as_str(), "pip_7:pipeline_validation:display_graph");
    }

    #[test]
    fn explicit_collection_mode_matches_implicit() {
        let a = submit("col_1", Tool::Photostats, None).resource_key();
        let b = submit("col_1", Tool::Photostats, Some(ToolMode::Collection)).resource_key();
        assert_eq!(a, b);
    }

    #[test]
    fn different_tools_yield_different_keys() {
        let a = submit("col_1", Tool::Photostats, None).resource_key();
        let b = submit("col_1", Tool::PhotoPairing, None).resource_key();
        assert_ne!(a, b);
    }

    // -- validation ---------------------------------------------------------

    #[test]
    fn valid_submission() {
        assert!(submit("col_1", Tool::Photostats, None).validate().is_ok());
    }

    #[test]
    fn empty_target_rejected() {
        assert_matches!(
            submit("", Tool::Photostats, None).validate(),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn target_with_separator_rejected() {
        assert_matches!(
            submit("col:1", Tool::Photostats, None).validate(),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn target_too_long_rejected() {
        let target = "a".repeat(MAX_TARGET_LEN + 1);
        assert!(submit(&target, Tool::Photostats, None).validate().is_err());
    }

    #[test]
    fn display_graph_requires_pipeline_validation() {
        assert!(submit("pip_1", Tool::Photostats, Some(ToolMode::DisplayGraph))
            .validate()
            .is_err());
        assert!(
            submit("pip_1", Tool::PipelineValidation, Some(ToolMode::DisplayGraph))
                .validate()
                .is_ok()
        );
    }

    // -- status -------------------------------------------------------------

    #[test]
    fn active_statuses() {
        assert!(JobStatus::Scheduled.is_active());
        assert!(JobStatus::Queued.is_active());
        assert!(JobStatus::Running.is_active());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }

    #[test]
    fn running_is_not_cancellable() {
        assert!(!JobStatus::Running.is_cancellable());
        assert!(JobStatus::Queued.is_cancellable());
        assert!(JobStatus::Scheduled.is_cancellable());
    }

    #[test]
    fn status_parses_from_wire_name() {
        assert_eq!("queued".parse::<JobStatus>().ok(), Some(JobStatus::Queued));
        assert!("retrying".parse::<JobStatus>().is_err());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&JobStatus::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
    }

    // -- state machine ------------------------------------------------------

    #[test]
    fn scheduled_to_queued_and_cancelled() {
        assert!(can_transition(JobStatus::Scheduled, JobStatus::Queued));
        assert!(can_transition(JobStatus::Scheduled, JobStatus::Cancelled));
        assert!(!can_transition(JobStatus::Scheduled, JobStatus::Running));
    }

    #[test]
    fn running_can_be_released_to_queued() {
        assert!(can_transition(JobStatus::Running, JobStatus::Queued));
    }

    #[test]
    fn running_cannot_be_cancelled() {
        assert!(!can_transition(JobStatus::Running, JobStatus::Cancelled));
    }

    #[test]
    fn terminal_states_have_no_transitions() {
        assert!(valid_transitions(JobStatus::Completed).is_empty());
        assert!(valid_transitions(JobStatus::Failed).is_empty());
        assert!(valid_transitions(JobStatus::Cancelled).is_empty());
    }

    #[test]
    fn validate_transition_error_names_both_states() {
        let err = validate_transition(JobStatus::Completed, JobStatus::Running).unwrap_err();
        assert!(err.contains("completed"));
        assert!(err.contains("running"));
    }
}
