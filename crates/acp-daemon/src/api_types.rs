//! Request/response bodies for the v1 HTTP surface.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use acp_skills::{ImportSummary, SkillSubmission};

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub ok: bool,
    pub db_ok: bool,
    pub has_event_table: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// Principals / agents
// ---------------------------------------------------------------------------

fn default_principal_type() -> String {
    "user".to_string()
}

#[derive(Debug, Deserialize)]
pub struct EnsurePrincipalRequest {
    pub actor_type: String,
    pub actor_id: String,
    #[serde(default = "default_principal_type")]
    pub principal_type: String,
}

#[derive(Debug, Serialize)]
pub struct EnsurePrincipalResponse {
    pub principal_id: String,
    pub principal_type: String,
    pub created: bool,
}

#[derive(Debug, Deserialize)]
pub struct RegisterAgentRequest {
    pub display_name: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterAgentResponse {
    pub agent_id: String,
    pub principal_id: String,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct SkillImportRequest {
    pub packages: Vec<SkillSubmission>,
}

#[derive(Debug, Serialize)]
pub struct SkillImportResponse {
    pub summary: ImportSummary,
}

#[derive(Debug, Deserialize)]
pub struct SnapshotsQuery {
    #[serde(default = "default_snapshot_days")]
    pub days: i64,
}

fn default_snapshot_days() -> i64 {
    30
}

#[derive(Debug, Serialize)]
pub struct SnapshotDto {
    pub agent_id: String,
    pub snapshot_date: String,
    pub trust_score: f64,
    pub autonomy_rate: f64,
    pub learning_events_7d: i64,
    pub constraints_active: i64,
    pub skills_verified: i64,
    pub egress_blocked_7d: i64,
}

#[derive(Debug, Serialize)]
pub struct SnapshotsResponse {
    pub agent_id: String,
    pub snapshots: Vec<SnapshotDto>,
}

#[derive(Debug, Serialize)]
pub struct QuarantineLiftResponse {
    pub agent_id: String,
    pub lifted: bool,
}

// ---------------------------------------------------------------------------
// Rooms / threads / messages
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub title: String,
}

#[derive(Debug, Serialize)]
pub struct RoomResponse {
    pub room_id: String,
    pub title: String,
    pub last_event_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateThreadRequest {
    pub title: String,
}

#[derive(Debug, Serialize)]
pub struct ThreadResponse {
    pub thread_id: String,
    pub room_id: String,
    pub title: String,
    pub last_event_id: Option<String>,
}

fn default_author_type() -> String {
    "user".to_string()
}

fn default_author_id() -> String {
    "anonymous".to_string()
}

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    pub body: String,
    #[serde(default = "default_author_type")]
    pub author_type: String,
    #[serde(default = "default_author_id")]
    pub author_id: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message_id: String,
    pub thread_id: String,
    pub room_id: String,
    pub last_event_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Runs / steps / artifacts
// ---------------------------------------------------------------------------

fn default_created_by_type() -> String {
    "user".to_string()
}

fn default_created_by_id() -> String {
    "anonymous".to_string()
}

#[derive(Debug, Deserialize)]
pub struct CreateRunRequest {
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default = "default_created_by_type")]
    pub created_by_type: String,
    #[serde(default = "default_created_by_id")]
    pub created_by_id: String,
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub run_id: String,
    pub status: String,
    pub correlation_id: String,
    pub room_id: Option<String>,
    pub output: Option<Value>,
    pub error_reason_code: Option<String>,
    pub last_event_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteRunRequest {
    pub status: String,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error_reason_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TransitionResponse {
    pub run_id: String,
    pub status: String,
    pub changed: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateStepRequest {
    pub name: String,
    #[serde(default)]
    pub input: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct StepResponse {
    pub step_id: String,
    pub run_id: String,
    pub last_event_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateArtifactRequest {
    pub kind: String,
    #[serde(default)]
    pub content: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ArtifactResponse {
    pub artifact_id: String,
    pub run_id: String,
    pub step_id: String,
    pub kind: String,
    pub last_event_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ArtifactsQuery {
    #[serde(default)]
    pub run_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ArtifactsResponse {
    pub artifacts: Vec<ArtifactResponse>,
}

// ---------------------------------------------------------------------------
// Policy / approvals / egress
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct EvaluatePolicyRequest {
    pub action: String,
    pub actor_type: String,
    pub actor_id: String,
    #[serde(default)]
    pub principal_id: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub target_url: Option<String>,
    #[serde(default)]
    pub context: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct EvaluatePolicyResponse {
    pub decision: String,
    pub reason_code: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateApprovalRequest {
    pub action: String,
    pub scope: Value,
    #[serde(default)]
    pub context: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ApprovalResponse {
    pub approval_id: String,
    pub action: String,
    pub status: String,
    pub scope: Value,
}

#[derive(Debug, Deserialize)]
pub struct DecideApprovalRequest {
    /// "approve" or "reject".
    pub decision: String,
    pub decided_by: String,
}

#[derive(Debug, Serialize)]
pub struct DecideApprovalResponse {
    pub approval_id: String,
    pub status: String,
    pub changed: bool,
}

fn default_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Deserialize)]
pub struct EgressApiRequest {
    pub action: String,
    pub target_url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub run_id: Option<String>,
    pub actor_type: String,
    pub actor_id: String,
    #[serde(default)]
    pub principal_id: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub context: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct EgressApiResponse {
    pub decision: String,
    pub reason_code: String,
}

// ---------------------------------------------------------------------------
// Scorecards / lessons
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateScorecardRequest {
    pub agent_id: String,
    pub template: String,
    pub scores: Value,
    #[serde(default)]
    pub evidence_run_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ScorecardResponse {
    pub scorecard_id: String,
    pub agent_id: String,
    pub template: String,
    pub overall: f64,
    /// Present when the promotion loop ran on this submission.
    pub recommendation: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ScorecardDto {
    pub scorecard_id: String,
    pub agent_id: String,
    pub template: String,
    pub scores: Value,
    pub overall: f64,
    pub evidence_run_id: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateLessonRequest {
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub context: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct LessonResponse {
    pub lesson_id: String,
}

// ---------------------------------------------------------------------------
// Worker / jobs
// ---------------------------------------------------------------------------

fn default_batch_limit() -> i64 {
    10
}

#[derive(Debug, Deserialize)]
pub struct RunCycleRequest {
    #[serde(default = "default_batch_limit")]
    pub batch_limit: i64,
}

#[derive(Debug, Deserialize)]
pub struct SnapshotJobRequest {
    /// ISO date; defaults to today (UTC).
    #[serde(default)]
    pub date: Option<String>,
}

// ---------------------------------------------------------------------------
// Streams
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    pub from_seq: i64,
}
