//! GitLab webhook event types.
//!
//! Each struct carries only the fields the relay formats into chat messages.
//! GitLab freely sends `null` for optional text, so text fields decode `null`
//! as the empty string rather than failing.
//!
//! GitLab API docs:
//! <https://docs.gitlab.com/ee/user/project/integrations/webhook_events.html>

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::types::PipelineId;

/// The SHA GitLab reports for "no commit" (branch creation or deletion).
pub const NULL_SHA: &str = "0000000000000000000000000000000000000000";

/// Header carrying the event-type tag.
pub const HEADER_EVENT: &str = "x-gitlab-event";
/// Header carrying the webhook secret token.
pub const HEADER_TOKEN: &str = "x-gitlab-token";

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// The event-type tag sent in `X-Gitlab-Event`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    Push,
    TagPush,
    Issue,
    ConfidentialIssue,
    Note,
    ConfidentialNote,
    MergeRequest,
    Job,
    /// Legacy name for job events on older GitLab versions.
    Build,
    Pipeline,
    WikiPage,
    Other(String),
}

impl EventType {
    pub fn from_header(tag: &str) -> Self {
        match tag {
            "Push Hook" => EventType::Push,
            "Tag Push Hook" => EventType::TagPush,
            "Issue Hook" => EventType::Issue,
            "Confidential Issue Hook" => EventType::ConfidentialIssue,
            "Note Hook" => EventType::Note,
            "Confidential Note Hook" => EventType::ConfidentialNote,
            "Merge Request Hook" => EventType::MergeRequest,
            "Job Hook" => EventType::Job,
            "Build Hook" => EventType::Build,
            "Pipeline Hook" => EventType::Pipeline,
            "Wiki Page Hook" => EventType::WikiPage,
            other => EventType::Other(other.to_string()),
        }
    }
}

/// CI/CD status shared by jobs and pipelines.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CiStatus {
    #[default]
    Created,
    Pending,
    Running,
    Canceled,
    Failed,
    Success,
    /// Any status the relay has no dedicated handling for (`skipped`, `manual`, ...).
    Other(String),
}

impl CiStatus {
    pub fn as_str(&self) -> &str {
        match self {
            CiStatus::Created => "created",
            CiStatus::Pending => "pending",
            CiStatus::Running => "running",
            CiStatus::Canceled => "canceled",
            CiStatus::Failed => "failed",
            CiStatus::Success => "success",
            CiStatus::Other(s) => s,
        }
    }
}

impl From<String> for CiStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "created" => CiStatus::Created,
            "pending" => CiStatus::Pending,
            "running" => CiStatus::Running,
            "canceled" => CiStatus::Canceled,
            "failed" => CiStatus::Failed,
            "success" => CiStatus::Success,
            _ => CiStatus::Other(s),
        }
    }
}

impl From<CiStatus> for String {
    fn from(status: CiStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for CiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct User {
    #[serde(deserialize_with = "null_as_empty")]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Project {
    #[serde(deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub web_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Repository {
    #[serde(deserialize_with = "null_as_empty")]
    pub homepage: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Commit {
    #[serde(deserialize_with = "null_as_empty")]
    pub id: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub message: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub url: String,
}

/// A branch push.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PushEvent {
    #[serde(deserialize_with = "null_as_empty")]
    pub before: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub after: String,
    #[serde(rename = "ref", deserialize_with = "null_as_empty")]
    pub git_ref: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub user_name: String,
    pub project: Project,
    pub repository: Repository,
    pub commits: Vec<Commit>,
}

/// A tag creation or removal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TagPushEvent {
    #[serde(rename = "ref", deserialize_with = "null_as_empty")]
    pub git_ref: String,
    /// Empty when the tag was removed.
    #[serde(deserialize_with = "null_as_empty")]
    pub checkout_sha: String,
    /// Annotation of an annotated tag.
    #[serde(deserialize_with = "null_as_empty")]
    pub message: String,
    pub project: Project,
    pub repository: Repository,
}

/// Attributes shared by issues and merge requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TrackedItemAttributes {
    pub iid: u64,
    #[serde(deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub action: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IssueEvent {
    pub user: User,
    pub project: Project,
    pub object_attributes: TrackedItemAttributes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MergeRequestEvent {
    pub user: User,
    pub project: Project,
    pub object_attributes: TrackedItemAttributes,
}

/// What a comment was left on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum NoteableType {
    Issue,
    Commit,
    MergeRequest,
    Snippet,
    #[default]
    Unspecified,
    Other(String),
}

impl From<String> for NoteableType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "Issue" => NoteableType::Issue,
            "Commit" => NoteableType::Commit,
            "MergeRequest" => NoteableType::MergeRequest,
            "Snippet" => NoteableType::Snippet,
            "" => NoteableType::Unspecified,
            _ => NoteableType::Other(s),
        }
    }
}

impl fmt::Display for NoteableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NoteableType::Issue => f.write_str("Issue"),
            NoteableType::Commit => f.write_str("Commit"),
            NoteableType::MergeRequest => f.write_str("MergeRequest"),
            NoteableType::Snippet => f.write_str("Snippet"),
            NoteableType::Unspecified => f.write_str(""),
            NoteableType::Other(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NoteAttributes {
    #[serde(deserialize_with = "null_as_empty")]
    pub note: String,
    pub noteable_type: NoteableType,
    #[serde(deserialize_with = "null_as_empty")]
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NotedIssue {
    pub iid: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NotedMergeRequest {
    pub iid: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NotedSnippet {
    pub id: u64,
}

/// A comment on an issue, commit, merge request or snippet.
///
/// Only the object matching `noteable_type` is present in the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NoteEvent {
    pub user: User,
    pub project: Project,
    pub object_attributes: NoteAttributes,
    pub issue: Option<NotedIssue>,
    pub commit: Option<Commit>,
    pub merge_request: Option<NotedMergeRequest>,
    pub snippet: Option<NotedSnippet>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WikiPageAttributes {
    #[serde(deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub action: String,
    /// Commit message of the wiki change.
    #[serde(deserialize_with = "null_as_empty")]
    pub message: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WikiPageEvent {
    pub user: User,
    pub project: Project,
    pub object_attributes: WikiPageAttributes,
}

/// A status change of a single CI job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct JobEvent {
    #[serde(deserialize_with = "null_as_empty")]
    pub build_name: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub build_stage: String,
    pub build_status: CiStatus,
    pub pipeline_id: PipelineId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PipelineAttributes {
    pub id: PipelineId,
    pub status: CiStatus,
}

/// A status change of a whole pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PipelineEvent {
    pub object_attributes: PipelineAttributes,
    pub project: Project,
}

/// A decoded GitLab webhook event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitLabEvent {
    Push(PushEvent),
    TagPush(TagPushEvent),
    Issue(IssueEvent),
    MergeRequest(MergeRequestEvent),
    Note(NoteEvent),
    WikiPage(WikiPageEvent),
    Job(JobEvent),
    Pipeline(PipelineEvent),
    /// An event type the relay does not format. Carries the raw tag.
    Unknown { event_type: String },
}
