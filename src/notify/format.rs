//! Event classification and message formatting.
//!
//! [`classify`] is pure: it turns a decoded event into the text a recipient
//! sees and decides how that text is delivered. Job and pipeline updates are
//! routed to the coalescing machine; everything else is sent as is.

use tracing::warn;

use crate::delivery::Keyboard;
use crate::types::PipelineId;
use crate::webhooks::events::{
    IssueEvent, JobEvent, MergeRequestEvent, NoteEvent, NoteableType, PipelineEvent, PushEvent,
    TagPushEvent, WikiPageEvent,
};
use crate::webhooks::{CiStatus, GitLabEvent, NULL_SHA};

/// A link button attached to a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub url: String,
    pub label: String,
}

impl Link {
    pub fn new(url: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            label: label.into(),
        }
    }
}

/// Text for a recipient, with an optional link button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub text: String,
    pub link: Option<Link>,
}

impl Notification {
    pub fn new(text: impl Into<String>, link: Option<Link>) -> Self {
        Self {
            text: text.into(),
            link,
        }
    }

    /// The inline keyboard rendering the link, if there is one.
    pub fn keyboard(&self) -> Option<Keyboard> {
        self.link
            .as_ref()
            .map(|link| Keyboard::link(&link.url, &link.label))
    }
}

/// Where a pipeline-scoped update came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateSource {
    Job,
    Pipeline { status: CiStatus },
}

/// A job or pipeline status change, subject to coalescing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineUpdate {
    pub pipeline_id: PipelineId,
    pub source: UpdateSource,
    pub notification: Notification,
}

impl PipelineUpdate {
    /// True for a pipeline-level `failed` status. Job failures do not count.
    pub fn is_pipeline_failure(&self) -> bool {
        matches!(
            self.source,
            UpdateSource::Pipeline {
                status: CiStatus::Failed
            }
        )
    }
}

/// How a classified event is delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Send as a new message.
    Direct(Notification),
    /// Hand to the coalescing machine.
    Pipeline(PipelineUpdate),
    /// Drop without any outbound call.
    Suppressed,
}

/// Strips the `refs/<kind>/` prefix from a git ref.
///
/// ```
/// use gitlab_chat_relay::notify::base_ref;
///
/// assert_eq!(base_ref("refs/heads/feature/x"), "feature/x");
/// assert_eq!(base_ref("main"), "main");
/// ```
pub fn base_ref(git_ref: &str) -> &str {
    let mut parts = git_ref.splitn(3, '/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(_), Some(rest)) => rest,
        _ => git_ref,
    }
}

/// First eight characters of a commit id, or the whole id if it is shorter.
fn short_sha(sha: &str) -> &str {
    sha.get(..8).unwrap_or(sha)
}

/// Classifies an event and renders its notification.
pub fn classify(event: &GitLabEvent) -> Dispatch {
    match event {
        GitLabEvent::Push(e) => Dispatch::Direct(format_push(e)),
        GitLabEvent::TagPush(e) => Dispatch::Direct(format_tag_push(e)),
        GitLabEvent::Issue(e) => Dispatch::Direct(format_issue(e)),
        GitLabEvent::MergeRequest(e) => Dispatch::Direct(format_merge_request(e)),
        GitLabEvent::Note(e) => Dispatch::Direct(format_note(e)),
        GitLabEvent::WikiPage(e) => Dispatch::Direct(format_wiki_page(e)),
        GitLabEvent::Job(e) => format_job(e).map_or(Dispatch::Suppressed, Dispatch::Pipeline),
        GitLabEvent::Pipeline(e) => Dispatch::Pipeline(format_pipeline(e)),
        GitLabEvent::Unknown { event_type } => {
            Dispatch::Direct(Notification::new(format!("❓ Unknown event {event_type}"), None))
        }
    }
}

fn format_push(e: &PushEvent) -> Notification {
    let mut text = format!(
        "🛠 {} pushed to {}#{}\n\n",
        e.user_name,
        e.project.name,
        base_ref(&e.git_ref)
    );
    for commit in &e.commits {
        text.push_str(&commit.message);
        text.push('\n');
    }

    let url = if e.after == NULL_SHA {
        None
    } else if e.before == NULL_SHA && !e.commits.is_empty() {
        Some(e.commits[0].url.clone())
    } else {
        Some(format!(
            "{}/-/compare/{}...{}",
            e.repository.homepage,
            short_sha(&e.before),
            short_sha(&e.after)
        ))
    };

    Notification::new(text, url.map(|url| Link::new(url, "Changes")))
}

fn format_tag_push(e: &TagPushEvent) -> Notification {
    let tag = base_ref(&e.git_ref);

    if e.checkout_sha.is_empty() {
        return Notification::new(
            format!("🏷️ remove tag {}#{}\n\n{}", e.project.name, tag, e.message),
            None,
        );
    }

    Notification::new(
        format!("🏷️ new tag {}#{}\n\n{}", e.project.name, tag, e.message),
        Some(Link::new(
            format!("{}/-/tags/{}", e.repository.homepage, tag),
            "Changes",
        )),
    )
}

fn format_issue(e: &IssueEvent) -> Notification {
    let attrs = &e.object_attributes;
    Notification::new(
        format!(
            "🐛 {} {} issue: {}#{}\n{}\n\n{}",
            e.user.name, attrs.action, e.project.name, attrs.iid, attrs.title, attrs.description
        ),
        Some(Link::new(&attrs.url, "Open issue")),
    )
}

fn format_merge_request(e: &MergeRequestEvent) -> Notification {
    let attrs = &e.object_attributes;
    Notification::new(
        format!(
            "🔀 {} {} MR: {}#{}\n{}\n\n{}",
            e.user.name, attrs.action, e.project.name, attrs.iid, attrs.title, attrs.description
        ),
        Some(Link::new(&attrs.url, "Open")),
    )
}

fn format_note(e: &NoteEvent) -> Notification {
    let project = &e.project.name;
    let target = match &e.object_attributes.noteable_type {
        NoteableType::Issue => {
            let iid = e.issue.as_ref().map_or(0, |i| i.iid);
            format!("issue {project}#{iid}")
        }
        NoteableType::Commit => {
            let sha = e.commit.as_ref().map_or("", |c| short_sha(&c.id));
            format!("commit {project}#{sha}")
        }
        NoteableType::MergeRequest => {
            let iid = e.merge_request.as_ref().map_or(0, |mr| mr.iid);
            format!("MR {project}#{iid}")
        }
        NoteableType::Snippet => {
            let id = e.snippet.as_ref().map_or(0, |s| s.id);
            format!("snippet {project} ${id}")
        }
        other @ (NoteableType::Unspecified | NoteableType::Other(_)) => {
            warn!(noteable = %other, "Comment on unrecognized noteable type");
            project.clone()
        }
    };

    Notification::new(
        format!(
            "💬 {} write comment to {}\n\n{}",
            e.user.name, target, e.object_attributes.note
        ),
        Some(Link::new(&e.object_attributes.url, "Open comment")),
    )
}

fn format_wiki_page(e: &WikiPageEvent) -> Notification {
    let attrs = &e.object_attributes;
    Notification::new(
        format!(
            "📙 {} {} page {}\n{}\n\n{}",
            e.user.name, attrs.action, e.project.name, attrs.title, attrs.message
        ),
        Some(Link::new(&attrs.url, "Open page")),
    )
}

/// Returns `None` for jobs that were only just created.
fn format_job(e: &JobEvent) -> Option<PipelineUpdate> {
    let emoji = match e.build_status {
        CiStatus::Created => return None,
        CiStatus::Running => "⌚",
        CiStatus::Canceled => "🚫",
        CiStatus::Failed => "🗙",
        CiStatus::Success => "✅",
        CiStatus::Pending | CiStatus::Other(_) => "💼",
    };

    Some(PipelineUpdate {
        pipeline_id: e.pipeline_id,
        source: UpdateSource::Job,
        notification: Notification::new(
            format!(
                "{emoji} {} {} {}",
                e.build_stage, e.build_name, e.build_status
            ),
            None,
        ),
    })
}

fn format_pipeline(e: &PipelineEvent) -> PipelineUpdate {
    let attrs = &e.object_attributes;
    let emoji = match attrs.status {
        CiStatus::Pending => "⏸️",
        CiStatus::Running => "▶️",
        CiStatus::Canceled => "🚫",
        CiStatus::Failed => "🗙",
        CiStatus::Success => "✅",
        CiStatus::Created | CiStatus::Other(_) => "💼",
    };

    PipelineUpdate {
        pipeline_id: attrs.id,
        source: UpdateSource::Pipeline {
            status: attrs.status.clone(),
        },
        notification: Notification::new(
            format!("{emoji} pipeline #{} {}", attrs.id, attrs.status),
            Some(Link::new(
                format!("{}/pipelines/{}", e.project.web_url, attrs.id),
                "Open pipeline",
            )),
        ),
    }
}
