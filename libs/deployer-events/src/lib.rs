//! Event log models
//!
//! Every state change of the release catalog is an event appended to the
//! `software-releases` stream. Events travel as one JSON envelope per log line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the stream holding release events
pub const SOFTWARE_RELEASES_STREAM: &str = "/software-releases";

/// Errors from encoding or decoding an event line
#[derive(Error, Debug)]
pub enum EventError {
    #[error("malformed event: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unsupported event type: {0}")]
    UnsupportedType(String),
}

/// Metadata common to all events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMeta {
    pub timestamp: DateTime<Utc>,

    /// Who caused the event. System-initiated events use [`SYSTEM_USER`].
    pub user: String,
}

pub const SYSTEM_USER: &str = "system";

impl EventMeta {
    /// Metadata for an event caused by the system itself
    pub fn system_user(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            user: SYSTEM_USER.to_string(),
        }
    }
}

/// A new release was published
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseCreated {
    pub id: String,

    /// "owner/name"
    pub repository: String,

    pub revision_friendly: String,

    pub revision_id: String,

    /// "https://baseurl/", "githubrelease:owner:repo:releaseId" or "docker://image:tag"
    pub artefacts_location: String,

    /// Usually "deployerspec.zip". Empty for registry image releases.
    #[serde(default)]
    pub deployer_spec_filename: String,
}

/// All known event kinds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ReleaseCreated(ReleaseCreated, EventMeta),
}

impl Event {
    /// Type name as written in the envelope
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::ReleaseCreated(..) => "ReleaseCreated",
        }
    }

    pub fn meta(&self) -> &EventMeta {
        match self {
            Event::ReleaseCreated(_, meta) => meta,
        }
    }
}

/// On-disk shape of one event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub meta: EventMeta,
    pub data: serde_json::Value,
}

/// Serialize an event into a single log line
pub fn serialize(event: &Event) -> Result<String, EventError> {
    let data = match event {
        Event::ReleaseCreated(e, _) => serde_json::to_value(e)?,
    };

    let envelope = EventEnvelope {
        event_type: event.type_name().to_string(),
        meta: event.meta().clone(),
        data,
    };

    Ok(serde_json::to_string(&envelope)?)
}

/// Parse a log line back into an event.
///
/// Unknown event types are an error rather than being skipped, so an old
/// reader never silently builds a partial view of a newer log.
pub fn parse(line: &str) -> Result<Event, EventError> {
    let envelope: EventEnvelope = serde_json::from_str(line)?;

    match envelope.event_type.as_str() {
        "ReleaseCreated" => {
            let e: ReleaseCreated = serde_json::from_value(envelope.data)?;
            Ok(Event::ReleaseCreated(e, envelope.meta))
        }
        other => Err(EventError::UnsupportedType(other.to_string())),
    }
}
