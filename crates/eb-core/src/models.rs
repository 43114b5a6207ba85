//! # Domain Models
//!
//! These structs represent the records echo-board stores in a user-owned
//! repository. Records are immutable once written; identity (URI + content
//! hash) is assigned by the repository.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};

/// A board identifier, e.g. "rust" or "k3x9a0qz". See `validation::validate_board_id`.
pub type BoardId = String;

/// The four record collections an echo-board repository holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Thread,
    Post,
    Reaction,
    BoardInfo,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Thread,
        Collection::Post,
        Collection::Reaction,
        Collection::BoardInfo,
    ];

    /// Namespaced identifier used as the `collection` argument of every repository call.
    pub fn nsid(self) -> &'static str {
        match self {
            Collection::Thread => "app.echosky.board.thread",
            Collection::Post => "app.echosky.board.post",
            Collection::Reaction => "app.echosky.board.reaction",
            Collection::BoardInfo => "app.echosky.board.boardInfo",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.nsid())
    }
}

impl FromStr for Collection {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        Collection::ALL
            .into_iter()
            .find(|c| c.nsid() == s)
            .ok_or_else(|| AppError::Decode(format!("unknown collection {s}")))
    }
}

/// A {uri, cid} pair pointing at one content-verifiable record revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StrongRef {
    pub uri: String,
    pub cid: String,
}

/// Closed set of reactions. Adding a kind is a schema change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Like,
    Laugh,
    Sad,
    Angry,
    Star,
}

impl ReactionKind {
    pub const ALL: [ReactionKind; 5] = [
        ReactionKind::Like,
        ReactionKind::Laugh,
        ReactionKind::Sad,
        ReactionKind::Angry,
        ReactionKind::Star,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReactionKind::Like => "like",
            ReactionKind::Laugh => "laugh",
            ReactionKind::Sad => "sad",
            ReactionKind::Angry => "angry",
            ReactionKind::Star => "star",
        }
    }
}

impl fmt::Display for ReactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReactionKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        ReactionKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| AppError::Validation(format!("unknown reaction kind '{s}'")))
    }
}

/// Typed view of one collection. Decoding goes through `from_value`, which
/// rejects payloads whose `$type` names another collection.
pub trait RecordSchema: Serialize + DeserializeOwned + Sized {
    const COLLECTION: Collection;

    /// Serializes the record with its `$type` discriminator.
    fn to_value(&self) -> Result<Value> {
        let mut value = serde_json::to_value(self)?;
        if let Value::Object(map) = &mut value {
            map.insert(
                "$type".to_string(),
                Value::String(Self::COLLECTION.nsid().to_string()),
            );
        }
        Ok(value)
    }

    fn from_value(value: Value) -> Result<Self> {
        if let Some(declared) = value.get("$type").and_then(Value::as_str) {
            if declared != Self::COLLECTION.nsid() {
                return Err(AppError::Decode(format!(
                    "expected {} record, found {declared}",
                    Self::COLLECTION
                )));
            }
        }
        Ok(serde_json::from_value(value)?)
    }
}

/// A thread opener. Its board is a free-form reference, validated only on creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadRecord {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board: Option<BoardId>,
    pub created_at: DateTime<Utc>,
}

impl RecordSchema for ThreadRecord {
    const COLLECTION: Collection = Collection::Thread;
}

/// A reply inside a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    /// URI of the thread this post belongs to
    pub thread: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    /// Rich-text annotations, kept opaque
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facets: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_post: Option<StrongRef>,
}

impl RecordSchema for PostRecord {
    const COLLECTION: Collection = Collection::Post;
}

/// A reaction to a thread or post.
///
/// The kind is kept as the raw wire string so that records written by newer
/// clients still decode; `kind()` maps it onto the known set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionRecord {
    pub subject: StrongRef,
    pub reaction: String,
    pub created_at: DateTime<Utc>,
}

impl ReactionRecord {
    pub fn new(subject: StrongRef, kind: ReactionKind, created_at: DateTime<Utc>) -> Self {
        Self {
            subject,
            reaction: kind.as_str().to_string(),
            created_at,
        }
    }

    /// `None` for kinds outside the known set.
    pub fn kind(&self) -> Option<ReactionKind> {
        self.reaction.parse().ok()
    }
}

impl RecordSchema for ReactionRecord {
    const COLLECTION: Collection = Collection::Reaction;
}

/// Explicit board metadata, stored under its `board_id` as record key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardInfoRecord {
    pub board_id: BoardId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Blob reference, kept opaque
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<Value>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl RecordSchema for BoardInfoRecord {
    const COLLECTION: Collection = Collection::BoardInfo;
}

/// A record as returned by the repository, before schema decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub uri: String,
    pub cid: String,
    pub value: Value,
}

/// One page of a collection listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPage {
    pub records: Vec<RawRecord>,
    /// Continuation cursor; `None` on the last page
    pub cursor: Option<String>,
}

/// A decoded record together with its repository identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Listed<T> {
    pub uri: String,
    pub cid: String,
    pub value: T,
}

impl<T: RecordSchema> Listed<T> {
    pub fn decode(raw: RawRecord) -> Result<Self> {
        Ok(Self {
            value: T::from_value(raw.value)?,
            uri: raw.uri,
            cid: raw.cid,
        })
    }
}

impl<T> Listed<T> {
    pub fn strong_ref(&self) -> StrongRef {
        StrongRef {
            uri: self.uri.clone(),
            cid: self.cid.clone(),
        }
    }
}

/// An account the caller follows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Follow {
    pub did: String,
    #[serde(default)]
    pub handle: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn collection_nsids_round_trip() {
        for collection in Collection::ALL {
            assert_eq!(collection.nsid().parse::<Collection>().unwrap(), collection);
        }
        assert!("app.bsky.feed.post".parse::<Collection>().is_err());
    }

    #[test]
    fn reaction_kind_parses_known_set_only() {
        assert_eq!("star".parse::<ReactionKind>().unwrap(), ReactionKind::Star);
        assert!("heart".parse::<ReactionKind>().is_err());
        assert!("Like".parse::<ReactionKind>().is_err());
    }

    #[test]
    fn reaction_with_unknown_kind_still_decodes() {
        let record = ReactionRecord::from_value(json!({
            "$type": "app.echosky.board.reaction",
            "subject": { "uri": "at://did:plc:a/app.echosky.board.thread/1", "cid": "bafy1" },
            "reaction": "heart",
            "createdAt": "2024-05-01T12:00:00.000Z"
        }))
        .unwrap();
        assert_eq!(record.kind(), None);
        assert_eq!(record.reaction, "heart");
    }

    #[test]
    fn decoding_rejects_foreign_type() {
        let err = ThreadRecord::from_value(json!({
            "$type": "app.echosky.board.post",
            "title": "x",
            "createdAt": "2024-05-01T12:00:00Z"
        }))
        .unwrap_err();
        assert!(matches!(err, AppError::Decode(_)));
    }

    #[test]
    fn decoding_rejects_missing_fields() {
        let err = ThreadRecord::from_value(json!({ "board": "rust" })).unwrap_err();
        assert!(matches!(err, AppError::Decode(_)));
    }

    #[test]
    fn post_record_uses_ref_post_on_the_wire() {
        let post = PostRecord {
            thread: "at://did:plc:a/app.echosky.board.thread/1".into(),
            text: "first".into(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            facets: None,
            ref_post: Some(StrongRef {
                uri: "at://did:plc:b/app.echosky.board.post/2".into(),
                cid: "bafy2".into(),
            }),
        };
        let value = post.to_value().unwrap();
        assert_eq!(value["refPost"]["cid"], "bafy2");
        assert!(value.get("facets").is_none());
    }
}
