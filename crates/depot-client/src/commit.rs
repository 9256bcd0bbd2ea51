use chrono::{DateTime, SecondsFormat, Utc};
use depot_store::{Commit, StoreResult, COMMIT_HASH_FIELD};
use depot_types::ObjectHash;
use serde_json::{Map, Value};

/// Commit metadata supplied by the user before a push.
#[derive(Clone, Debug)]
pub struct CommitProposal {
    pub message: String,
    pub author: Option<String>,
    pub parent: Option<ObjectHash>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl CommitProposal {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            author: None,
            parent: None,
            timestamp: None,
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_parent(mut self, parent: ObjectHash) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Fix the timestamp instead of using the time of [`build`](Self::build).
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Build the commit document for `root_tree`.
    ///
    /// `commitHash` is the SHA-1 of the compact JSON of every other field;
    /// `serde_json` maps serialize with sorted keys, so equal metadata always
    /// yields the same hash.
    pub fn build(&self, root_tree: ObjectHash) -> StoreResult<Commit> {
        let timestamp = self.timestamp.unwrap_or_else(Utc::now);

        let mut document = Map::new();
        document.insert("rootTree".into(), Value::String(root_tree.to_hex()));
        document.insert(
            "parent".into(),
            self.parent
                .map(|p| Value::String(p.to_hex()))
                .unwrap_or(Value::Null),
        );
        document.insert("message".into(), Value::String(self.message.clone()));
        document.insert(
            "author".into(),
            self.author.clone().map(Value::String).unwrap_or(Value::Null),
        );
        document.insert(
            "timestamp".into(),
            Value::String(timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );

        let canonical = serde_json::to_vec(&document)
            .map_err(|e| depot_store::StoreError::Serialization(e.to_string()))?;
        let hash = ObjectHash::digest(&canonical);
        document.insert(COMMIT_HASH_FIELD.into(), Value::String(hash.to_hex()));
        Commit::from_document(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn proposal_builder() {
        let parent = ObjectHash::digest(b"parent");
        let p = CommitProposal::new("initial import")
            .with_author("Ada <ada@example.org>")
            .with_parent(parent)
            .with_timestamp(at());
        assert_eq!(p.message, "initial import");
        assert_eq!(p.author.as_deref(), Some("Ada <ada@example.org>"));
        assert_eq!(p.parent, Some(parent));
    }

    #[test]
    fn document_fields() {
        let root = ObjectHash::digest(b"root");
        let commit = CommitProposal::new("msg")
            .with_author("ada")
            .with_timestamp(at())
            .build(root)
            .unwrap();
        let doc = commit.document();
        assert_eq!(doc["rootTree"], root.to_hex());
        assert_eq!(doc["parent"], Value::Null);
        assert_eq!(doc["message"], "msg");
        assert_eq!(doc["author"], "ada");
        assert_eq!(doc["timestamp"], "2024-05-01T12:00:00.000Z");
        assert_eq!(doc[COMMIT_HASH_FIELD], commit.hash().to_hex());
    }

    #[test]
    fn hash_is_deterministic_and_content_sensitive() {
        let root = ObjectHash::digest(b"root");
        let a = CommitProposal::new("msg").with_timestamp(at());
        assert_eq!(a.build(root).unwrap().hash(), a.build(root).unwrap().hash());

        let b = CommitProposal::new("other").with_timestamp(at());
        assert_ne!(a.build(root).unwrap().hash(), b.build(root).unwrap().hash());

        let c = a.clone().with_parent(a.build(root).unwrap().hash());
        assert_ne!(a.build(root).unwrap().hash(), c.build(root).unwrap().hash());
    }
}
