use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use depot_store::{Blob, Commit, Tree, TreeData};
use depot_types::{ObjectHash, RepoName};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ProtocolError, ProtocolResult};

/// Plain-text acknowledgement sent for every non-payload outcome.
pub const ACK_TEXT: &str = "Request handled successfully";

/// Largest request or response frame accepted by default (64 MiB).
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Base64 engine for blob content: standard alphabet, padding optional on
/// input, always emitted on output.
pub const CONTENT_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub mod actions {
    pub const STORE_BLOB: &str = "storeBlob";
    pub const STORE_TREE: &str = "storeTree";
    pub const COMMIT: &str = "commit";
    pub const PULL_REPOSITORY: &str = "pullRepository";
    pub const LIST_REPOSITORIES: &str = "listRepositories";
    pub const ERROR: &str = "error";

    pub const ALL: [&str; 5] = [
        STORE_BLOB,
        STORE_TREE,
        COMMIT,
        PULL_REPOSITORY,
        LIST_REPOSITORIES,
    ];
}

/// One request document, discriminated by its `action` field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Request {
    StoreBlob {
        repository_name: RepoName,
        blob_hash: ObjectHash,
        /// Base64-encoded blob bytes.
        content: String,
    },
    StoreTree {
        repository_name: RepoName,
        tree_hash: ObjectHash,
        tree_data: TreeData,
    },
    Commit {
        repository_name: RepoName,
        commit: Map<String, Value>,
    },
    PullRepository {
        repository_name: RepoName,
    },
    ListRepositories,
}

impl Request {
    /// Parse a request document.
    ///
    /// Distinguishes documents that are not JSON objects, documents without
    /// an `action`, unknown actions, and known actions with bad fields.
    pub fn parse(bytes: &[u8]) -> ProtocolResult<Self> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
        if !value.is_object() {
            return Err(ProtocolError::Malformed("request is not a JSON object".into()));
        }
        let action = match value.get("action") {
            Some(Value::String(action)) => action.clone(),
            _ => return Err(ProtocolError::MissingAction),
        };
        if !actions::ALL.contains(&action.as_str()) {
            return Err(ProtocolError::UnsupportedAction(action));
        }
        serde_json::from_value(value).map_err(|e| ProtocolError::InvalidRequest {
            action,
            reason: e.to_string(),
        })
    }

    pub fn store_blob(repository_name: RepoName, blob: &Blob) -> Self {
        Self::StoreBlob {
            repository_name,
            blob_hash: blob.hash(),
            content: CONTENT_ENGINE.encode(blob.content()),
        }
    }

    pub fn store_tree(repository_name: RepoName, tree: &Tree) -> Self {
        Self::StoreTree {
            repository_name,
            tree_hash: tree.hash(),
            tree_data: tree.data().clone(),
        }
    }

    pub fn commit(repository_name: RepoName, commit: &Commit) -> Self {
        Self::Commit {
            repository_name,
            commit: commit.document().clone(),
        }
    }

    pub fn pull(repository_name: RepoName) -> Self {
        Self::PullRepository { repository_name }
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::StoreBlob { .. } => actions::STORE_BLOB,
            Self::StoreTree { .. } => actions::STORE_TREE,
            Self::Commit { .. } => actions::COMMIT,
            Self::PullRepository { .. } => actions::PULL_REPOSITORY,
            Self::ListRepositories => actions::LIST_REPOSITORIES,
        }
    }

    pub fn repository(&self) -> Option<&RepoName> {
        match self {
            Self::StoreBlob { repository_name, .. }
            | Self::StoreTree { repository_name, .. }
            | Self::Commit { repository_name, .. }
            | Self::PullRepository { repository_name } => Some(repository_name),
            Self::ListRepositories => None,
        }
    }

    pub fn to_json(&self) -> ProtocolResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ProtocolError::Serialization(e.to_string()))
    }
}

/// Decode base64 blob content from a `storeBlob` request.
pub fn decode_content(content: &str) -> ProtocolResult<Vec<u8>> {
    CONTENT_ENGINE
        .decode(content.trim())
        .map_err(|e| ProtocolError::InvalidContent(e.to_string()))
}

/// Body of a `listRepositories` response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryList {
    pub action: String,
    pub repositories: Vec<String>,
}

impl RepositoryList {
    pub fn new(repositories: Vec<String>) -> Self {
        Self {
            action: actions::LIST_REPOSITORIES.to_string(),
            repositories,
        }
    }
}

/// Body of an error response, only produced when error reporting is enabled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDocument {
    pub action: String,
    pub message: String,
}

/// One part of a server reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    /// The fixed [`ACK_TEXT`].
    Ack,
    /// `{"action":"listRepositories","repositories":[...]}`.
    Repositories(Vec<String>),
    /// Raw tar bytes of a pulled repository.
    Archive(Vec<u8>),
    /// `{"action":"error","message":...}`.
    Error(String),
}

impl Response {
    /// Wire bytes of this part. An archive is handed over without copying.
    pub fn into_bytes(self) -> ProtocolResult<Vec<u8>> {
        match self {
            Self::Ack => Ok(ACK_TEXT.as_bytes().to_vec()),
            Self::Repositories(names) => to_json(&RepositoryList::new(names)),
            Self::Archive(bytes) => Ok(bytes),
            Self::Error(message) => to_json(&ErrorDocument {
                action: actions::ERROR.to_string(),
                message,
            }),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::Repositories(_) => "repositories",
            Self::Archive(_) => "archive",
            Self::Error(_) => "error",
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    serde_json::to_vec_pretty(value).map_err(|e| ProtocolError::Serialization(e.to_string()))
}

/// Returns `true` if `bytes` is exactly the acknowledgement text.
pub fn is_ack(bytes: &[u8]) -> bool {
    bytes == ACK_TEXT.as_bytes()
}
