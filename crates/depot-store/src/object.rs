use std::collections::BTreeMap;
use std::sync::OnceLock;

use depot_types::ObjectHash;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{StoreError, StoreResult};
use crate::hasher::{compute_hash, ContentHasher};

/// The kind of object stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Raw file content.
    Blob,
    /// One directory level: names mapped to blob and subtree hashes.
    Tree,
    /// Client-built history document.
    Commit,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 3] = [Self::Blob, Self::Tree, Self::Commit];

    /// Subspace directory inside a repository.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Blob => ".blobs",
            Self::Tree => ".trees",
            Self::Commit => ".commits",
        }
    }

    /// File name of the object keyed by `hash`.
    pub fn file_name(&self, hash: &ObjectHash) -> String {
        match self {
            Self::Blob => format!("blob_{hash}.txt"),
            Self::Tree => format!("tree_{hash}.json"),
            Self::Commit => format!("commit_{hash}.json"),
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blob => write!(f, "blob"),
            Self::Tree => write!(f, "tree"),
            Self::Commit => write!(f, "commit"),
        }
    }
}

// ---------------------------------------------------------------------------
// Blob
// ---------------------------------------------------------------------------

/// Immutable content object keyed by the SHA-1 of its bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    hash: ObjectHash,
    content: Vec<u8>,
}

impl Blob {
    /// Create a blob from raw bytes, computing its hash.
    pub fn new(content: Vec<u8>) -> Self {
        Self {
            hash: compute_hash(&content),
            content,
        }
    }

    /// Pair content with a hash that was supplied rather than computed.
    pub fn from_parts(hash: ObjectHash, content: Vec<u8>) -> Self {
        Self { hash, content }
    }

    pub fn hash(&self) -> ObjectHash {
        self.hash
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn into_content(self) -> Vec<u8> {
        self.content
    }

    /// Returns `true` if the content hashes to the blob's key.
    pub fn verify(&self) -> bool {
        ContentHasher::verify(&self.content, &self.hash)
    }
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// Serialized form of a tree, as stored on disk and sent on the wire:
/// `{"blobs": {name: hash}, "trees": {name: hash}}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeData {
    #[serde(default)]
    pub blobs: BTreeMap<String, ObjectHash>,
    #[serde(default)]
    pub trees: BTreeMap<String, ObjectHash>,
}

/// Snapshot of one directory level.
///
/// A tree is immutable once built; use [`TreeBuilder`] to assemble one. The
/// hash is computed on first use and cached. Because both mappings are kept
/// name-ordered, the hash does not depend on the order children were added.
///
/// "Name order" is byte order of the UTF-8 names, which matches code point
/// order. Clients that sort by UTF-16 code units disagree only on names that
/// mix characters above U+FFFF with characters in U+E000..=U+FFFF, and will
/// compute a different hash for such trees.
#[derive(Clone, Debug)]
pub struct Tree {
    data: TreeData,
    hash: OnceLock<ObjectHash>,
}

impl Tree {
    pub fn builder() -> TreeBuilder {
        TreeBuilder::default()
    }

    /// An empty tree.
    pub fn empty() -> Self {
        Self::from_data(TreeData::default())
    }

    pub fn from_data(data: TreeData) -> Self {
        Self {
            data,
            hash: OnceLock::new(),
        }
    }

    /// Build a tree whose cached hash is already known (e.g. the key it was
    /// loaded under).
    pub fn with_known_hash(data: TreeData, hash: ObjectHash) -> Self {
        Self {
            data,
            hash: OnceLock::from(hash),
        }
    }

    /// Tree hash, computed once and cached.
    pub fn hash(&self) -> ObjectHash {
        *self.hash.get_or_init(|| Self::hash_data(&self.data))
    }

    /// Recompute the hash from the children, ignoring the cache.
    pub fn compute_hash(&self) -> ObjectHash {
        Self::hash_data(&self.data)
    }

    /// sha1(blob hashes in name order ++ subtree hashes in name order), over
    /// their hex renderings.
    fn hash_data(data: &TreeData) -> ObjectHash {
        let mut hasher = ContentHasher::new();
        for hash in data.blobs.values() {
            hasher.update_hash(hash);
        }
        for hash in data.trees.values() {
            hasher.update_hash(hash);
        }
        hasher.finalize()
    }

    pub fn blobs(&self) -> &BTreeMap<String, ObjectHash> {
        &self.data.blobs
    }

    pub fn trees(&self) -> &BTreeMap<String, ObjectHash> {
        &self.data.trees
    }

    pub fn blob(&self, name: &str) -> Option<&ObjectHash> {
        self.data.blobs.get(name)
    }

    pub fn subtree(&self, name: &str) -> Option<&ObjectHash> {
        self.data.trees.get(name)
    }

    pub fn data(&self) -> &TreeData {
        &self.data
    }

    pub fn into_data(self) -> TreeData {
        self.data
    }

    /// Number of children across both mappings.
    pub fn len(&self) -> usize {
        self.data.blobs.len() + self.data.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.blobs.is_empty() && self.data.trees.is_empty()
    }

    pub fn to_json(&self) -> StoreResult<Vec<u8>> {
        serde_json::to_vec_pretty(&self.data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn from_json(bytes: &[u8]) -> StoreResult<Self> {
        let data: TreeData =
            serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(Self::from_data(data))
    }
}

impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for Tree {}

/// Accumulates children for a [`Tree`].
///
/// Adding a name twice to the same mapping keeps the last hash.
#[derive(Clone, Debug, Default)]
pub struct TreeBuilder {
    data: TreeData,
}

impl TreeBuilder {
    pub fn add_blob(&mut self, name: impl Into<String>, blob: &Blob) -> &mut Self {
        self.add_blob_hash(name, blob.hash())
    }

    pub fn add_blob_hash(&mut self, name: impl Into<String>, hash: ObjectHash) -> &mut Self {
        self.data.blobs.insert(name.into(), hash);
        self
    }

    pub fn add_tree(&mut self, name: impl Into<String>, tree: &Tree) -> &mut Self {
        self.add_tree_hash(name, tree.hash())
    }

    pub fn add_tree_hash(&mut self, name: impl Into<String>, hash: ObjectHash) -> &mut Self {
        self.data.trees.insert(name.into(), hash);
        self
    }

    pub fn build(&self) -> Tree {
        Tree::from_data(self.data.clone())
    }
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

/// Field of a commit document holding its storage key.
pub const COMMIT_HASH_FIELD: &str = "commitHash";

/// Opaque commit document.
///
/// Only the `commitHash` field is read; everything else is stored verbatim.
/// Referenced trees are not checked for existence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    hash: ObjectHash,
    document: Map<String, Value>,
}

impl Commit {
    pub fn from_document(document: Map<String, Value>) -> StoreResult<Self> {
        let raw = match document.get(COMMIT_HASH_FIELD) {
            Some(Value::String(raw)) => raw,
            Some(_) => {
                return Err(StoreError::InvalidCommit(format!(
                    "{COMMIT_HASH_FIELD} must be a string"
                )))
            }
            None => {
                return Err(StoreError::InvalidCommit(format!(
                    "missing {COMMIT_HASH_FIELD}"
                )))
            }
        };
        let hash = ObjectHash::from_hex(raw)?;
        Ok(Self { hash, document })
    }

    pub fn from_value(value: Value) -> StoreResult<Self> {
        match value {
            Value::Object(document) => Self::from_document(document),
            _ => Err(StoreError::InvalidCommit("commit must be an object".into())),
        }
    }

    pub fn hash(&self) -> ObjectHash {
        self.hash
    }

    pub fn document(&self) -> &Map<String, Value> {
        &self.document
    }

    pub fn into_document(self) -> Map<String, Value> {
        self.document
    }

    pub fn to_json(&self) -> StoreResult<Vec<u8>> {
        serde_json::to_vec_pretty(&self.document)
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn from_json(bytes: &[u8]) -> StoreResult<Self> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Self::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn h(data: &[u8]) -> ObjectHash {
        compute_hash(data)
    }

    #[test]
    fn blob_hash_is_sha1_of_content() {
        let blob = Blob::new(b"hello".to_vec());
        assert_eq!(blob.hash().to_hex(), "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d");
        assert!(blob.verify());
    }

    #[test]
    fn blob_from_parts_may_not_verify() {
        let blob = Blob::from_parts(h(b"other"), b"hello".to_vec());
        assert!(!blob.verify());
    }

    #[test]
    fn tree_hash_independent_of_insertion_order() {
        let blob = Blob::new(b"b".to_vec());
        let sub = Tree::builder().add_blob("inner", &Blob::new(b"x".to_vec())).build();

        let first = Tree::builder().add_blob("b", &blob).add_tree("a", &sub).build();
        let second = Tree::builder().add_tree("a", &sub).add_blob("b", &blob).build();
        assert_eq!(first.hash(), second.hash());
    }

    #[test]
    fn tree_hash_orders_by_name_not_hash() {
        let tree = Tree::builder()
            .add_blob_hash("z", h(b"1"))
            .add_blob_hash("a", h(b"2"))
            .build();
        let mut hasher = ContentHasher::new();
        hasher.update_hash(&h(b"2")).update_hash(&h(b"1"));
        assert_eq!(tree.hash(), hasher.finalize());
    }

    #[test]
    fn tree_hash_orders_names_by_code_point() {
        // UTF-16 would put the astral name first (0xD83D < 0xFFFD).
        let bmp = "\u{FFFD}.txt";
        let astral = "\u{1F600}.txt";
        let tree = Tree::builder()
            .add_blob_hash(astral, h(b"astral"))
            .add_blob_hash(bmp, h(b"bmp"))
            .build();
        assert_eq!(
            tree.blobs().keys().map(String::as_str).collect::<Vec<_>>(),
            vec![bmp, astral]
        );
        let mut hasher = ContentHasher::new();
        hasher.update_hash(&h(b"bmp")).update_hash(&h(b"astral"));
        assert_eq!(tree.hash(), hasher.finalize());
    }

    #[test]
    fn tree_hash_places_blobs_before_subtrees() {
        let tree = Tree::builder()
            .add_tree_hash("a", h(b"t"))
            .add_blob_hash("z", h(b"b"))
            .build();
        let mut hasher = ContentHasher::new();
        hasher.update_hash(&h(b"b")).update_hash(&h(b"t"));
        assert_eq!(tree.hash(), hasher.finalize());
    }

    #[test]
    fn empty_tree_hashes_empty_input() {
        let tree = Tree::empty();
        assert!(tree.is_empty());
        assert_eq!(tree.hash(), h(b""));
    }

    #[test]
    fn known_hash_is_not_recomputed() {
        let data = TreeData::default();
        let key = h(b"some key");
        let tree = Tree::with_known_hash(data, key);
        assert_eq!(tree.hash(), key);
        assert_eq!(tree.compute_hash(), h(b""));
    }

    #[test]
    fn tree_json_layout() {
        let tree = Tree::builder()
            .add_blob_hash("file.txt", h(b"f"))
            .add_tree_hash("src", h(b"s"))
            .build();
        let value: Value = serde_json::from_slice(&tree.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "blobs": {"file.txt": h(b"f").to_hex()},
                "trees": {"src": h(b"s").to_hex()},
            })
        );
    }

    #[test]
    fn tree_json_missing_mappings_default_to_empty() {
        let tree = Tree::from_json(br#"{"blobs": {}}"#).unwrap();
        assert!(tree.trees().is_empty());
        assert!(tree.blobs().is_empty());
    }

    #[test]
    fn tree_json_rejects_bad_hash() {
        let err = Tree::from_json(br#"{"blobs": {"a": "nope"}, "trees": {}}"#).unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }

    #[test]
    fn duplicate_name_keeps_last() {
        let tree = Tree::builder()
            .add_blob_hash("a", h(b"1"))
            .add_blob_hash("a", h(b"2"))
            .build();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.blob("a"), Some(&h(b"2")));
    }

    #[test]
    fn commit_requires_hash_field() {
        let err = Commit::from_value(json!({"message": "hi"})).unwrap_err();
        assert!(matches!(err, StoreError::InvalidCommit(_)));

        let err = Commit::from_value(json!({"commitHash": 7})).unwrap_err();
        assert!(matches!(err, StoreError::InvalidCommit(_)));

        let err = Commit::from_value(json!({"commitHash": "../x"})).unwrap_err();
        assert!(matches!(err, StoreError::InvalidIdentifier(_)));
    }

    #[test]
    fn commit_keeps_document_verbatim() {
        let hash = h(b"commit");
        let doc = json!({
            "commitHash": hash.to_hex(),
            "rootTree": "does-not-need-to-exist",
            "message": "initial",
        });
        let commit = Commit::from_value(doc.clone()).unwrap();
        assert_eq!(commit.hash(), hash);
        let reparsed: Value = serde_json::from_slice(&commit.to_json().unwrap()).unwrap();
        assert_eq!(reparsed, doc);
    }

    #[test]
    fn object_kind_layout_names() {
        let hash = h(b"x");
        assert_eq!(ObjectKind::Blob.dir_name(), ".blobs");
        assert_eq!(ObjectKind::Tree.file_name(&hash), format!("tree_{hash}.json"));
        assert_eq!(ObjectKind::Commit.file_name(&hash), format!("commit_{hash}.json"));
        assert_eq!(format!("{}", ObjectKind::Blob), "blob");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn tree_hash_ignores_insertion_order(
                names in prop::collection::btree_set("[a-z]{1,8}", 1..16),
                seed in any::<u64>(),
            ) {
                let children: Vec<(String, ObjectHash)> = names
                    .into_iter()
                    .map(|n| { let hash = compute_hash(n.as_bytes()); (n, hash) })
                    .collect();
                let mut shuffled = children.clone();
                let len = shuffled.len();
                shuffled.rotate_left((seed as usize) % len);
                shuffled.reverse();

                let mut forward = Tree::builder();
                for (name, hash) in &children {
                    forward.add_blob_hash(name.clone(), *hash);
                }
                let mut reordered = Tree::builder();
                for (name, hash) in &shuffled {
                    reordered.add_blob_hash(name.clone(), *hash);
                }
                prop_assert_eq!(forward.build().hash(), reordered.build().hash());
            }
        }
    }
}
