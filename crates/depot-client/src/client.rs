use std::path::Path;
use std::time::Duration;

use depot_protocol::{
    is_ack, DepotCodec, ErrorDocument, Framing, RepositoryList, Request, ACK_TEXT,
};
use depot_store::{Blob, Commit, Tree};
use depot_types::{ObjectHash, RepoName};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::commit::CommitProposal;
use crate::error::{ClientError, ClientResult};
use crate::worktree::snapshot_directory;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Result of [`DepotClient::push_directory`].
#[derive(Clone, Debug)]
pub struct PushSummary {
    pub commit: ObjectHash,
    pub root_tree: ObjectHash,
    pub blobs: usize,
    pub trees: usize,
}

/// Talks to a depot server, one connection per request.
#[derive(Clone, Debug)]
pub struct DepotClient {
    addr: String,
    codec: DepotCodec,
    timeout: Duration,
}

impl DepotClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            codec: DepotCodec::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.codec = self.codec.with_framing(framing);
        self
    }

    /// Bound on each response part, pulled archives included.
    pub fn with_max_response_size(mut self, max: usize) -> Self {
        self.codec = self.codec.with_max_response_size(max);
        self
    }

    /// Bound on one whole exchange: connect, send, and read to close.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub async fn store_blob(&self, repo: &RepoName, blob: &Blob) -> ClientResult<()> {
        self.expect_ack(&Request::store_blob(repo.clone(), blob)).await
    }

    pub async fn store_tree(&self, repo: &RepoName, tree: &Tree) -> ClientResult<()> {
        self.expect_ack(&Request::store_tree(repo.clone(), tree)).await
    }

    pub async fn commit(&self, repo: &RepoName, commit: &Commit) -> ClientResult<()> {
        self.expect_ack(&Request::commit(repo.clone(), commit)).await
    }

    /// Fetch the repository archive. Unpack it with
    /// [`depot_pack::unpack_archive`].
    pub async fn pull_repository(&self, repo: &RepoName) -> ClientResult<Vec<u8>> {
        let request = Request::pull(repo.clone());
        let payload = self.payload(&request).await?;
        if payload.is_empty() {
            return Err(ClientError::EmptyResponse(repo.to_string()));
        }
        Ok(payload)
    }

    pub async fn list_repositories(&self) -> ClientResult<Vec<String>> {
        let request = Request::ListRepositories;
        let payload = self.payload(&request).await?;
        let list: RepositoryList =
            serde_json::from_slice(&payload).map_err(|e| ClientError::UnexpectedResponse {
                action: request.action(),
                detail: e.to_string(),
            })?;
        Ok(list.repositories)
    }

    /// Upload the contents of `dir` as a new commit of `repo`.
    ///
    /// Blobs go first, then trees children-first, then the commit, so the
    /// server never holds a tree referencing an object that was not sent.
    pub async fn push_directory(
        &self,
        repo: &RepoName,
        dir: &Path,
        proposal: &CommitProposal,
    ) -> ClientResult<PushSummary> {
        let snapshot = snapshot_directory(dir)?;
        for blob in snapshot.blobs.values() {
            self.store_blob(repo, blob).await?;
        }
        for tree in &snapshot.trees {
            self.store_tree(repo, tree).await?;
        }
        let commit = proposal.build(snapshot.root_hash())?;
        self.commit(repo, &commit).await?;

        let summary = PushSummary {
            commit: commit.hash(),
            root_tree: snapshot.root_hash(),
            blobs: snapshot.blobs.len(),
            trees: snapshot.trees.len(),
        };
        info!(
            repository = %repo,
            commit = %summary.commit,
            blobs = summary.blobs,
            trees = summary.trees,
            "directory pushed"
        );
        Ok(summary)
    }

    /// Send one request and collect every response part.
    pub async fn exchange(&self, request: &Request) -> ClientResult<Vec<Vec<u8>>> {
        let body = request.to_json()?;
        let parts = timeout(self.timeout, async {
            let mut stream = TcpStream::connect(&self.addr).await?;
            self.codec.write_message(&mut stream, &body).await?;
            let parts = self.codec.read_all(&mut stream).await?;
            // Server closes first; ignore errors from the already-finished socket.
            let _ = stream.shutdown().await;
            Ok::<_, ClientError>(parts)
        })
        .await
        .map_err(|_| ClientError::Timeout(self.timeout))??;
        debug!(action = request.action(), parts = parts.len(), "exchange finished");
        Ok(parts)
    }

    async fn expect_ack(&self, request: &Request) -> ClientResult<()> {
        let parts = self.exchange(request).await?;
        match parts.first() {
            Some(part) if is_ack(part) => Ok(()),
            Some(part) => Err(rejection(request.action(), part)),
            None => Err(ClientError::UnexpectedResponse {
                action: request.action(),
                detail: "connection closed without a response".into(),
            }),
        }
    }

    /// The payload part, with any trailing acknowledgement removed.
    async fn payload(&self, request: &Request) -> ClientResult<Vec<u8>> {
        let mut parts = self.exchange(request).await?;
        if parts.len() > 1 && parts.last().is_some_and(|p| is_ack(p)) {
            parts.pop();
        }
        let Some(mut payload) = parts.into_iter().next() else {
            return Ok(Vec::new());
        };
        if is_ack(&payload) {
            // Only an acknowledgement: the server hit an error it does not report.
            return Ok(Vec::new());
        }
        if let Ok(doc) = serde_json::from_slice::<ErrorDocument>(&payload) {
            if doc.action == depot_protocol::actions::ERROR {
                return Err(ClientError::Rejected(doc.message));
            }
        }
        // Unframed responses carry the trailing acknowledgement inline.
        if self.codec.framing() == Framing::Unframed && payload.ends_with(ACK_TEXT.as_bytes()) {
            payload.truncate(payload.len() - ACK_TEXT.len());
        }
        Ok(payload)
    }
}

fn rejection(action: &'static str, part: &[u8]) -> ClientError {
    match serde_json::from_slice::<ErrorDocument>(part) {
        Ok(doc) => ClientError::Rejected(doc.message),
        Err(_) => ClientError::UnexpectedResponse {
            action,
            detail: String::from_utf8_lossy(part).into_owned(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_server::{DepotServer, ServerConfig};
    use std::fs;
    use std::net::SocketAddr;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;

    struct Running {
        addr: SocketAddr,
        stop: oneshot::Sender<()>,
        handle: JoinHandle<depot_server::ServerResult<()>>,
    }

    impl Running {
        async fn stop(self) {
            self.stop.send(()).unwrap();
            self.handle.await.unwrap().unwrap();
        }
    }

    async fn start(config: ServerConfig) -> Running {
        let server = DepotServer::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve_with_shutdown(async move {
            let _ = stopped.await;
        }));
        Running { addr, stop, handle }
    }

    fn config(root: &Path) -> ServerConfig {
        ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            repos_root: root.to_path_buf(),
            ..ServerConfig::default()
        }
    }

    fn worktree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("README.md"), b"# demo\n").unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/lib.rs"), b"pub fn demo() {}\n").unwrap();
        fs::write(dir.path().join("src/data.bin"), [0u8, 159, 146, 150, 255]).unwrap();
        dir
    }

    fn demo() -> RepoName {
        RepoName::new("demo").unwrap()
    }

    #[tokio::test]
    async fn push_then_pull_roundtrip() {
        let root = tempfile::tempdir().unwrap();
        let server = start(config(root.path())).await;
        let client = DepotClient::new(server.addr.to_string());
        let tree = worktree();

        let summary = client
            .push_directory(&demo(), tree.path(), &CommitProposal::new("first").with_author("ada"))
            .await
            .unwrap();
        assert_eq!(summary.blobs, 3);
        assert_eq!(summary.trees, 2);

        assert_eq!(client.list_repositories().await.unwrap(), vec!["demo".to_string()]);

        let archive = client.pull_repository(&demo()).await.unwrap();
        let out = tempfile::tempdir().unwrap();
        depot_pack::unpack_archive(&archive, out.path()).unwrap();

        let store = depot_store::ObjectStore::new();
        let repo = depot_store::RepositoryManager::new(out.path())
            .open_repository(&demo())
            .unwrap();
        let commit = store.load_commit(&repo, &summary.commit).unwrap();
        assert_eq!(commit.document()["message"], "first");
        assert_eq!(commit.document()["rootTree"], summary.root_tree.to_hex());

        let root_tree = store.load_tree(&repo, &summary.root_tree).unwrap();
        let readme = root_tree.blob("README.md").unwrap();
        assert_eq!(store.load_blob(&repo, readme).unwrap().content(), b"# demo\n");
        let src = store.load_tree(&repo, root_tree.subtree("src").unwrap()).unwrap();
        let data = store.load_blob(&repo, src.blob("data.bin").unwrap()).unwrap();
        assert_eq!(data.content(), [0u8, 159, 146, 150, 255]);

        server.stop().await;
    }

    #[tokio::test]
    async fn pull_unknown_repository() {
        let root = tempfile::tempdir().unwrap();
        let server = start(config(root.path())).await;
        let client = DepotClient::new(server.addr.to_string());

        let err = client
            .pull_repository(&RepoName::new("ghost").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::EmptyResponse(name) if name == "ghost"));
        assert!(client.list_repositories().await.unwrap().is_empty());

        server.stop().await;
    }

    #[tokio::test]
    async fn rejected_blob_is_reported_when_server_reports_errors() {
        let root = tempfile::tempdir().unwrap();
        let mut cfg = config(root.path());
        cfg.compat.report_errors = true;
        let server = start(cfg).await;
        let client = DepotClient::new(server.addr.to_string());

        let forged = Blob::from_parts(ObjectHash::digest(b"other"), b"hello".to_vec());
        let err = client.store_blob(&demo(), &forged).await.unwrap_err();
        assert!(matches!(err, ClientError::Rejected(msg) if msg.contains("hash mismatch")));

        server.stop().await;
    }

    #[tokio::test]
    async fn unframed_server_with_trailing_ack() {
        let root = tempfile::tempdir().unwrap();
        let mut cfg = config(root.path());
        cfg.framing = Framing::Unframed;
        cfg.compat.trailing_ack = true;
        let server = start(cfg).await;
        let client = DepotClient::new(server.addr.to_string()).with_framing(Framing::Unframed);

        let tree = worktree();
        client
            .push_directory(&demo(), tree.path(), &CommitProposal::new("legacy"))
            .await
            .unwrap();
        assert_eq!(client.list_repositories().await.unwrap(), vec!["demo".to_string()]);

        let archive = client.pull_repository(&demo()).await.unwrap();
        let entries = depot_pack::archive_entries(&archive).unwrap();
        assert!(entries.iter().any(|p| p.starts_with("demo/.commits")));

        server.stop().await;
    }

    #[tokio::test]
    async fn repository_larger_than_request_limit_still_pulls() {
        let root = tempfile::tempdir().unwrap();
        let mut cfg = config(root.path());
        cfg.max_message_size = 4096;
        let server = start(cfg).await;
        let client = DepotClient::new(server.addr.to_string());

        let tree = tempfile::tempdir().unwrap();
        for (i, fill) in [b'a', b'b', b'c', b'd'].into_iter().enumerate() {
            fs::write(tree.path().join(format!("part{i}")), vec![fill; 2048]).unwrap();
        }
        client
            .push_directory(&demo(), tree.path(), &CommitProposal::new("big"))
            .await
            .unwrap();

        let archive = client.pull_repository(&demo()).await.unwrap();
        assert!(archive.len() > 4 * 2048);
        let out = tempfile::tempdir().unwrap();
        depot_pack::unpack_archive(&archive, out.path()).unwrap();
        let blobs = fs::read_dir(out.path().join("demo/.blobs")).unwrap().count();
        assert_eq!(blobs, 4);

        let capped = client.clone().with_max_response_size(1024);
        assert!(matches!(
            capped.pull_repository(&demo()).await,
            Err(ClientError::Protocol(depot_protocol::ProtocolError::MessageTooLarge { max: 1024, .. }))
        ));

        server.stop().await;
    }

    #[tokio::test]
    async fn unreachable_server_fails() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let client = DepotClient::new(addr.to_string()).with_timeout(Duration::from_secs(2));
        assert!(client.list_repositories().await.is_err());
    }
}
