use depot_pack::ArchiveExporter;
use depot_protocol::{decode_content, ProtocolError, Request, Response};
use depot_store::{Commit, ObjectStore, RepositoryManager, Tree};
use tracing::{debug, error, info, warn};

use crate::config::{CompatConfig, ServerConfig};
use crate::error::{ServerError, ServerResult};

/// Turns one raw request into the response parts to send back.
///
/// Every failure is recovered here: it is logged and answered with the
/// acknowledgement (or an error document when `report_errors` is set), so a
/// bad request never takes down the connection loop.
#[derive(Clone, Debug)]
pub struct ProtocolHandler {
    manager: RepositoryManager,
    store: ObjectStore,
    exporter: ArchiveExporter,
    compat: CompatConfig,
}

impl ProtocolHandler {
    pub fn new(manager: RepositoryManager, store: ObjectStore, compat: CompatConfig) -> Self {
        Self {
            manager,
            store,
            exporter: ArchiveExporter::new(),
            compat,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            RepositoryManager::new(&config.repos_root),
            ObjectStore::with_verification(config.verify_hashes),
            config.compat.clone(),
        )
    }

    pub fn manager(&self) -> &RepositoryManager {
        &self.manager
    }

    /// Handle one request document. Blocks on filesystem work.
    pub fn handle(&self, raw: &[u8]) -> Vec<Response> {
        let request = match Request::parse(raw) {
            Ok(request) => request,
            Err(e) => return self.reject(&e),
        };

        let action = request.action();
        match self.dispatch(request) {
            Ok(response) => self.respond(response),
            Err(e @ ServerError::Archive(_)) => {
                warn!(action, kind = e.kind(), error = %e, "archive failed, no payload sent");
                if self.compat.report_errors {
                    vec![Response::Error(e.to_string())]
                } else if self.compat.trailing_ack {
                    vec![Response::Ack]
                } else {
                    Vec::new()
                }
            }
            Err(e) => {
                if e.is_internal() {
                    error!(action, kind = e.kind(), error = %e, "request failed");
                } else {
                    warn!(action, kind = e.kind(), error = %e, "request rejected");
                }
                self.failure(e.to_string())
            }
        }
    }

    /// Response for a request that could not be read or parsed.
    pub fn reject(&self, error: &ProtocolError) -> Vec<Response> {
        match error {
            ProtocolError::UnsupportedAction(action) => {
                warn!(action = %action, "unsupported action")
            }
            ProtocolError::Io(e) => error!(error = %e, "failed to read request"),
            other => warn!(error = %other, "malformed request"),
        }
        self.failure(error.to_string())
    }

    /// Perform the request's effect.
    pub fn dispatch(&self, request: Request) -> ServerResult<Response> {
        match request {
            Request::StoreBlob {
                repository_name,
                blob_hash,
                content,
            } => {
                let bytes = decode_content(&content)?;
                let repo = self.manager.ensure_repository(&repository_name)?;
                self.store.store_blob(&repo, &blob_hash, &bytes)?;
                info!(repository = %repository_name, hash = %blob_hash, size = bytes.len(), "blob stored");
                Ok(Response::Ack)
            }
            Request::StoreTree {
                repository_name,
                tree_hash,
                tree_data,
            } => {
                let tree = Tree::from_data(tree_data);
                let repo = self.manager.ensure_repository(&repository_name)?;
                self.store.store_tree(&repo, &tree_hash, &tree)?;
                info!(repository = %repository_name, hash = %tree_hash, entries = tree.len(), "tree stored");
                Ok(Response::Ack)
            }
            Request::Commit {
                repository_name,
                commit,
            } => {
                let commit = Commit::from_document(commit)?;
                let repo = self.manager.ensure_repository(&repository_name)?;
                self.store.store_commit(&repo, &commit)?;
                info!(repository = %repository_name, hash = %commit.hash(), "commit stored");
                Ok(Response::Ack)
            }
            Request::PullRepository { repository_name } => {
                // Never created by a pull.
                let repo = self.manager.repository(&repository_name);
                let archive = self.exporter.export(&repo)?;
                info!(repository = %repository_name, bytes = archive.len(), "repository pulled");
                Ok(Response::Archive(archive))
            }
            Request::ListRepositories => {
                let names = self.manager.list_repositories()?;
                debug!(count = names.len(), "repositories listed");
                Ok(Response::Repositories(names))
            }
        }
    }

    fn respond(&self, response: Response) -> Vec<Response> {
        match response {
            Response::Ack => vec![Response::Ack],
            payload if self.compat.trailing_ack => vec![payload, Response::Ack],
            payload => vec![payload],
        }
    }

    fn failure(&self, message: String) -> Vec<Response> {
        if self.compat.report_errors {
            vec![Response::Error(message)]
        } else {
            vec![Response::Ack]
        }
    }
}
