//! Repository operations for registry client
//!
//! Implements Docker Registry v2 tag listing (GET /v2/{name}/tags/list).

use super::{authorized_headers, tags_path, validate_repository};
use crate::config::RegistryEndpoint;
use crate::error::handlers::HttpErrorHandler;
use crate::error::{RegistryError, Result};
use crate::image::TagList;
use crate::logging::Logger;
use crate::registry::auth::AuthService;
use crate::registry::executor::HttpExecutor;

#[derive(Clone)]
pub struct RepositoryOperations {
    executor: HttpExecutor,
    auth: AuthService,
    output: Logger,
}

impl RepositoryOperations {
    pub fn new(executor: HttpExecutor, auth: AuthService, output: Logger) -> Self {
        Self {
            executor,
            auth,
            output,
        }
    }

    /// One page of tags; `n` limits the page size and `last` continues after a tag
    pub async fn list_tags(
        &self,
        endpoint: &RegistryEndpoint,
        repository: &str,
        n: Option<u32>,
        last: Option<&str>,
        scope: &str,
    ) -> Result<TagList> {
        validate_repository(repository)?;
        let headers = authorized_headers(&self.auth, endpoint, repository, scope).await?;

        let last = last.filter(|value| !value.trim().is_empty());
        let mut url = endpoint.url(&tags_path(repository))?;
        if n.is_some() || last.is_some() {
            let mut query = url.query_pairs_mut();
            if let Some(n) = n {
                query.append_pair("n", &n.to_string());
            }
            if let Some(last) = last {
                query.append_pair("last", last);
            }
        }

        self.output.verbose(&format!("Listing tags for {}", repository));
        let response = self.executor.get(&url, headers).await?;
        if !response.is_success() {
            return Err(HttpErrorHandler::handle_registry_error(
                response.status,
                "Tag listing",
                repository,
            ));
        }

        let body = response.bytes().await?;
        let tags: TagList = serde_json::from_slice(&body).map_err(|e| {
            RegistryError::Parse(format!("Failed to parse tag list for {}: {}", repository, e))
        })?;
        self.output
            .detail(&format!("Found {} tags in {}", tags.tags.len(), tags.name));
        Ok(tags)
    }
}
