//! Depth-bounded recursive listing on top of [`FileOps`].

use std::collections::HashSet;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::ObjectType;
use crate::connection::ConnectionDescriptor;
use crate::error::Result;
use crate::filter::FilterKind;
use crate::model::ListRequest;
use crate::ops::FileOps;
use crate::utils::join_path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkRequest {
    pub path: String,
    pub filter: FilterKind,
    pub pattern: String,
    /// Levels below `path` to descend into; 0 lists only `path` itself.
    pub max_depth: u32,
    /// Relative subdirectory paths to skip entirely.
    pub exclude: Vec<String>,
    pub stop_on_first: bool,
}

struct Walk<'a> {
    ops: &'a FileOps,
    request: &'a WalkRequest,
    server: &'a ConnectionDescriptor,
    exclude: HashSet<String>,
}

impl Walk<'_> {
    fn visit(&self, relative: String, depth: u32) -> BoxFuture<'_, Result<Vec<String>>> {
        async move {
            let dir = join_path(&[self.request.path.as_str(), relative.as_str()]);
            let files = ListRequest::new(dir.clone()).filtered(self.request.filter, self.request.pattern.clone());
            let mut matches: Vec<String> = self
                .ops
                .list(&files, self.server)
                .await?
                .files
                .into_iter()
                .map(|name| join_path(&[relative.as_str(), name.as_str()]))
                .collect();

            if self.request.stop_on_first && !matches.is_empty() {
                return Ok(matches);
            }
            if depth >= self.request.max_depth {
                return Ok(matches);
            }

            let dirs = ListRequest::new(dir).object_type(ObjectType::Directories);
            for name in self.ops.list(&dirs, self.server).await?.files {
                let child = join_path(&[relative.as_str(), name.as_str()]);
                if self.exclude.contains(child.trim_matches('/')) {
                    debug!(path = %child, "skipping excluded directory");
                    continue;
                }

                matches.extend(self.visit(child, depth + 1).await?);
                if self.request.stop_on_first && !matches.is_empty() {
                    break;
                }
            }
            Ok(matches)
        }
        .boxed()
    }
}

impl FileOps {
    /// Lists matching files under `request.path` and its subdirectories.
    /// Returned paths are relative to `request.path`.
    pub async fn walk(&self, request: &WalkRequest, server: &ConnectionDescriptor) -> Result<Vec<String>> {
        let walk = Walk {
            ops: self,
            request,
            server,
            exclude: request
                .exclude
                .iter()
                .map(|path| path.trim_matches('/').to_string())
                .collect(),
        };
        walk.visit(String::new(), 0).await
    }
}
