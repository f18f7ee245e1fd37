// media.rs
//
// Media storage seam. The core only consumes a `media_ref -> local path`
// resolver; upload handling, presigned URLs and bucket layout live with
// the external storage service.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{PipelineError, Result};

/// Resolves an opaque media reference into a locally readable file.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(&self, media_ref: &str) -> Result<PathBuf>;
}

/// Resolver treating the media reference as a filesystem path. Used in
/// deployments where an external fetcher has already staged the upload.
#[derive(Debug, Clone, Default)]
pub struct FileResolver;

#[async_trait]
impl MediaResolver for FileResolver {
    async fn resolve(&self, media_ref: &str) -> Result<PathBuf> {
        let path = PathBuf::from(media_ref);
        if !path.is_file() {
            return Err(PipelineError::corrupt_media(format!(
                "media file not found: {}",
                path.display()
            )));
        }
        Ok(path)
    }
}
