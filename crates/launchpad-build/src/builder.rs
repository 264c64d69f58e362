use std::path::Path;

use async_trait::async_trait;
use launchpad_core::{ImageTag, ProgressSink};

use crate::error::BuildResult;

/// Builds and pushes container images.
///
/// Output lines are forwarded to `progress` as they arrive. Failures carry a
/// bounded tail of the tool output.
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    async fn build(&self, context: &Path, tag: &ImageTag, progress: &ProgressSink) -> BuildResult<()>;

    async fn push(&self, tag: &ImageTag, progress: &ProgressSink) -> BuildResult<()>;
}
