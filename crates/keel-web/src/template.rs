//! Pluggable page rendering.

use crate::WebError;
use async_trait::async_trait;

/// Renders named templates. The framework ships no engine of its own;
/// anything that can turn a name plus data into bytes slots in here, and
/// [`crate::Context::render`] consults it.
#[async_trait]
pub trait TemplateEngine: Send + Sync {
    async fn render(
        &self,
        template_name: &str,
        data: &serde_json::Value,
    ) -> Result<Vec<u8>, WebError>;
}
