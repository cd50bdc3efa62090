use async_trait::async_trait;

use crate::errors::InvocationError;

/// Boundary to the language model.
///
/// Implementations return the raw response text; callers parse it with
/// [`crate::decision::Decision::parse`] and enforce their own timeout.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(&self, prompt: &str) -> Result<String, InvocationError>;
}
