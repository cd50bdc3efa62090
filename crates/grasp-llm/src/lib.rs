pub mod anthropic;
pub mod mock;

pub use anthropic::{AnthropicConfig, AnthropicInvoker};
pub use mock::{MockInvoker, MockResponse};
