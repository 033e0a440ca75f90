//! Engine construction contract
//!
//! An engine is the external reasoning loop that decides which tools to call.
//! A factory builds one from the agent's complete tool set; it is called once
//! per build and only ever sees the tools through a shared borrow.

use async_trait::async_trait;

use crate::tools::ToolRegistry;
use crate::BoxError;

/// A ready-to-run agent loop
#[async_trait]
pub trait Engine: Send + Sync {
    /// Drive the loop on `input` until it stops on its own.
    async fn run(&self, input: &str) -> Result<String, BoxError>;
}

/// Builds an engine bound to a tool set
pub trait AgentFactory: Send + Sync {
    fn build(&self, tools: &ToolRegistry) -> crate::Result<Box<dyn Engine>>;
}

impl<F> AgentFactory for F
where
    F: Fn(&ToolRegistry) -> crate::Result<Box<dyn Engine>> + Send + Sync,
{
    fn build(&self, tools: &ToolRegistry) -> crate::Result<Box<dyn Engine>> {
        self(tools)
    }
}

/// Pins a closure to the factory signature so its argument types are inferred
pub fn factory_fn<F>(f: F) -> F
where
    F: Fn(&ToolRegistry) -> crate::Result<Box<dyn Engine>> + Send + Sync,
{
    f
}
