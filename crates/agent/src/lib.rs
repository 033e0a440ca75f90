//! HANDOFF: gated agents
//!
//! Wraps an externally supplied agent engine so that its run can only end
//! through a validated submission to the output gate.

use thiserror::Error;

pub mod factory;
pub mod output;
pub mod react;
pub mod runner;
pub mod tools;

pub use factory::{factory_fn, AgentFactory, Engine};
pub use output::{
    FnOutputHandler, GatePhase, OutputHandler, OutputSubmissionGate, RecoverableKinds,
    RequireFields, SubmissionContext,
};
pub use react::{react_factory, ReactConfig, ReactEngine};
pub use runner::{AgentBuilder, AgentRunner};
pub use tools::{FnTool, ToolAdapter, ToolDescriptor, ToolRegistry};

/// Error type tools, handlers and engines hand back across trait boundaries
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("◆ TOOL NOT FOUND: {0}")]
    ToolNotFound(String),

    #[error("◆ DUPLICATE TOOL: {0}")]
    DuplicateTool(String),

    #[error("◆ TOOLS LOCKED: agent '{0}' is already materialized")]
    ToolsLocked(String),

    #[error("◆ NO AGENT FACTORY CONFIGURED FOR '{0}'")]
    MissingFactory(String),

    #[error("◆ INVALID ARGUMENTS: {0}")]
    InvalidArguments(String),

    #[error("◆ OUTPUT BUDGET EXCEEDED: {max_iterations} submission attempts used")]
    IterationBudgetExceeded { max_iterations: u32 },

    #[error("◆ OUTPUT REJECTED: {0}")]
    OutputRejected(#[source] BoxError),

    #[error("◆ OUTPUT GATE CLOSED AFTER A FATAL REJECTION")]
    GateClosed,

    #[error("◆ OUTPUT GATE BUSY: bound to a run of agent '{0}'")]
    GateBusy(String),

    #[error("◆ AGENT '{agent}' FINISHED WITHOUT SUBMITTING OUTPUT")]
    UnvalidatedTermination { agent: String },

    #[error("◆ ENGINE FAILURE: {0}")]
    Engine(#[source] BoxError),

    #[error("◆ PROVIDER ERROR: {0}")]
    Provider(#[from] handoff_provider::ProviderError),
}

impl AgentError {
    /// Whether an engine must abort its loop when a tool returns this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AgentError::IterationBudgetExceeded { .. }
                | AgentError::OutputRejected(_)
                | AgentError::GateClosed
                | AgentError::UnvalidatedTermination { .. }
                | AgentError::Engine(_)
                | AgentError::Provider(_)
        )
    }

    /// Recover the typed error from a boxed one, wrapping foreign errors.
    pub fn from_boxed(err: BoxError) -> Self {
        match err.downcast::<AgentError>() {
            Ok(agent_err) => *agent_err,
            Err(other) => AgentError::Engine(other),
        }
    }
}

/// True when a boxed tool error carries a fatal `AgentError`.
pub fn is_fatal(err: &BoxError) -> bool {
    err.downcast_ref::<AgentError>()
        .map(AgentError::is_fatal)
        .unwrap_or(false)
}

/// Submission rejected in a way the agent can fix by trying again.
///
/// This is the default recoverable kind of every output gate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct InvalidOutput(pub String);

impl InvalidOutput {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AgentError::IterationBudgetExceeded { max_iterations: 3 };
        assert_eq!(
            err.to_string(),
            "◆ OUTPUT BUDGET EXCEEDED: 3 submission attempts used"
        );

        let err = AgentError::UnvalidatedTermination {
            agent: "writer".to_string(),
        };
        assert!(err.to_string().contains("'writer'"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(AgentError::IterationBudgetExceeded { max_iterations: 1 }.is_fatal());
        assert!(AgentError::GateClosed.is_fatal());
        assert!(!AgentError::ToolNotFound("x".to_string()).is_fatal());
        assert!(!AgentError::InvalidArguments("x".to_string()).is_fatal());
        assert!(!AgentError::GateBusy("x".to_string()).is_fatal());
    }

    #[test]
    fn test_from_boxed_round_trips_agent_errors() {
        let boxed: BoxError = Box::new(AgentError::GateClosed);
        assert!(is_fatal(&boxed));
        assert!(matches!(AgentError::from_boxed(boxed), AgentError::GateClosed));

        let foreign: BoxError = "engine crashed".into();
        assert!(!is_fatal(&foreign));
        match AgentError::from_boxed(foreign) {
            AgentError::Engine(source) => assert_eq!(source.to_string(), "engine crashed"),
            other => panic!("Expected Engine, got {:?}", other),
        }
    }

    #[test]
    fn test_output_rejected_keeps_source() {
        use std::error::Error as _;

        let err = AgentError::OutputRejected(Box::new(InvalidOutput::new("nope")));
        let source = err.source().expect("source");
        assert!(source.is::<InvalidOutput>());
    }
}
