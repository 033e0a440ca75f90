//! Output submission gate
//!
//! The gate is the only tool through which an agent may deliver its final
//! result. Each call runs the user's [`OutputHandler`]:
//!
//! - success captures the value and tells the engine the result is recorded;
//! - a recoverable rejection (see [`RecoverableKinds`]) is returned to the
//!   engine as ordinary tool output so the model can correct itself;
//! - any other rejection, or a call after the attempt budget is spent, fails
//!   with a fatal [`AgentError`] that aborts the run.
//!
//! Once a result is captured, further submissions in the same run are no-ops:
//! the captured value is never replaced and no attempt is consumed.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::error::Error as StdError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use handoff_config::GateDefaults;

use crate::tools::{object_schema, ToolAdapter};
use crate::{AgentError, BoxError, InvalidOutput};

pub const DEFAULT_NAME: &str = "output_handler";
pub const DEFAULT_DESCRIPTION: &str =
    "Output handler. ONLY RETURN THE FINAL RESULT USING THIS TOOL!";
pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

/// Returned to the engine when a submission is accepted
pub const SUBMISSION_ACCEPTED: &str = "Final result recorded.";
/// Returned to the engine when it submits again after success
pub const ALREADY_SUBMITTED: &str =
    "Final result was already recorded. Do not call this tool again.";
/// Appended to the rejection message on the last allowed attempt
pub const NO_ATTEMPTS_LEFT: &str =
    "No submission attempts remain; another call will abort the run.";

/// What the handler knows about the run it is validating
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionContext {
    pub agent: Option<String>,
    pub input: Option<String>,
    /// 1-based number of this attempt
    pub attempt: u32,
    pub max_iterations: u32,
}

impl SubmissionContext {
    pub fn attempts_left(&self) -> u32 {
        self.max_iterations.saturating_sub(self.attempt)
    }

    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_iterations
    }
}

/// User validation of a final result
#[async_trait]
pub trait OutputHandler: Send + Sync {
    fn name(&self) -> &str {
        DEFAULT_NAME
    }

    fn description(&self) -> &str {
        DEFAULT_DESCRIPTION
    }

    /// Declared JSON schema of the submission arguments
    fn parameters(&self) -> Value;

    /// Validate `args` and produce the final result.
    ///
    /// Return an error of a recoverable kind (by default [`InvalidOutput`])
    /// to let the agent try again.
    async fn handle_output(&self, args: Value, ctx: &SubmissionContext)
        -> Result<Value, BoxError>;
}

type HandlerFn = dyn Fn(Value, &SubmissionContext) -> Result<Value, BoxError> + Send + Sync;

/// Handler backed by a closure and an explicit schema
pub struct FnOutputHandler {
    name: String,
    description: String,
    parameters: Value,
    func: Box<HandlerFn>,
}

impl FnOutputHandler {
    pub fn new<F>(parameters: Value, func: F) -> Self
    where
        F: Fn(Value, &SubmissionContext) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self {
            name: DEFAULT_NAME.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            parameters,
            func: Box::new(func),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[async_trait]
impl OutputHandler for FnOutputHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        self.parameters.clone()
    }

    async fn handle_output(
        &self,
        args: Value,
        ctx: &SubmissionContext,
    ) -> Result<Value, BoxError> {
        (self.func)(args, ctx)
    }
}

/// Accepts an object carrying every listed field with a non-empty value.
///
/// A single required field yields that field's value; several yield the
/// object restricted to those fields.
pub struct RequireFields {
    name: String,
    description: String,
    fields: Vec<String>,
}

impl RequireFields {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: DEFAULT_NAME.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    fn is_present(value: Option<&Value>) -> bool {
        match value {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        }
    }
}

#[async_trait]
impl OutputHandler for RequireFields {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        let props: Vec<(&str, &str, bool)> = self
            .fields
            .iter()
            .map(|field| (field.as_str(), "Part of the final result", true))
            .collect();
        object_schema(&props)
    }

    async fn handle_output(
        &self,
        args: Value,
        _ctx: &SubmissionContext,
    ) -> Result<Value, BoxError> {
        let Value::Object(object) = args else {
            return Err(InvalidOutput::new("Submission must be a JSON object.").into());
        };

        let missing: Vec<&str> = self
            .fields
            .iter()
            .filter(|field| !Self::is_present(object.get(field.as_str())))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(InvalidOutput::new(format!(
                "Missing required field(s): {}",
                missing.join(", ")
            ))
            .into());
        }

        if let [only] = self.fields.as_slice() {
            return Ok(object.get(only).cloned().unwrap_or(Value::Null));
        }
        let picked: Map<String, Value> = self
            .fields
            .iter()
            .filter_map(|field| object.get(field).map(|v| (field.clone(), v.clone())))
            .collect();
        Ok(Value::Object(picked))
    }
}

type KindCheck = Arc<dyn Fn(&(dyn StdError + Send + Sync + 'static)) -> bool + Send + Sync>;

/// Error types a gate feeds back to the agent instead of failing the run
#[derive(Clone)]
pub struct RecoverableKinds {
    kinds: Vec<(&'static str, KindCheck)>,
}

impl RecoverableKinds {
    /// No error is recoverable
    pub fn none() -> Self {
        Self { kinds: Vec::new() }
    }

    pub fn only<E: StdError + Send + Sync + 'static>() -> Self {
        Self::none().with::<E>()
    }

    pub fn with<E: StdError + Send + Sync + 'static>(mut self) -> Self {
        let check: KindCheck =
            Arc::new(|err: &(dyn StdError + Send + Sync + 'static)| err.is::<E>());
        self.kinds.push((std::any::type_name::<E>(), check));
        self
    }

    pub fn contains(&self, err: &(dyn StdError + Send + Sync + 'static)) -> bool {
        self.kinds.iter().any(|(_, check)| check(err))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.kinds.iter().map(|(name, _)| *name).collect()
    }
}

impl Default for RecoverableKinds {
    fn default() -> Self {
        Self::only::<InvalidOutput>()
    }
}

impl std::fmt::Debug for RecoverableKinds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Where the gate stands within the current run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatePhase {
    #[default]
    Waiting,
    Succeeded,
    Failed,
}

/// First terminal failure of a run, kept so the runner can report it even
/// when the engine swallowed the error
#[derive(Debug, Clone, PartialEq, Eq)]
enum Failure {
    BudgetExceeded,
    Rejected(String),
}

#[derive(Debug, Default)]
struct GateState {
    phase: GatePhase,
    attempts: u32,
    captured: Option<Value>,
    failure: Option<Failure>,
    agent: Option<String>,
    input: Option<String>,
}

impl GateState {
    fn fail(&mut self, failure: Failure) {
        self.phase = GatePhase::Failed;
        if self.failure.is_none() {
            self.failure = Some(failure);
        }
    }
}

enum Admission {
    Proceed(SubmissionContext),
    AlreadySubmitted,
}

enum Verdict {
    Accepted(Value),
    Retry(String),
    Fatal(BoxError),
}

/// Tool that validates and captures an agent's final result
pub struct OutputSubmissionGate {
    handler: Arc<dyn OutputHandler>,
    max_iterations: u32,
    recoverable: RecoverableKinds,
    state: Mutex<GateState>,
}

impl OutputSubmissionGate {
    pub fn new<H: OutputHandler + 'static>(handler: H) -> Self {
        Self::from_arc(Arc::new(handler))
    }

    pub fn from_arc(handler: Arc<dyn OutputHandler>) -> Self {
        Self {
            handler,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            recoverable: RecoverableKinds::default(),
            state: Mutex::new(GateState::default()),
        }
    }

    /// Gate with the attempt budget taken from configuration
    pub fn configured<H: OutputHandler + 'static>(handler: H, defaults: &GateDefaults) -> Self {
        Self::new(handler).with_max_iterations(defaults.max_iterations)
    }

    /// Set the attempt budget; zero is raised to one
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        if max_iterations == 0 {
            warn!("◆ OUTPUT GATE BUDGET OF 0 RAISED TO 1");
        }
        self.max_iterations = max_iterations.max(1);
        self
    }

    pub fn with_recoverable(mut self, kinds: RecoverableKinds) -> Self {
        self.recoverable = kinds;
        self
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn recoverable(&self) -> &RecoverableKinds {
        &self.recoverable
    }

    pub fn phase(&self) -> GatePhase {
        self.state().phase
    }

    /// Attempts consumed in the current run
    pub fn attempts(&self) -> u32 {
        self.state().attempts
    }

    pub fn captured_output(&self) -> Option<Value> {
        self.state().captured.clone()
    }

    pub fn bound_agent(&self) -> Option<String> {
        self.state().agent.clone()
    }

    pub fn bound_input(&self) -> Option<String> {
        self.state().input.clone()
    }

    /// The fatal error that ended the current run, if one did
    pub fn failure(&self) -> Option<AgentError> {
        let failure = self.state().failure.clone()?;
        Some(match failure {
            Failure::BudgetExceeded => AgentError::IterationBudgetExceeded {
                max_iterations: self.max_iterations,
            },
            Failure::Rejected(message) => AgentError::OutputRejected(message.into()),
        })
    }

    /// Start a fresh run on behalf of `agent`; fails while another run holds the gate
    pub(crate) fn bind(&self, agent: &str, input: &str) -> crate::Result<()> {
        let mut state = self.state();
        if let Some(owner) = &state.agent {
            warn!("◆ OUTPUT GATE HELD BY '{}', REFUSING '{}'", owner, agent);
            return Err(AgentError::GateBusy(owner.clone()));
        }
        *state = GateState {
            agent: Some(agent.to_string()),
            input: Some(input.to_string()),
            ..GateState::default()
        };
        Ok(())
    }

    /// Drop the reference to the running agent, keeping the outcome readable
    pub(crate) fn unbind(&self) {
        let mut state = self.state();
        state.agent = None;
        state.input = None;
    }

    /// Clear all per-run state
    pub fn reset(&self) {
        *self.state() = GateState::default();
    }

    /// Submit a candidate final result.
    ///
    /// `Ok` carries the text the engine should see: a confirmation, or the
    /// rejection message of a recoverable failure.
    pub async fn submit(&self, args: Value) -> crate::Result<String> {
        let ctx = match self.admit()? {
            Admission::Proceed(ctx) => ctx,
            Admission::AlreadySubmitted => return Ok(ALREADY_SUBMITTED.to_string()),
        };

        debug!(
            "◆ VALIDATING SUBMISSION {}/{} for {:?}",
            ctx.attempt, ctx.max_iterations, ctx.agent
        );
        let outcome = self.handler.handle_output(args, &ctx).await;

        match self.judge(outcome, &ctx) {
            Verdict::Accepted(value) => Ok(self.record(value)),
            Verdict::Retry(message) => Ok(message),
            Verdict::Fatal(err) => {
                self.state().fail(Failure::Rejected(err.to_string()));
                Err(AgentError::OutputRejected(err))
            }
        }
    }

    fn admit(&self) -> crate::Result<Admission> {
        let mut state = self.state();
        match state.phase {
            GatePhase::Succeeded => {
                warn!("◆ SUBMISSION AFTER SUCCESS IGNORED");
                return Ok(Admission::AlreadySubmitted);
            }
            GatePhase::Failed if state.attempts < self.max_iterations => {
                return Err(AgentError::GateClosed);
            }
            _ => {}
        }

        if state.attempts >= self.max_iterations {
            state.fail(Failure::BudgetExceeded);
            warn!(
                "◆ OUTPUT BUDGET OF {} EXHAUSTED, ABORTING RUN",
                self.max_iterations
            );
            return Err(AgentError::IterationBudgetExceeded {
                max_iterations: self.max_iterations,
            });
        }

        state.attempts += 1;
        Ok(Admission::Proceed(SubmissionContext {
            agent: state.agent.clone(),
            input: state.input.clone(),
            attempt: state.attempts,
            max_iterations: self.max_iterations,
        }))
    }

    fn judge(&self, outcome: Result<Value, BoxError>, ctx: &SubmissionContext) -> Verdict {
        match outcome {
            Ok(value) => Verdict::Accepted(value),
            Err(err) if self.recoverable.contains(err.as_ref()) => {
                info!(
                    "◆ SUBMISSION {}/{} REJECTED: {}",
                    ctx.attempt, ctx.max_iterations, err
                );
                let mut message = err.to_string();
                if ctx.is_last_attempt() {
                    message.push_str("\n\n");
                    message.push_str(NO_ATTEMPTS_LEFT);
                }
                Verdict::Retry(message)
            }
            Err(err) => {
                warn!("◆ SUBMISSION FAILED FATALLY: {}", err);
                Verdict::Fatal(err)
            }
        }
    }

    fn record(&self, value: Value) -> String {
        let mut state = self.state();
        if state.phase == GatePhase::Succeeded {
            warn!("◆ CONCURRENT SUBMISSION IGNORED, KEEPING FIRST RESULT");
            return ALREADY_SUBMITTED.to_string();
        }
        state.phase = GatePhase::Succeeded;
        state.captured = Some(value);
        info!("◆ FINAL RESULT CAPTURED AFTER {} ATTEMPT(S)", state.attempts);
        SUBMISSION_ACCEPTED.to_string()
    }

    fn state(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ToolAdapter for OutputSubmissionGate {
    fn name(&self) -> &str {
        self.handler.name()
    }

    fn description(&self) -> &str {
        self.handler.description()
    }

    fn parameters(&self) -> Value {
        self.handler.parameters()
    }

    async fn execute(&self, args: Value) -> Result<String, BoxError> {
        self.submit(args).await.map_err(Into::into)
    }
}

impl std::fmt::Debug for OutputSubmissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputSubmissionGate")
            .field("name", &self.handler.name())
            .field("max_iterations", &self.max_iterations)
            .field("recoverable", &self.recoverable)
            .field("state", &*self.state())
            .finish()
    }
}
