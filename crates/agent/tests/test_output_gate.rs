//! Output gate behaviour as seen through a running agent

mod common;

use common::Script;
use handoff_agent::output::{ALREADY_SUBMITTED, NO_ATTEMPTS_LEFT, SUBMISSION_ACCEPTED};
use handoff_agent::{
    AgentBuilder, AgentError, FnOutputHandler, GatePhase, InvalidOutput, OutputSubmissionGate,
    RequireFields,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
#[error("handler crashed")]
struct Crash;

fn always_invalid(calls: Arc<AtomicU32>) -> FnOutputHandler {
    FnOutputHandler::new(json!({"type": "object"}), move |_, _| {
        calls.fetch_add(1, Ordering::SeqCst);
        Err(InvalidOutput::new("not good enough").into())
    })
}

#[tokio::test]
async fn test_bounded_retries() {
    for max in [1u32, 2, 5] {
        let calls = Arc::new(AtomicU32::new(0));
        let mut script = Script::new();
        for _ in 0..=max {
            script = script.call("output_handler", json!({}));
        }
        let (factory, recorder) = script.factory();

        let runner = AgentBuilder::new("retrier")
            .output_gate(OutputSubmissionGate::new(always_invalid(calls.clone())).with_max_iterations(max))
            .factory(factory)
            .build()
            .unwrap();

        let err = runner.invoke("try").await.unwrap_err();
        assert!(
            matches!(err, AgentError::IterationBudgetExceeded { max_iterations } if max_iterations == max)
        );
        assert_eq!(calls.load(Ordering::SeqCst), max);

        let outputs = recorder.outputs();
        assert_eq!(outputs.len() as u32, max);
        assert!(outputs.iter().all(|o| o.starts_with("not good enough")));
        assert!(outputs.last().unwrap().ends_with(NO_ATTEMPTS_LEFT));
        assert_eq!(
            outputs.iter().filter(|o| o.ends_with(NO_ATTEMPTS_LEFT)).count(),
            1
        );
    }
}

#[tokio::test]
async fn test_example_scenario() {
    let (factory, recorder) = Script::new()
        .call("output_handler", json!({}))
        .call("output_handler", json!({}))
        .call("output_handler", json!({"answer": "42"}))
        .factory();
    let gate = Arc::new(OutputSubmissionGate::new(RequireFields::new(["answer"])).with_max_iterations(3));

    let runner = AgentBuilder::new("solver")
        .output_gate_arc(gate.clone())
        .factory(factory)
        .build()
        .unwrap();

    let result = runner.invoke("what is six times seven?").await.unwrap();
    assert_eq!(result, json!("42"));
    assert_eq!(gate.attempts(), 3);
    assert_eq!(gate.phase(), GatePhase::Succeeded);

    let outputs = recorder.outputs();
    assert_eq!(outputs[0], "Missing required field(s): answer");
    assert_eq!(outputs[1], "Missing required field(s): answer");
    assert_eq!(outputs[2], SUBMISSION_ACCEPTED);
}

#[tokio::test]
async fn test_second_submission_does_not_overwrite() {
    let (factory, recorder) = Script::new()
        .call("output_handler", json!({"answer": "first"}))
        .call("output_handler", json!({"answer": "second"}))
        .factory();
    let gate = Arc::new(OutputSubmissionGate::new(RequireFields::new(["answer"])));

    let runner = AgentBuilder::new("eager")
        .output_gate_arc(gate.clone())
        .factory(factory)
        .build()
        .unwrap();

    assert_eq!(runner.invoke("go").await.unwrap(), json!("first"));
    assert_eq!(recorder.outputs(), vec![SUBMISSION_ACCEPTED, ALREADY_SUBMITTED]);
    assert_eq!(gate.attempts(), 1);
}

#[tokio::test]
async fn test_fatal_rejection_short_circuits() {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let handler = FnOutputHandler::new(json!({"type": "object"}), move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(Crash.into())
    });
    let (factory, recorder) = Script::new()
        .call("output_handler", json!({}))
        .call("output_handler", json!({}))
        .factory();

    let runner = AgentBuilder::new("fragile")
        .output_gate(OutputSubmissionGate::new(handler).with_max_iterations(5))
        .factory(factory)
        .build()
        .unwrap();

    match runner.invoke("go").await.unwrap_err() {
        AgentError::OutputRejected(source) => assert!(source.is::<Crash>()),
        other => panic!("Expected OutputRejected, got {:?}", other),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(recorder.outputs().is_empty());
}

#[tokio::test]
async fn test_handler_receives_original_input() {
    let handler = FnOutputHandler::new(json!({"type": "object"}), |args, ctx| {
        Ok(json!({
            "input": ctx.input,
            "agent": ctx.agent,
            "echo": args,
        }))
    });
    let (factory, recorder) = Script::new()
        .call("output_handler", json!({"x": 1}))
        .factory();

    let runner = AgentBuilder::new("contextual")
        .prompt_prefix("You are careful.")
        .output_gate(OutputSubmissionGate::new(handler))
        .factory(factory)
        .build()
        .unwrap();

    let result = runner.invoke("raw input").await.unwrap();
    assert_eq!(result["input"], "raw input");
    assert_eq!(result["agent"], "contextual");
    assert_eq!(result["echo"], json!({"x": 1}));
    assert_eq!(recorder.inputs(), vec!["You are careful.\n\nraw input"]);
}

#[tokio::test]
async fn test_structured_output_via_serde() {
    #[derive(serde::Deserialize, serde::Serialize)]
    struct Verdict {
        score: u8,
        reason: String,
    }

    let handler = FnOutputHandler::new(
        json!({
            "type": "object",
            "properties": {
                "score": {"type": "integer"},
                "reason": {"type": "string"}
            },
            "required": ["score", "reason"]
        }),
        |args, _| {
            let verdict: Verdict = serde_json::from_value(args)
                .map_err(|e| InvalidOutput::new(format!("Invalid submission: {}", e)))?;
            if verdict.score > 10 {
                return Err(InvalidOutput::new("score must be between 0 and 10").into());
            }
            Ok(serde_json::to_value(verdict)?)
        },
    );
    let (factory, recorder) = Script::new()
        .call("output_handler", json!({"score": "high"}))
        .call("output_handler", json!({"score": 11, "reason": "great"}))
        .call("output_handler", json!({"score": 9, "reason": "great"}))
        .factory();

    let runner = AgentBuilder::new("grader")
        .output_gate(OutputSubmissionGate::new(handler))
        .factory(factory)
        .build()
        .unwrap();

    let result: Value = runner.invoke("grade it").await.unwrap();
    assert_eq!(result, json!({"score": 9, "reason": "great"}));

    let outputs = recorder.outputs();
    assert!(outputs[0].starts_with("Invalid submission:"));
    assert_eq!(outputs[1], "score must be between 0 and 10");
}
