//! Shared helpers for CLI tests

#![allow(dead_code)]

use assert_cmd::Command;
use std::path::PathBuf;
use tempfile::TempDir;

/// Isolated home directory plus a place for transcripts
pub struct TestEnv {
    pub temp_dir: TempDir,
}

impl TestEnv {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            temp_dir: TempDir::new()?,
        })
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    /// Command with HOME pointed at the temp dir
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_handoff"));
        cmd.env("HOME", self.temp_dir.path());
        cmd.env_remove("RUST_LOG");
        cmd
    }

    /// Write a transcript file and return its path
    pub fn transcript(&self, name: &str, responses: serde_json::Value) -> anyhow::Result<PathBuf> {
        let path = self.path(name);
        std::fs::write(&path, serde_json::to_string_pretty(&responses)?)?;
        Ok(path)
    }

    pub fn write_config(&self, name: &str, config: serde_json::Value) -> anyhow::Result<PathBuf> {
        let path = self.path(name);
        std::fs::write(&path, serde_json::to_string_pretty(&config)?)?;
        Ok(path)
    }
}

/// One model turn calling a single tool
pub fn call(id: &str, name: &str, arguments: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "tool_calls": [{ "id": id, "name": name, "arguments": arguments }],
        "finish_reason": "tool_calls"
    })
}

/// One model turn answering in plain text
pub fn text(content: &str) -> serde_json::Value {
    serde_json::json!({ "content": content, "finish_reason": "stop" })
}
