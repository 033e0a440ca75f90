//! Transcript replay provider
//!
//! Answers each `chat` call with the next recorded response. Useful for
//! exercising an engine without a live model.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::{ChatParams, ChatResponse, Provider, ProviderError, Result};

pub struct ScriptedProvider {
    model: String,
    responses: Mutex<VecDeque<ChatResponse>>,
    requests: Mutex<Vec<ChatParams>>,
    served: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ChatResponse>) -> Self {
        Self {
            model: "scripted".to_string(),
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            served: AtomicUsize::new(0),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Parse a transcript: a JSON array of responses
    pub fn from_json(json: &str) -> Result<Self> {
        let responses: Vec<ChatResponse> = serde_json::from_str(json)?;
        Ok(Self::new(responses))
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        debug!("◆ LOADING TRANSCRIPT FROM {:?}", path);
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_json(&content)
    }

    /// Responses not yet served
    pub fn remaining(&self) -> usize {
        self.responses.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Every request received so far, in order
    pub fn requests(&self) -> Vec<ChatParams> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

fn poisoned() -> ProviderError {
    ProviderError::Api("transcript lock poisoned".to_string())
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn chat(&self, params: ChatParams) -> Result<ChatResponse> {
        trace!("scripted chat with {} messages", params.messages.len());
        self.requests.lock().map_err(|_| poisoned())?.push(params);

        let next = self.responses.lock().map_err(|_| poisoned())?.pop_front();
        match next {
            Some(response) => {
                self.served.fetch_add(1, Ordering::SeqCst);
                Ok(response)
            }
            None => Err(ProviderError::Exhausted(self.served.load(Ordering::SeqCst))),
        }
    }

    fn default_model(&self) -> String {
        self.model.clone()
    }
}
