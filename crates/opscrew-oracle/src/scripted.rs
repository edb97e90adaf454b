//! ScriptedOracle — deterministic responses for tests and offline runs.
//!
//! Each call to `complete` pops the next queued response; an exhausted
//! queue falls back to a fixed default so a stray extra call degrades
//! into an unparseable outcome downstream instead of a panic.

use crate::provider::{Oracle, OracleResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::Mutex;

pub struct ScriptedOracle {
    responses: Mutex<VecDeque<String>>,
    call_count: Mutex<usize>,
}

impl ScriptedOracle {
    /// Queue of responses consumed in order.
    pub fn sequence(responses: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            call_count: Mutex::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::sequence(Vec::<String>::new())
    }

    pub async fn call_count(&self) -> usize {
        *self.call_count.lock().await
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _prompt: &str) -> OracleResult<String> {
        *self.call_count.lock().await += 1;
        let next = self.responses.lock().await.pop_front();
        Ok(next.unwrap_or_else(|| "(scripted oracle: sequence exhausted)".to_string()))
    }
}
