//! Static gateway double for tests.

use crate::{LlmGateway, ObjectRequest};
use async_trait::async_trait;
use cabledex_core::{ExtractionError, Result};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

/// One scripted gateway outcome.
pub enum ScriptedReply {
    Object(Value),
    SchemaViolation(String),
    /// Never resolves; used to exercise caller-side timeouts.
    Hang,
}

/// Gateway that replays scripted replies in order, then falls back to a
/// default object. Records every request it sees for assertions.
#[derive(Default)]
pub struct StaticGateway {
    script: Mutex<VecDeque<ScriptedReply>>,
    default_reply: Option<Value>,
    requests: Mutex<Vec<ObjectRequest>>,
}

impl StaticGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Gateway that always answers with `value`.
    #[must_use]
    pub fn answering(value: Value) -> Self {
        Self {
            default_reply: Some(value),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_scripted(self, reply: ScriptedReply) -> Self {
        self.script.lock().unwrap().push_back(reply);
        self
    }

    pub fn push(&self, reply: ScriptedReply) {
        self.script.lock().unwrap().push_back(reply);
    }

    /// Requests observed so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<ObjectRequest> {
        self.requests.lock().unwrap().clone()
    }

    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmGateway for StaticGateway {
    async fn generate_object(&self, request: &ObjectRequest) -> Result<Value> {
        self.requests.lock().unwrap().push(request.clone());

        let scripted = self.script.lock().unwrap().pop_front();
        match scripted {
            Some(ScriptedReply::Object(value)) => Ok(value),
            Some(ScriptedReply::SchemaViolation(message)) => {
                Err(ExtractionError::SchemaViolation(message).into())
            }
            Some(ScriptedReply::Hang) => {
                std::future::pending::<()>().await;
                unreachable!("pending future never resolves")
            }
            None => self.default_reply.clone().ok_or_else(|| {
                ExtractionError::Gateway("StaticGateway has no reply configured".to_string())
                    .into()
            }),
        }
    }
}
