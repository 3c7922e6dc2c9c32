//! One conversation with the backend: gate, send, stream, cache.
//!
//! `send` takes `&mut self`, so a second turn cannot start while one is streaming.

use crate::catalog::{SendBlocked, SendGate};
use crate::client::{BackendClient, ChatRequest, ClientError};
use crate::session::Session;
use crate::stream::{PresentationSink, SegmentPolicy, StreamOrchestrator, StreamReport};

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("cannot send: {0}")]
    Blocked(#[from] SendBlocked),
    #[error(transparent)]
    Client(#[from] ClientError),
}

pub struct ChatController {
    client: BackendClient,
    session: Session,
    model: Option<String>,
    system_prompt: String,
    policy: SegmentPolicy,
}

impl ChatController {
    pub fn new(client: BackendClient, session: Session) -> Self {
        Self {
            client,
            session,
            model: None,
            system_prompt: String::new(),
            policy: SegmentPolicy::default(),
        }
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_policy(mut self, policy: SegmentPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = Some(model.into());
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn client(&self) -> &BackendClient {
        &self.client
    }

    /// Run one turn, rendering into `sink`. Transport failures are not errors here: they end the
    /// stream with a failed outcome and are rendered like any other ending.
    pub async fn send<S: PresentationSink>(
        &mut self,
        text: &str,
        sink: &mut S,
    ) -> Result<StreamReport, ChatError> {
        SendGate::check(text, self.model.as_deref())?;
        let request = ChatRequest {
            message: text.to_string(),
            model: self.model.clone().unwrap_or_default(),
            session_id: self.session.id().map(str::to_string),
            system_prompt: self.system_prompt.clone(),
        };
        self.session.push_user(text);

        let orchestrator = StreamOrchestrator::new(&mut *sink, self.policy.clone());
        let report = match self.client.chat(&request).await {
            Ok(stream) => {
                if let Some(id) = stream.session_id {
                    self.session.assign_id(id);
                }
                orchestrator.run(stream.body).await
            }
            Err(e) => {
                log::warn!("chat: request failed: {}", e);
                orchestrator.fail(e.to_string())
            }
        };
        self.session.extend_assistant(report.messages.iter().cloned());
        Ok(report)
    }

    /// Clear the conversation on the backend (when it has one) and locally.
    /// The local session is cleared even if the backend call fails.
    pub async fn clear(&mut self) -> Result<(), ChatError> {
        let result = match self.session.id() {
            Some(id) => self.client.clear(id).await,
            None => Ok(()),
        };
        self.session.clear();
        result.map_err(ChatError::from)
    }
}
