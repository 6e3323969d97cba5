//! Inbound events and their normalised request descriptor

use crate::application::errors::PipelineError;

/// Author of an inbound event as reported by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
}

impl Sender {
    pub fn new(id: i64, first_name: impl Into<String>) -> Self {
        Self {
            id,
            username: None,
            first_name: first_name.into(),
            last_name: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

/// Transport-neutral inbound event, before normalisation
#[derive(Debug, Clone)]
pub enum InboundUpdate {
    Message {
        message_id: i64,
        chat_id: i64,
        from: Option<Sender>,
        text: String,
    },
    Callback {
        callback_id: String,
        message_id: i64,
        chat_id: i64,
        from: Option<Sender>,
        data: String,
    },
}

/// Variant payload of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    Message {
        text: String,
        message_id: i64,
    },
    Callback {
        callback_id: String,
        data: String,
        message_id: i64,
    },
}

/// Normalised, immutable view of one inbound event.
///
/// Built once at ingress and shared read-only through the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub user_id: i64,
    pub chat_id: i64,
    pub username: String,
    pub sender: Sender,
    pub kind: RequestKind,
}

impl RequestDescriptor {
    /// Normalise an inbound update. Events without a positive sender id are rejected.
    pub fn from_update(update: InboundUpdate) -> Result<Self, PipelineError> {
        let (from, chat_id, kind) = match update {
            InboundUpdate::Message {
                message_id,
                chat_id,
                from,
                text,
            } => (from, chat_id, RequestKind::Message { text, message_id }),
            InboundUpdate::Callback {
                callback_id,
                message_id,
                chat_id,
                from,
                data,
            } => (
                from,
                chat_id,
                RequestKind::Callback {
                    callback_id,
                    data,
                    message_id,
                },
            ),
        };

        let sender = from.ok_or_else(|| PipelineError::InvalidRequest("missing sender".into()))?;
        if sender.id <= 0 {
            return Err(PipelineError::InvalidRequest(format!(
                "non-positive sender id {}",
                sender.id
            )));
        }

        Ok(Self {
            user_id: sender.id,
            chat_id,
            username: sender.username.clone().unwrap_or_default(),
            sender,
            kind,
        })
    }

    pub fn is_callback(&self) -> bool {
        matches!(self.kind, RequestKind::Callback { .. })
    }

    pub fn message_id(&self) -> i64 {
        match &self.kind {
            RequestKind::Message { message_id, .. } | RequestKind::Callback { message_id, .. } => {
                *message_id
            }
        }
    }

    /// Audit label: `message:<text>` or `callback:<data>`
    pub fn action_label(&self) -> String {
        match &self.kind {
            RequestKind::Message { text, .. } => format!("message:{}", text),
            RequestKind::Callback { data, .. } => format!("callback:{}", data),
        }
    }
}
