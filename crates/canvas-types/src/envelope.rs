use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A call sent TO the database worker.
///
/// `handle` is opaque to the worker and is echoed verbatim in the reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub call: String,
    #[serde(default)]
    pub handle: Value,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(operation: Operation, handle: Value, data: Value) -> Self {
        Self {
            call: operation.name().to_string(),
            handle,
            data,
        }
    }
}

/// The worker's answer to exactly one [`Envelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub handle: Value,
    #[serde(default)]
    pub data: Value,
}

/// The fixed set of calls the worker answers. Anything else gets a `null` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    SetUserChatName,
    GetUserChatName,
    AuthenticateUser,
    UpdatePixelPlace,
    GetMaxLiveChatId,
    GetMaxPlaceChatId,
    CommitShutdown,
    InsertLiveChat,
    InsertPlaceChat,
    Exec,
}

impl Operation {
    pub const ALL: [Operation; 10] = [
        Operation::SetUserChatName,
        Operation::GetUserChatName,
        Operation::AuthenticateUser,
        Operation::UpdatePixelPlace,
        Operation::GetMaxLiveChatId,
        Operation::GetMaxPlaceChatId,
        Operation::CommitShutdown,
        Operation::InsertLiveChat,
        Operation::InsertPlaceChat,
        Operation::Exec,
    ];

    /// Wire name used in the `call` field.
    pub fn name(self) -> &'static str {
        match self {
            Self::SetUserChatName => "setUserChatName",
            Self::GetUserChatName => "getUserChatName",
            Self::AuthenticateUser => "authenticateUser",
            Self::UpdatePixelPlace => "updatePixelPlace",
            Self::GetMaxLiveChatId => "getMaxLiveChatId",
            Self::GetMaxPlaceChatId => "getMaxPlaceChatId",
            Self::CommitShutdown => "commitShutdown",
            Self::InsertLiveChat => "insertLiveChat",
            Self::InsertPlaceChat => "insertPlaceChat",
            Self::Exec => "exec",
        }
    }

    /// Look up a call by its wire name. Names are case-sensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.name() == name)
    }
}
