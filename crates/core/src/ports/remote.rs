use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::board::{Board, BoardDetail, Member};
use crate::domain::card::Card;
use crate::domain::identity::Credential;
use crate::domain::webhook::WebhookInfo;
use crate::domain::{BoardId, CardId, LabelId, ListId, MemberId};

/// Remote reports that the requested change is already in effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictKind {
    WebhookExists,
    AlreadyVoted,
    NotVoted,
    MemberAlreadyAssigned,
    LabelAlreadyAttached,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("remote rejected the credential")]
    CredentialInvalid,
    #[error("remote entity not found: {0}")]
    NotFound(String),
    #[error("remote change already in effect: {0:?}")]
    Conflict(ConflictKind),
    #[error("remote denied the operation: {0}")]
    PermissionDenied(String),
    #[error("remote rejected the request with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("transient remote failure: {0}")]
    Transient(String),
    #[error("remote payload could not be decoded: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PositionTarget {
    Top,
    Bottom,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CardMutation {
    SetName(String),
    SetDescription(String),
    SetDue(Option<DateTime<Utc>>),
    SetPosition(PositionTarget),
    SetClosed(bool),
    MoveToList(ListId),
    AddMember(MemberId),
    RemoveMember(MemberId),
    AddLabel(LabelId),
    RemoveLabel(LabelId),
    AddVote(MemberId),
    RemoveVote(MemberId),
}

impl CardMutation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetName(_) => "set_name",
            Self::SetDescription(_) => "set_description",
            Self::SetDue(_) => "set_due",
            Self::SetPosition(_) => "set_position",
            Self::SetClosed(_) => "set_closed",
            Self::MoveToList(_) => "move_to_list",
            Self::AddMember(_) => "add_member",
            Self::RemoveMember(_) => "remove_member",
            Self::AddLabel(_) => "add_label",
            Self::RemoveLabel(_) => "remove_label",
            Self::AddVote(_) => "add_vote",
            Self::RemoveVote(_) => "remove_vote",
        }
    }

    pub fn is_removal(&self) -> bool {
        matches!(self, Self::RemoveMember(_) | Self::RemoveLabel(_) | Self::RemoveVote(_))
    }
}

/// What the remote reported back about a mutated card.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MutationReceipt {
    pub pos: Option<f64>,
}

#[async_trait]
pub trait RemoteBoardClient: Send + Sync {
    async fn current_member(&self, credential: &Credential) -> Result<Member, RemoteError>;
    async fn boards(&self, credential: &Credential) -> Result<Vec<Board>, RemoteError>;
    async fn board_detail(
        &self,
        credential: &Credential,
        board: &BoardId,
    ) -> Result<BoardDetail, RemoteError>;
    async fn card(&self, credential: &Credential, card: &CardId) -> Result<Card, RemoteError>;
    async fn board_cards(
        &self,
        credential: &Credential,
        board: &BoardId,
    ) -> Result<Vec<Card>, RemoteError>;
    async fn member_cards(&self, credential: &Credential) -> Result<Vec<Card>, RemoteError>;
    async fn mutate_card(
        &self,
        credential: &Credential,
        card: &CardId,
        mutation: &CardMutation,
    ) -> Result<MutationReceipt, RemoteError>;
    /// Creates an open card at the bottom of `list`.
    async fn create_card(
        &self,
        credential: &Credential,
        list: &ListId,
        name: &str,
    ) -> Result<Card, RemoteError>;
    async fn create_webhook(
        &self,
        credential: &Credential,
        board: &BoardId,
        callback_url: &str,
        description: &str,
    ) -> Result<WebhookInfo, RemoteError>;
    async fn webhooks(&self, credential: &Credential) -> Result<Vec<WebhookInfo>, RemoteError>;
}
