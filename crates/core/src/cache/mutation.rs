use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::{keys, EntityCache};
use crate::domain::board::{Label, List, Member};
use crate::domain::card::{Card, CardPatch, HEAD_POSITION};
use crate::domain::identity::Actor;
use crate::domain::{LabelId, MemberId};
use crate::errors::CoreError;
use crate::ports::{CacheScope, CardMutation, MutationReceipt, PositionTarget, RemoteError};

/// A change the user asked for, carrying whatever the cache patch needs.
#[derive(Clone, Debug, PartialEq)]
pub enum CardChange {
    Rename(String),
    Describe(String),
    SetDue(Option<DateTime<Utc>>),
    Reposition(PositionTarget),
    Archive(bool),
    MoveTo(List),
    Assign(Member),
    Unassign(MemberId),
    AttachLabel(Label),
    DetachLabel(LabelId),
    Vote(MemberId),
    Unvote(MemberId),
}

impl CardChange {
    fn mutation(&self) -> CardMutation {
        match self {
            Self::Rename(name) => CardMutation::SetName(name.clone()),
            Self::Describe(desc) => CardMutation::SetDescription(desc.clone()),
            Self::SetDue(due) => CardMutation::SetDue(*due),
            Self::Reposition(target) => CardMutation::SetPosition(*target),
            Self::Archive(closed) => CardMutation::SetClosed(*closed),
            Self::MoveTo(list) => CardMutation::MoveToList(list.id.clone()),
            Self::Assign(member) => CardMutation::AddMember(member.id.clone()),
            Self::Unassign(member) => CardMutation::RemoveMember(member.clone()),
            Self::AttachLabel(label) => CardMutation::AddLabel(label.id.clone()),
            Self::DetachLabel(label) => CardMutation::RemoveLabel(label.clone()),
            Self::Vote(member) => CardMutation::AddVote(member.clone()),
            Self::Unvote(member) => CardMutation::RemoveVote(member.clone()),
        }
    }

    fn into_patch(self, receipt: MutationReceipt, card: &Card) -> CardPatch {
        match self {
            Self::Rename(name) => CardPatch::Name(name),
            Self::Describe(desc) => CardPatch::Description(desc),
            Self::SetDue(due) => CardPatch::Due(due),
            Self::Reposition(target) => {
                CardPatch::Position(receipt.pos.unwrap_or_else(|| estimated_position(target, card)))
            }
            Self::Archive(closed) => CardPatch::Closed(closed),
            Self::MoveTo(list) => CardPatch::List(list),
            Self::Assign(member) => CardPatch::AddMember(member),
            Self::Unassign(member) => CardPatch::RemoveMember(member),
            Self::AttachLabel(label) => CardPatch::AddLabel(label),
            Self::DetachLabel(label) => CardPatch::RemoveLabel(label),
            Self::Vote(member) => CardPatch::AddVote(member),
            Self::Unvote(member) => CardPatch::RemoveVote(member),
        }
    }
}

fn estimated_position(target: PositionTarget, card: &Card) -> f64 {
    match target {
        PositionTarget::Top => (card.pos / 2.0).min(HEAD_POSITION / 2.0),
        PositionTarget::Bottom => card.pos.max(HEAD_POSITION) + HEAD_POSITION,
    }
}

/// Pushes one change to the remote and mirrors it into the cache and into
/// the caller's copy of the card.
#[derive(Clone)]
pub struct CardMutator {
    cache: EntityCache,
}

impl CardMutator {
    pub fn new(cache: EntityCache) -> Self {
        Self { cache }
    }

    pub async fn apply(
        &self,
        actor: &Actor,
        card: &mut Card,
        change: CardChange,
    ) -> Result<CardPatch, CoreError> {
        let guard = self.cache.guard();
        let credential = guard.credential(actor)?;
        let mutation = change.mutation();
        let result = guard.remote().mutate_card(credential, &card.id, &mutation).await;
        let receipt = match result {
            Err(RemoteError::Conflict(kind)) => {
                debug!(
                    event_name = "remote.mutation.already_applied",
                    card_id = %card.id,
                    mutation = mutation.name(),
                    conflict = ?kind,
                    "remote change already in effect"
                );
                MutationReceipt::default()
            }
            Err(RemoteError::NotFound(_)) if mutation.is_removal() => MutationReceipt::default(),
            other => guard.settle(actor, mutation.name(), other).await?,
        };

        let patch = change.into_patch(receipt, card);
        card.apply(&patch);
        if let Err(error) = self.cache.patch_card(&card.id, &patch).await {
            warn!(
                event_name = "cache.card.patch_failed",
                card_id = %card.id,
                error = %error,
                "dropping cached card after failed patch"
            );
            self.cache.remove(CacheScope::Service, &keys::card(&card.id)).await?;
        }
        info!(
            event_name = "card.mutation.applied",
            user_id = actor.user_id.0,
            card_id = %card.id,
            mutation = mutation.name(),
            "card mutation applied"
        );
        Ok(patch)
    }
}
