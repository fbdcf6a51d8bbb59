//! New cards: created straight from a list picked in search results, or
//! through a short board, list and title conversation.

use boardlink_core::cache::{keys, EntityCache};
use boardlink_core::domain::board::{Board, List};
use boardlink_core::domain::identity::Actor;
use boardlink_core::domain::{BoardId, ListId};
use boardlink_core::ports::CacheScope;
use boardlink_core::ranking::boards_by_recency;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::interaction::{InteractionError, RenderedCard, CANCEL_REPLY};
use crate::render;

/// Where an unfinished card draft stands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum CardDraft {
    ChooseBoard,
    ChooseList { board: BoardId },
    EnterTitle { board: BoardId, list: ListId },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DraftReply {
    /// Offer one reply button per option.
    Choose { text: String, options: Vec<String> },
    /// Ask a free-text question with the reply keyboard hidden.
    Ask { text: String },
    Created(RenderedCard),
}

#[derive(Clone)]
pub struct CardCreator {
    cache: EntityCache,
}

impl CardCreator {
    pub fn new(cache: EntityCache) -> Self {
        Self { cache }
    }

    /// Creates the card, remembers it for the actor and renders it collapsed.
    pub async fn create(
        &self,
        actor: &Actor,
        list: &ListId,
        name: &str,
    ) -> Result<RenderedCard, InteractionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(InteractionError::EmptyName);
        }
        let guard = self.cache.guard();
        let credential = guard.credential(actor)?;
        let result = guard.remote().create_card(credential, list, name).await;
        let mut card = guard.settle(actor, "create_card", result).await?;

        card.board = self.cache.board(actor, &card.id_board).await?;
        card.list = self
            .cache
            .lists(actor, &card.id_board)
            .await?
            .into_iter()
            .find(|known| known.id == card.id_list);
        card.member_creator = self.cache.me(actor).await.ok();
        self.cache.store_card(actor, &card).await?;

        info!(
            event_name = "card.created",
            user_id = actor.user_id.0,
            card_id = %card.id,
            list_id = %card.id_list,
            "card created"
        );
        Ok(RenderedCard {
            text: render::card_text(&card, actor.utc_offset),
            panel: render::collapsed_panel(&card),
        })
    }

    /// Opens a draft by offering the actor's boards, most recent first.
    pub async fn start(&self, actor: &Actor) -> Result<DraftReply, InteractionError> {
        let boards = boards_by_recency(&self.cache.boards(actor).await?);
        self.save(actor, &CardDraft::ChooseBoard).await?;
        Ok(DraftReply::Choose {
            text: "Select the board to create a card".to_owned(),
            options: board_names(&boards),
        })
    }

    /// Moves the open draft one step with the user's reply. Returns `None`
    /// when there is no draft.
    pub async fn advance(
        &self,
        actor: &Actor,
        reply: &str,
    ) -> Result<Option<DraftReply>, InteractionError> {
        let scope = CacheScope::User(actor.user_id);
        let Some(draft) = self.cache.read::<CardDraft>(scope, keys::CARD_DRAFT).await? else {
            return Ok(None);
        };

        let reply = reply.trim();
        if reply.eq_ignore_ascii_case(CANCEL_REPLY) {
            self.cache.remove(scope, keys::CARD_DRAFT).await?;
            debug!(event_name = "card.draft.cancelled", user_id = actor.user_id.0, "draft dropped");
            return Ok(Some(DraftReply::Ask { text: "Card creation cancelled".to_owned() }));
        }

        let next = match draft {
            CardDraft::ChooseBoard => {
                let boards = boards_by_recency(&self.cache.boards(actor).await?);
                match boards.iter().find(|board| board.name == reply) {
                    Some(board) => {
                        let lists = self.cache.lists(actor, &board.id).await?;
                        self.save(actor, &CardDraft::ChooseList { board: board.id.clone() })
                            .await?;
                        DraftReply::Choose {
                            text: format!("Select the list on \"{}\"", board.name),
                            options: list_names(&lists),
                        }
                    }
                    None => DraftReply::Choose {
                        text: "Pick one of the boards below".to_owned(),
                        options: board_names(&boards),
                    },
                }
            }
            CardDraft::ChooseList { board } => {
                let lists = self.cache.lists(actor, &board).await?;
                match lists.iter().find(|list| list.name == reply) {
                    Some(list) => {
                        let board_name = self
                            .cache
                            .board(actor, &board)
                            .await?
                            .map(|known| known.name)
                            .unwrap_or_default();
                        let text = format!(
                            "Enter the title. Card will be added to {board_name} / {}",
                            list.name
                        );
                        self.save(actor, &CardDraft::EnterTitle { board, list: list.id.clone() })
                            .await?;
                        DraftReply::Ask { text }
                    }
                    None => DraftReply::Choose {
                        text: "Pick one of the lists below".to_owned(),
                        options: list_names(&lists),
                    },
                }
            }
            CardDraft::EnterTitle { list, .. } => {
                let created = self.create(actor, &list, reply).await?;
                self.cache.remove(scope, keys::CARD_DRAFT).await?;
                DraftReply::Created(created)
            }
        };
        Ok(Some(next))
    }

    async fn save(&self, actor: &Actor, draft: &CardDraft) -> Result<(), InteractionError> {
        self.cache
            .write(
                CacheScope::User(actor.user_id),
                keys::CARD_DRAFT,
                draft,
                self.cache.ttls().pending_input,
            )
            .await?;
        Ok(())
    }
}

fn board_names(boards: &[Board]) -> Vec<String> {
    boards.iter().map(|board| board.name.clone()).collect()
}

fn list_names(lists: &[List]) -> Vec<String> {
    lists.iter().map(|list| list.name.clone()).collect()
}
