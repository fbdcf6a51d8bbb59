//! Runs card panel presses and side-conversation replies against the entity
//! cache and the tracker.
//!
//! The transition table in `boardlink_core::panel` decides what a press
//! means; this module performs the effect, patches the cached card and
//! describes how the message has to change. Nothing here edits a message
//! directly: callers apply the returned [`PanelEdit`] through a
//! [`MessagingPlatform`](crate::platform::MessagingPlatform).

use boardlink_core::cache::{keys, CardChange, CardMutator, EntityCache};
use boardlink_core::discovery::{discover_cards, DISCOVERY_PAGE_SIZE};
use boardlink_core::domain::card::Card;
use boardlink_core::domain::identity::Actor;
use boardlink_core::domain::{CardId, ListId};
use boardlink_core::due::{parse_manual, DueParseError};
use boardlink_core::errors::CoreError;
use boardlink_core::panel::{
    transition, ButtonId, ButtonIdError, Menu, Panel, PanelButton, PanelEffect, PanelRender,
    PanelTransition, PanelTransitionError,
};
use boardlink_core::ports::{CacheScope, PositionTarget, RemoteError};
use boardlink_core::ranking::boards_by_recency;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::platform::{InputPrompt, MessageHandle};
use crate::render;

pub const CANCEL_REPLY: &str = "cancel";
/// Boards whose lists are offered for new cards in a text search.
const OFFER_BOARD_LIMIT: usize = 10;
pub const REAUTHORIZE_NOTICE: &str = "You need to authorize me first";
const VOTING_DISABLED_NOTICE: &str = "First, you need to enable Voting Power-Up for this board";

/// A press as delivered by the messaging host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ButtonPress {
    pub handle: MessageHandle,
    pub card: CardId,
    pub menu: Menu,
    pub button: ButtonId,
    pub state: Option<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PanelEdit {
    Unchanged,
    /// Swap the pressed button in place, leaving the rest of the panel alone.
    ReplaceButton(PanelButton),
    Replace { text: String, panel: Panel },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PressResponse {
    pub edit: PanelEdit,
    pub toast: Option<String>,
    pub prompt: Option<InputPrompt>,
    pub reauthorize: bool,
}

impl PressResponse {
    fn with_edit(edit: PanelEdit) -> Self {
        Self { edit, toast: None, prompt: None, reauthorize: false }
    }

    /// Leaves the panel as it was and only tells the user something.
    pub fn notice(text: impl Into<String>) -> Self {
        Self { toast: Some(text.into()), ..Self::with_edit(PanelEdit::Unchanged) }
    }

    pub fn reauthorize() -> Self {
        Self { reauthorize: true, ..Self::notice(REAUTHORIZE_NOTICE) }
    }

    /// Notice-only response for a failed press.
    pub fn from_error(error: &InteractionError) -> Self {
        if error.needs_reauthorization() {
            Self::reauthorize()
        } else {
            Self::notice(error.user_message())
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedCard {
    pub text: String,
    pub panel: Panel,
}

/// One card offered by a search, ready to be posted as a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchResult {
    pub card: CardId,
    pub title: String,
    pub subtitle: String,
    pub message: RenderedCard,
}

/// A list the query text can be filed into as a new card.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListOffer {
    pub list: ListId,
    pub title: String,
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchResults {
    pub results: Vec<SearchResult>,
    pub list_offers: Vec<ListOffer>,
    pub next_offset: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputField {
    Name,
    Description,
    Due,
}

/// The question a user still owes an answer to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingInput {
    pub card: CardId,
    pub handle: MessageHandle,
    pub field: InputField,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputCompletion {
    pub handle: MessageHandle,
    pub edit: PanelEdit,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InteractionError {
    #[error(transparent)]
    Button(#[from] ButtonIdError),
    #[error(transparent)]
    Transition(#[from] PanelTransitionError),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Due(#[from] DueParseError),
    #[error("card name cannot be empty")]
    EmptyName,
}

impl InteractionError {
    pub fn needs_reauthorization(&self) -> bool {
        matches!(self, Self::Core(error) if error.needs_reauthorization())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Core(error) if error.is_retryable())
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Button(_) | Self::Transition(_) => "That button is no longer available.",
            Self::Core(error) => error.clone().into_interface("interaction").user_message(),
            Self::Due(_) => "Please write the due date as dd.MM hh:mm",
            Self::EmptyName => "The card name cannot be empty.",
        }
    }
}

/// What an effect changed, for relabeling and notices.
#[derive(Default)]
struct Outcome {
    pressed: Option<PanelButton>,
    toast: Option<String>,
}

#[derive(Clone)]
pub struct CardInteraction {
    cache: EntityCache,
    mutator: CardMutator,
    clock: fn() -> DateTime<Utc>,
}

impl CardInteraction {
    pub fn new(cache: EntityCache) -> Self {
        let mutator = CardMutator::new(cache.clone());
        Self { cache, mutator, clock: Utc::now }
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// The initial message for a card: its text and the collapsed panel.
    pub async fn render_card(
        &self,
        actor: &Actor,
        card: &CardId,
    ) -> Result<RenderedCard, InteractionError> {
        let card = self.cache.card(actor, card).await?;
        Ok(RenderedCard {
            text: render::card_text(&card, actor.utc_offset),
            panel: render::collapsed_panel(&card),
        })
    }

    /// Ranked cards matching `query`, each rendered as a collapsed message.
    /// A text search also offers the lists of recent boards to create a
    /// card named after the query.
    pub async fn search(
        &self,
        actor: &Actor,
        query: &str,
        offset: usize,
    ) -> Result<SearchResults, InteractionError> {
        let page = discover_cards(&self.cache, actor, query, offset).await?;
        let discovery = page.discovery;
        let results: Vec<SearchResult> = page
            .hits
            .into_iter()
            .map(|hit| {
                let mut card = hit.card;
                card.list = Some(hit.list.clone());
                SearchResult {
                    card: card.id.clone(),
                    title: card.name.clone(),
                    subtitle: format!("{} › {}", hit.board.name, hit.list.name),
                    message: RenderedCard {
                        text: render::card_text(&card, actor.utc_offset),
                        panel: render::collapsed_panel(&card),
                    },
                }
            })
            .collect();
        let list_offers = if discovery {
            Vec::new()
        } else {
            self.list_offers(actor, query.trim(), DISCOVERY_PAGE_SIZE.saturating_sub(results.len()))
                .await?
        };
        Ok(SearchResults { results, list_offers, next_offset: page.next_offset })
    }

    /// Every list but the last one of the most recent boards.
    async fn list_offers(
        &self,
        actor: &Actor,
        name: &str,
        limit: usize,
    ) -> Result<Vec<ListOffer>, InteractionError> {
        let boards = boards_by_recency(&self.cache.boards(actor).await?);
        let mut offers = Vec::new();
        for board in boards.iter().take(OFFER_BOARD_LIMIT) {
            if offers.len() >= limit {
                break;
            }
            let lists = match self.cache.lists(actor, &board.id).await {
                Ok(lists) => lists,
                Err(error) if error.needs_reauthorization() => return Err(error.into()),
                Err(error) => {
                    warn!(
                        event_name = "interaction.search.lists_unavailable",
                        user_id = actor.user_id.0,
                        board_id = %board.id,
                        error = %error,
                        "skipping board lists in search offers"
                    );
                    continue;
                }
            };
            let room = lists.len().saturating_sub(1).min(limit - offers.len());
            offers.extend(lists.into_iter().take(room).map(|list| ListOffer {
                title: format!("{} • {}", list.name, board.name),
                list: list.id,
                name: name.to_owned(),
            }));
        }
        Ok(offers)
    }

    /// Remembers a card the user picked so later searches rank it.
    pub async fn card_chosen(&self, actor: &Actor, card: &CardId) -> Result<(), InteractionError> {
        let card = self.cache.card(actor, card).await?;
        self.cache.store_card(actor, &card).await?;
        Ok(())
    }

    pub async fn handle_press(
        &self,
        actor: &Actor,
        press: &ButtonPress,
    ) -> Result<PressResponse, InteractionError> {
        let transition = transition(press.menu, &press.button, press.state)?;
        if transition.requires_credential() && actor.credential.is_none() {
            info!(
                event_name = "interaction.press.reauthorization_required",
                user_id = actor.user_id.0,
                card_id = %press.card,
                menu = press.menu.as_str(),
                "press needs a credential, asking to authorize"
            );
            return Ok(PressResponse::reauthorize());
        }

        let mut card = self.cache.card(actor, &press.card).await?;
        let outcome = match &transition.effect {
            PanelEffect::PromptName => return self.prompt(actor, press, &card, InputField::Name).await,
            PanelEffect::PromptDescription => {
                return self.prompt(actor, press, &card, InputField::Description).await
            }
            PanelEffect::PromptDue => return self.prompt(actor, press, &card, InputField::Due).await,
            PanelEffect::ToggleVote => match self.toggle_vote(actor, &mut card).await {
                Err(InteractionError::Core(CoreError::Remote(RemoteError::PermissionDenied(_)))) => {
                    return Ok(PressResponse::notice(VOTING_DISABLED_NOTICE))
                }
                result => result?,
            },
            effect => self.apply_effect(actor, &mut card, effect).await?,
        };

        let edit = self.edit_for(actor, press, &transition, &card, outcome.pressed).await?;
        info!(
            event_name = "interaction.press.applied",
            user_id = actor.user_id.0,
            card_id = %card.id,
            menu = press.menu.as_str(),
            button = %press.button.encode(),
            "card press applied"
        );
        Ok(PressResponse { toast: outcome.toast, ..PressResponse::with_edit(edit) })
    }

    /// Finishes the side conversation opened by a name, description or
    /// manual due press. Returns `None` when the user owes no answer.
    pub async fn complete_input(
        &self,
        actor: &Actor,
        reply: &str,
    ) -> Result<Option<InputCompletion>, InteractionError> {
        let scope = CacheScope::User(actor.user_id);
        let Some(pending) = self.cache.read::<PendingInput>(scope, keys::PENDING_INPUT).await?
        else {
            return Ok(None);
        };

        let reply = reply.trim();
        if reply.eq_ignore_ascii_case(CANCEL_REPLY) {
            self.cache.remove(scope, keys::PENDING_INPUT).await?;
            debug!(
                event_name = "interaction.input.cancelled",
                user_id = actor.user_id.0,
                card_id = %pending.card,
                "side conversation cancelled"
            );
            let card = self.cache.card(actor, &pending.card).await?;
            return Ok(Some(InputCompletion {
                handle: pending.handle,
                edit: collapsed_edit(actor, &card),
            }));
        }

        let change = match pending.field {
            InputField::Name if reply.is_empty() => return Err(InteractionError::EmptyName),
            InputField::Name => CardChange::Rename(reply.to_owned()),
            InputField::Description => CardChange::Describe(reply.to_owned()),
            InputField::Due => {
                CardChange::SetDue(Some(parse_manual(reply, (self.clock)(), actor.utc_offset)?))
            }
        };
        let mut card = self.cache.card(actor, &pending.card).await?;
        self.mutator.apply(actor, &mut card, change).await?;
        self.cache.remove(scope, keys::PENDING_INPUT).await?;

        info!(
            event_name = "interaction.input.completed",
            user_id = actor.user_id.0,
            card_id = %card.id,
            field = ?pending.field,
            "side conversation completed"
        );
        Ok(Some(InputCompletion { handle: pending.handle, edit: collapsed_edit(actor, &card) }))
    }

    async fn prompt(
        &self,
        actor: &Actor,
        press: &ButtonPress,
        card: &Card,
        field: InputField,
    ) -> Result<PressResponse, InteractionError> {
        let pending = PendingInput { card: card.id.clone(), handle: press.handle.clone(), field };
        self.cache
            .write(
                CacheScope::User(actor.user_id),
                keys::PENDING_INPUT,
                &pending,
                self.cache.ttls().pending_input,
            )
            .await?;

        let text = match field {
            InputField::Name => format!("{}\nWrite the new name for the card", card.name),
            InputField::Description => {
                let current = if card.desc.is_empty() { "Description is empty" } else { &card.desc };
                format!("{current}\nWrite the new description for the card")
            }
            InputField::Due => "Write the due date in the format dd.MM hh:mm".to_owned(),
        };
        Ok(PressResponse {
            prompt: Some(InputPrompt {
                chat_id: actor.chat_id,
                user_id: actor.user_id,
                reply_to: press.handle.clone(),
                text,
            }),
            ..PressResponse::with_edit(PanelEdit::Unchanged)
        })
    }

    async fn toggle_vote(&self, actor: &Actor, card: &mut Card) -> Result<Outcome, InteractionError> {
        let me = self.cache.me(actor).await?;
        let (change, toast) = if card.has_vote_from(&me.id) {
            (CardChange::Unvote(me.id), format!("👎 You unvoted \"{}\"", card.name))
        } else {
            (CardChange::Vote(me.id), format!("👍 You upvoted \"{}\"", card.name))
        };
        self.mutator.apply(actor, card, change).await?;
        Ok(Outcome { pressed: Some(render::vote_button(card)), toast: Some(toast) })
    }

    async fn apply_effect(
        &self,
        actor: &Actor,
        card: &mut Card,
        effect: &PanelEffect,
    ) -> Result<Outcome, InteractionError> {
        let outcome = match effect {
            PanelEffect::Reposition(target) => {
                self.mutator.apply(actor, card, CardChange::Reposition(*target)).await?;
                let place = match target {
                    PositionTarget::Top => "top",
                    PositionTarget::Bottom => "bottom",
                };
                Outcome {
                    pressed: Some(render::position_button(card)),
                    toast: Some(format!("You moved card \"{}\" to the {place} of the list", card.name)),
                }
            }
            PanelEffect::Archive(closed) => {
                self.mutator.apply(actor, card, CardChange::Archive(*closed)).await?;
                let verb = if *closed { "archived" } else { "unarchived" };
                Outcome {
                    pressed: Some(render::archive_button(card)),
                    toast: Some(format!("You {verb} card \"{}\"", card.name)),
                }
            }
            PanelEffect::MoveToList(list) => {
                let lists = self.cache.lists(actor, &card.id_board).await?;
                let target = lists.into_iter().find(|known| &known.id == list).ok_or_else(|| {
                    CoreError::LocalInconsistency(format!(
                        "list {list} is not on board {}",
                        card.id_board
                    ))
                })?;
                let toast = format!("You moved card \"{}\" to \"{}\"", card.name, target.name);
                self.mutator.apply(actor, card, CardChange::MoveTo(target)).await?;
                Outcome { pressed: None, toast: Some(toast) }
            }
            PanelEffect::ToggleMember { member, assign } => {
                let members = self.cache.members(actor, &card.id_board).await?;
                let target =
                    members.into_iter().find(|known| &known.id == member).ok_or_else(|| {
                        CoreError::LocalInconsistency(format!(
                            "member {member} is not on board {}",
                            card.id_board
                        ))
                    })?;
                let change = if *assign {
                    CardChange::Assign(target.clone())
                } else {
                    CardChange::Unassign(target.id.clone())
                };
                self.mutator.apply(actor, card, change).await?;
                let assigned = card.is_assigned_to(&target.id);
                Outcome { pressed: Some(render::member_button(&target, assigned)), toast: None }
            }
            PanelEffect::ToggleLabel { label, attach } => {
                let labels = self.cache.labels(actor, &card.id_board).await?;
                let target = labels.into_iter().find(|known| &known.id == label).ok_or_else(|| {
                    CoreError::LocalInconsistency(format!(
                        "label {label} is not on board {}",
                        card.id_board
                    ))
                })?;
                let change = if *attach {
                    CardChange::AttachLabel(target.clone())
                } else {
                    CardChange::DetachLabel(target.id.clone())
                };
                self.mutator.apply(actor, card, change).await?;
                let attached = card.has_label(&target.id);
                Outcome { pressed: Some(render::label_button(&target, attached)), toast: None }
            }
            PanelEffect::SetDue(due) => {
                self.mutator.apply(actor, card, CardChange::SetDue(Some(*due))).await?;
                Outcome::default()
            }
            PanelEffect::ClearDue => {
                self.mutator.apply(actor, card, CardChange::SetDue(None)).await?;
                Outcome::default()
            }
            PanelEffect::None
            | PanelEffect::ToggleVote
            | PanelEffect::PromptName
            | PanelEffect::PromptDescription
            | PanelEffect::PromptDue => Outcome::default(),
        };
        Ok(outcome)
    }

    async fn edit_for(
        &self,
        actor: &Actor,
        press: &ButtonPress,
        transition: &PanelTransition,
        card: &Card,
        pressed: Option<PanelButton>,
    ) -> Result<PanelEdit, InteractionError> {
        let menu = match (transition.render, pressed) {
            (PanelRender::Keep, _) => return Ok(PanelEdit::Unchanged),
            (PanelRender::PressedButton, Some(button)) => {
                return Ok(PanelEdit::ReplaceButton(button))
            }
            (PanelRender::PressedButton, None) => press.menu,
            (PanelRender::Menu(menu), _) => menu,
        };
        let panel = self.panel_for(actor, card, menu).await?;
        Ok(PanelEdit::Replace { text: render::card_text(card, actor.utc_offset), panel })
    }

    async fn panel_for(&self, actor: &Actor, card: &Card, menu: Menu) -> Result<Panel, CoreError> {
        let panel = match menu {
            Menu::Collapsed => render::collapsed_panel(card),
            Menu::Expanded => render::expanded_panel(card),
            Menu::Move => render::move_panel(card, &self.cache.lists(actor, &card.id_board).await?),
            Menu::Assign => {
                render::assign_panel(card, &self.cache.members(actor, &card.id_board).await?)
            }
            Menu::Label => {
                render::label_panel(card, &self.cache.labels(actor, &card.id_board).await?)
            }
            Menu::Due => render::due_panel(card, (self.clock)(), actor.utc_offset),
        };
        Ok(panel)
    }
}

fn collapsed_edit(actor: &Actor, card: &Card) -> PanelEdit {
    PanelEdit::Replace {
        text: render::card_text(card, actor.utc_offset),
        panel: render::collapsed_panel(card),
    }
}
