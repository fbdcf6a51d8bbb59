//! Scripted fakes of the remote port plus fixture builders.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::board::{Board, BoardDetail, Label, List, Member};
use crate::domain::card::{Card, HEAD_POSITION};
use crate::domain::identity::Credential;
use crate::domain::webhook::WebhookInfo;
use crate::domain::{BoardId, CardId, LabelId, ListId, MemberId, WebhookId};
use crate::ports::{
    CardMutation, MutationReceipt, PositionTarget, RemoteBoardClient, RemoteError,
};

#[derive(Clone, Debug, Default)]
pub struct RemoteFixture {
    pub me: Member,
    pub boards: Vec<Board>,
    pub details: HashMap<BoardId, BoardDetail>,
    pub cards: HashMap<CardId, Card>,
    pub board_cards: HashMap<BoardId, Vec<Card>>,
    pub member_cards: Vec<Card>,
    pub webhooks: Vec<WebhookInfo>,
    /// When false a created webhook never shows up in the webhook listing.
    pub register_created_webhooks: bool,
}

impl RemoteFixture {
    pub fn new(me: Member) -> Self {
        Self { me, register_created_webhooks: true, ..Self::default() }
    }
}

#[derive(Default)]
struct ScriptState {
    fixture: RemoteFixture,
    failures: HashMap<&'static str, VecDeque<RemoteError>>,
    calls: Vec<&'static str>,
    mutations: Vec<(CardId, CardMutation)>,
    created_webhooks: usize,
    created_cards: usize,
}

pub struct ScriptedRemote {
    state: Mutex<ScriptState>,
}

impl ScriptedRemote {
    pub fn new(fixture: RemoteFixture) -> Self {
        Self { state: Mutex::new(ScriptState { fixture, ..ScriptState::default() }) }
    }

    /// The next call of `operation` fails with `error`.
    pub async fn fail_next(&self, operation: &'static str, error: RemoteError) {
        let mut state = self.state.lock().await;
        state.failures.entry(operation).or_default().push_back(error);
    }

    pub async fn calls(&self) -> Vec<&'static str> {
        self.state.lock().await.calls.clone()
    }

    pub async fn call_count(&self, operation: &str) -> usize {
        self.state.lock().await.calls.iter().filter(|call| **call == operation).count()
    }

    pub async fn mutations(&self) -> Vec<(CardId, CardMutation)> {
        self.state.lock().await.mutations.clone()
    }

    pub async fn webhooks_registered(&self) -> Vec<WebhookInfo> {
        self.state.lock().await.fixture.webhooks.clone()
    }

    pub async fn created_webhooks(&self) -> usize {
        self.state.lock().await.created_webhooks
    }

    async fn enter(&self, operation: &'static str) -> Result<(), RemoteError> {
        let mut state = self.state.lock().await;
        state.calls.push(operation);
        match state.failures.get_mut(operation).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteBoardClient for ScriptedRemote {
    async fn current_member(&self, _credential: &Credential) -> Result<Member, RemoteError> {
        self.enter("current_member").await?;
        Ok(self.state.lock().await.fixture.me.clone())
    }

    async fn boards(&self, _credential: &Credential) -> Result<Vec<Board>, RemoteError> {
        self.enter("boards").await?;
        Ok(self.state.lock().await.fixture.boards.clone())
    }

    async fn board_detail(
        &self,
        _credential: &Credential,
        board: &BoardId,
    ) -> Result<BoardDetail, RemoteError> {
        self.enter("board_detail").await?;
        let state = self.state.lock().await;
        state
            .fixture
            .details
            .get(board)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("board {board}")))
    }

    async fn card(&self, _credential: &Credential, card: &CardId) -> Result<Card, RemoteError> {
        self.enter("card").await?;
        let state = self.state.lock().await;
        state
            .fixture
            .cards
            .get(card)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("card {card}")))
    }

    async fn board_cards(
        &self,
        _credential: &Credential,
        board: &BoardId,
    ) -> Result<Vec<Card>, RemoteError> {
        self.enter("board_cards").await?;
        Ok(self.state.lock().await.fixture.board_cards.get(board).cloned().unwrap_or_default())
    }

    async fn member_cards(&self, _credential: &Credential) -> Result<Vec<Card>, RemoteError> {
        self.enter("member_cards").await?;
        Ok(self.state.lock().await.fixture.member_cards.clone())
    }

    async fn mutate_card(
        &self,
        _credential: &Credential,
        card: &CardId,
        mutation: &CardMutation,
    ) -> Result<MutationReceipt, RemoteError> {
        self.enter("mutate_card").await?;
        let mut state = self.state.lock().await;
        state.mutations.push((card.clone(), mutation.clone()));
        let pos = match mutation {
            CardMutation::SetPosition(PositionTarget::Top) => Some(8192.0),
            CardMutation::SetPosition(PositionTarget::Bottom) => Some(196_608.0),
            _ => None,
        };
        Ok(MutationReceipt { pos })
    }

    async fn create_card(
        &self,
        _credential: &Credential,
        list: &ListId,
        name: &str,
    ) -> Result<Card, RemoteError> {
        self.enter("create_card").await?;
        let mut state = self.state.lock().await;
        let board = state
            .fixture
            .details
            .iter()
            .find(|(_, detail)| detail.lists.iter().any(|known| &known.id == list))
            .map(|(board, _)| board.clone())
            .ok_or_else(|| RemoteError::NotFound(format!("list {list}")))?;
        state.created_cards += 1;
        let mut created =
            card(&format!("new-{}", state.created_cards), name, board.as_str(), list.as_str());
        created.pos = HEAD_POSITION * (state.created_cards as f64 + 1.0);
        state.fixture.cards.insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn create_webhook(
        &self,
        _credential: &Credential,
        board: &BoardId,
        callback_url: &str,
        description: &str,
    ) -> Result<WebhookInfo, RemoteError> {
        self.enter("create_webhook").await?;
        let mut state = self.state.lock().await;
        state.created_webhooks += 1;
        let webhook = WebhookInfo {
            id: WebhookId::new(format!("wh-{}-{}", board, state.created_webhooks)),
            id_model: board.0.clone(),
            callback_url: callback_url.to_owned(),
            description: description.to_owned(),
            active: true,
        };
        if state.fixture.register_created_webhooks {
            state.fixture.webhooks.push(webhook.clone());
        }
        Ok(webhook)
    }

    async fn webhooks(&self, _credential: &Credential) -> Result<Vec<WebhookInfo>, RemoteError> {
        self.enter("webhooks").await?;
        Ok(self.state.lock().await.fixture.webhooks.clone())
    }
}

pub fn member(id: &str, username: &str) -> Member {
    Member { id: MemberId::new(id), username: username.to_owned(), full_name: username.to_owned() }
}

pub fn board(id: &str, name: &str) -> Board {
    Board { id: BoardId::new(id), name: name.to_owned(), ..Board::default() }
}

pub fn list(id: &str, name: &str, board: &str) -> List {
    List { id: ListId::new(id), name: name.to_owned(), id_board: BoardId::new(board) }
}

pub fn label(id: &str, name: &str, uses: u32) -> Label {
    Label { id: LabelId::new(id), name: name.to_owned(), color: Some("green".to_owned()), uses }
}

pub fn card(id: &str, name: &str, board: &str, list: &str) -> Card {
    Card {
        id: CardId::new(id),
        name: name.to_owned(),
        id_board: BoardId::new(board),
        id_list: ListId::new(list),
        ..Card::default()
    }
}
