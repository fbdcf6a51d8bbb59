//! Tracker REST client authenticated with application key and user token.

use std::time::Duration;

use async_trait::async_trait;
use boardlink_core::config::TrackerConfig;
use boardlink_core::domain::board::{Board, BoardDetail, Member};
use boardlink_core::domain::card::Card;
use boardlink_core::domain::identity::Credential;
use boardlink_core::domain::webhook::WebhookInfo;
use boardlink_core::domain::{BoardId, CardId, ListId};
use boardlink_core::ports::{
    CardMutation, MutationReceipt, PositionTarget, RemoteBoardClient, RemoteError,
};
use chrono::SecondsFormat;
use reqwest::{Client, Method};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::classify::{classify, transport};

const OPEN_CARD_FIELDS: &str = "name,desc,idMembers,idMembersVoted,pos,due,closed,idBoard,idList,\
                                labels,dateLastActivity,shortUrl";

pub struct HttpBoardClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
}

struct Call<'a> {
    method: Method,
    /// Stable name for logs; paths may embed the user token.
    route: &'static str,
    path: String,
    params: Vec<(&'static str, &'a str)>,
}

impl<'a> Call<'a> {
    fn get(route: &'static str, path: String) -> Self {
        Self { method: Method::GET, route, path, params: Vec::new() }
    }

    fn new(method: Method, route: &'static str, path: String) -> Self {
        Self { method, route, path, params: Vec::new() }
    }

    fn param(mut self, name: &'static str, value: &'a str) -> Self {
        self.params.push((name, value));
        self
    }
}

impl HttpBoardClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Ok(Self { http, base_url, api_key })
    }

    pub fn from_config(config: &TrackerConfig) -> Result<Self, reqwest::Error> {
        Self::new(
            config.api_base_url.clone(),
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    async fn call(&self, credential: &Credential, call: Call<'_>) -> Result<Value, RemoteError> {
        let url = format!("{}/{}", self.base_url, call.path);
        let response = self
            .http
            .request(call.method.clone(), &url)
            .query(&[("key", self.api_key.expose_secret()), ("token", credential.token())])
            .query(&call.params)
            .send()
            .await
            .map_err(|error| transport(&error))?;

        let status = response.status();
        let body = response.text().await.map_err(|error| transport(&error))?;
        debug!(
            event_name = "remote.request.completed",
            method = %call.method,
            route = call.route,
            status = status.as_u16(),
            "tracker request completed"
        );

        if !status.is_success() {
            return Err(classify(status, &body));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|error| RemoteError::Decode(error.to_string()))
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        credential: &Credential,
        call: Call<'_>,
    ) -> Result<T, RemoteError> {
        let value = self.call(credential, call).await?;
        serde_json::from_value(value).map_err(|error| RemoteError::Decode(error.to_string()))
    }
}

/// Lowers a mutation onto the tracker's field endpoints.
fn mutation_call<'a>(card: &CardId, mutation: &'a CardMutation, due: &'a str) -> Call<'a> {
    let field = |name: &str| format!("cards/{card}/{name}");
    match mutation {
        CardMutation::SetName(name) => {
            Call::new(Method::PUT, "cards.name", field("name")).param("value", name)
        }
        CardMutation::SetDescription(desc) => {
            Call::new(Method::PUT, "cards.desc", field("desc")).param("value", desc)
        }
        CardMutation::SetDue(_) => Call::new(Method::PUT, "cards.due", field("due")).param("value", due),
        CardMutation::SetPosition(target) => {
            let value = match target {
                PositionTarget::Top => "top",
                PositionTarget::Bottom => "bottom",
            };
            Call::new(Method::PUT, "cards.pos", field("pos")).param("value", value)
        }
        CardMutation::SetClosed(closed) => Call::new(Method::PUT, "cards.closed", field("closed"))
            .param("value", if *closed { "true" } else { "false" }),
        CardMutation::MoveToList(list) => {
            Call::new(Method::PUT, "cards.id_list", field("idList")).param("value", list.as_str())
        }
        CardMutation::AddMember(member) => {
            Call::new(Method::POST, "cards.id_members", field("idMembers"))
                .param("value", member.as_str())
        }
        CardMutation::RemoveMember(member) => {
            Call::new(Method::DELETE, "cards.id_members", field(&format!("idMembers/{member}")))
        }
        CardMutation::AddLabel(label) => {
            Call::new(Method::POST, "cards.id_labels", field("idLabels")).param("value", label.as_str())
        }
        CardMutation::RemoveLabel(label) => {
            Call::new(Method::DELETE, "cards.id_labels", field(&format!("idLabels/{label}")))
        }
        CardMutation::AddVote(member) => {
            Call::new(Method::POST, "cards.members_voted", field("membersVoted"))
                .param("value", member.as_str())
        }
        CardMutation::RemoveVote(member) => {
            Call::new(Method::DELETE, "cards.members_voted", field(&format!("membersVoted/{member}")))
        }
    }
}

#[async_trait]
impl RemoteBoardClient for HttpBoardClient {
    async fn current_member(&self, credential: &Credential) -> Result<Member, RemoteError> {
        self.fetch(credential, Call::get("members.me", "members/me".to_owned())).await
    }

    async fn boards(&self, credential: &Credential) -> Result<Vec<Board>, RemoteError> {
        let call =
            Call::get("members.me.boards", "members/me/boards".to_owned()).param("filter", "open");
        self.fetch(credential, call).await
    }

    async fn board_detail(
        &self,
        credential: &Credential,
        board: &BoardId,
    ) -> Result<BoardDetail, RemoteError> {
        let call = Call::get("boards.detail", format!("boards/{board}"))
            .param("fields", "name")
            .param("lists", "open")
            .param("list_fields", "name,idBoard")
            .param("members", "all")
            .param("member_fields", "fullName,username")
            .param("labels", "all");
        self.fetch(credential, call).await
    }

    async fn card(&self, credential: &Credential, card: &CardId) -> Result<Card, RemoteError> {
        let call = Call::get("cards.detail", format!("cards/{card}"))
            .param("members", "true")
            .param("member_fields", "fullName,username")
            .param("checklists", "all")
            .param("member_creator", "true");
        self.fetch(credential, call).await
    }

    async fn board_cards(
        &self,
        credential: &Credential,
        board: &BoardId,
    ) -> Result<Vec<Card>, RemoteError> {
        let call = Call::get("boards.cards", format!("boards/{board}/cards"))
            .param("filter", "open")
            .param("fields", OPEN_CARD_FIELDS);
        self.fetch(credential, call).await
    }

    async fn member_cards(&self, credential: &Credential) -> Result<Vec<Card>, RemoteError> {
        let call = Call::get("members.me.cards", "members/me/cards".to_owned())
            .param("filter", "open")
            .param("fields", OPEN_CARD_FIELDS);
        self.fetch(credential, call).await
    }

    async fn mutate_card(
        &self,
        credential: &Credential,
        card: &CardId,
        mutation: &CardMutation,
    ) -> Result<MutationReceipt, RemoteError> {
        let due = match mutation {
            CardMutation::SetDue(Some(due)) => due.to_rfc3339_opts(SecondsFormat::Millis, true),
            _ => "null".to_owned(),
        };
        let value = self.call(credential, mutation_call(card, mutation, &due)).await?;
        Ok(MutationReceipt { pos: value.get("pos").and_then(Value::as_f64) })
    }

    async fn create_card(
        &self,
        credential: &Credential,
        list: &ListId,
        name: &str,
    ) -> Result<Card, RemoteError> {
        let call = Call::new(Method::POST, "cards.create", "cards".to_owned())
            .param("idList", list.as_str())
            .param("name", name)
            .param("pos", "bottom");
        self.fetch(credential, call).await
    }

    async fn create_webhook(
        &self,
        credential: &Credential,
        board: &BoardId,
        callback_url: &str,
        description: &str,
    ) -> Result<WebhookInfo, RemoteError> {
        let call = Call::new(
            Method::POST,
            "tokens.webhooks",
            format!("tokens/{}/webhooks", credential.token()),
        )
        .param("description", description)
        .param("callbackURL", callback_url)
        .param("idModel", board.as_str());
        self.fetch(credential, call).await
    }

    async fn webhooks(&self, credential: &Credential) -> Result<Vec<WebhookInfo>, RemoteError> {
        let call = Call::get("tokens.webhooks", format!("tokens/{}/webhooks", credential.token()));
        self.fetch(credential, call).await
    }
}
