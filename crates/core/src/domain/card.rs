use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::board::{Board, Label, List, Member};
use super::{BoardId, CardId, LabelId, ListId, MemberId};
use crate::ports::store::CacheDelta;

/// Cards at or above this position sit at the head of their list.
pub const HEAD_POSITION: f64 = 65535.0;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: CardId,
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pos: f64,
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub id_board: BoardId,
    #[serde(default)]
    pub id_list: ListId,
    #[serde(default)]
    pub board: Option<Board>,
    #[serde(default)]
    pub list: Option<List>,
    #[serde(default)]
    pub id_members: Vec<MemberId>,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub id_members_voted: Vec<MemberId>,
    #[serde(default)]
    pub checklists: Vec<Checklist>,
    #[serde(default)]
    pub date_last_activity: Option<DateTime<Utc>>,
    #[serde(default)]
    pub member_creator: Option<Member>,
    #[serde(default)]
    pub short_url: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checklist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub check_items: Vec<CheckItem>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub state: CheckItemState,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckItemState {
    Complete,
    #[default]
    Incomplete,
}

impl Card {
    pub fn is_assigned_to(&self, member: &MemberId) -> bool {
        self.id_members.contains(member)
    }

    pub fn has_label(&self, label: &LabelId) -> bool {
        self.labels.iter().any(|attached| &attached.id == label)
    }

    pub fn has_vote_from(&self, member: &MemberId) -> bool {
        self.id_members_voted.contains(member)
    }

    pub fn vote_count(&self) -> usize {
        self.id_members_voted.len()
    }

    pub fn is_at_head(&self) -> bool {
        self.pos <= HEAD_POSITION
    }

    /// Applies the same change the cache receives through [`CardPatch::deltas`].
    pub fn apply(&mut self, patch: &CardPatch) {
        match patch {
            CardPatch::Name(name) => self.name = name.clone(),
            CardPatch::Description(desc) => self.desc = desc.clone(),
            CardPatch::Due(due) => self.due = *due,
            CardPatch::Position(pos) => self.pos = *pos,
            CardPatch::Closed(closed) => self.closed = *closed,
            CardPatch::List(list) => {
                self.id_list = list.id.clone();
                self.list = Some(list.clone());
            }
            CardPatch::AddMember(member) => {
                if !self.id_members.contains(&member.id) {
                    self.id_members.push(member.id.clone());
                }
                if !self.members.iter().any(|known| known.id == member.id) {
                    self.members.push(member.clone());
                }
            }
            CardPatch::RemoveMember(member) => {
                self.id_members.retain(|known| known != member);
                self.members.retain(|known| &known.id != member);
            }
            CardPatch::AddLabel(label) => {
                if !self.has_label(&label.id) {
                    self.labels.push(label.clone());
                }
            }
            CardPatch::RemoveLabel(label) => self.labels.retain(|known| &known.id != label),
            CardPatch::AddVote(member) => {
                if !self.id_members_voted.contains(member) {
                    self.id_members_voted.push(member.clone());
                }
            }
            CardPatch::RemoveVote(member) => self.id_members_voted.retain(|known| known != member),
        }
    }
}

/// Field-level change to a single card.
#[derive(Clone, Debug, PartialEq)]
pub enum CardPatch {
    Name(String),
    Description(String),
    Due(Option<DateTime<Utc>>),
    Position(f64),
    Closed(bool),
    List(List),
    AddMember(Member),
    RemoveMember(MemberId),
    AddLabel(Label),
    RemoveLabel(LabelId),
    AddVote(MemberId),
    RemoveVote(MemberId),
}

impl CardPatch {
    /// Lowers the patch into store deltas over the card's wire field names.
    pub fn deltas(&self) -> Result<Vec<CacheDelta>, serde_json::Error> {
        let deltas = match self {
            Self::Name(name) => vec![CacheDelta::set("name", Value::from(name.as_str()))],
            Self::Description(desc) => vec![CacheDelta::set("desc", Value::from(desc.as_str()))],
            Self::Due(due) => vec![CacheDelta::set("due", serde_json::to_value(due)?)],
            Self::Position(pos) => vec![CacheDelta::set("pos", serde_json::to_value(pos)?)],
            Self::Closed(closed) => vec![CacheDelta::set("closed", Value::from(*closed))],
            Self::List(list) => vec![
                CacheDelta::set("idList", Value::from(list.id.as_str())),
                CacheDelta::set("list", serde_json::to_value(list)?),
            ],
            Self::AddMember(member) => vec![
                CacheDelta::add_to_set("idMembers", Value::from(member.id.as_str())),
                CacheDelta::add_to_set("members", serde_json::to_value(member)?),
            ],
            Self::RemoveMember(member) => vec![
                CacheDelta::remove_from_set("idMembers", Value::from(member.as_str())),
                CacheDelta::remove_from_set("members", id_object(member.as_str())),
            ],
            Self::AddLabel(label) => {
                vec![CacheDelta::add_to_set("labels", serde_json::to_value(label)?)]
            }
            Self::RemoveLabel(label) => {
                vec![CacheDelta::remove_from_set("labels", id_object(label.as_str()))]
            }
            Self::AddVote(member) => {
                vec![CacheDelta::add_to_set("idMembersVoted", Value::from(member.as_str()))]
            }
            Self::RemoveVote(member) => {
                vec![CacheDelta::remove_from_set("idMembersVoted", Value::from(member.as_str()))]
            }
        };
        Ok(deltas)
    }
}

fn id_object(id: &str) -> Value {
    let mut object = serde_json::Map::new();
    object.insert("id".to_owned(), Value::from(id));
    Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card() -> Card {
        Card {
            id: CardId::new("c1"),
            name: "Ship it".to_owned(),
            id_members: vec![MemberId::new("m1")],
            members: vec![Member {
                id: MemberId::new("m1"),
                username: "ann".to_owned(),
                full_name: "Ann".to_owned(),
            }],
            ..Card::default()
        }
    }

    #[test]
    fn patch_applied_to_document_matches_patch_applied_to_card() {
        let patches = vec![
            CardPatch::Name("Renamed".to_owned()),
            CardPatch::AddMember(Member {
                id: MemberId::new("m2"),
                username: "bob".to_owned(),
                full_name: String::new(),
            }),
            CardPatch::AddMember(Member {
                id: MemberId::new("m2"),
                username: "bob".to_owned(),
                full_name: String::new(),
            }),
            CardPatch::RemoveMember(MemberId::new("m1")),
            CardPatch::AddVote(MemberId::new("m2")),
            CardPatch::Position(12.5),
            CardPatch::List(List {
                id: ListId::new("l2"),
                name: "Done".to_owned(),
                id_board: BoardId::new("b1"),
            }),
        ];

        let mut in_hand = card();
        let mut document = serde_json::to_value(card()).expect("serialize card");
        for patch in &patches {
            in_hand.apply(patch);
            for delta in patch.deltas().expect("deltas") {
                delta.apply(&mut document);
            }
        }

        let cached: Card = serde_json::from_value(document).expect("decode card");
        assert_eq!(cached, in_hand);
        assert_eq!(in_hand.id_members, vec![MemberId::new("m2")]);
        assert_eq!(in_hand.members.len(), 1);
    }

    #[test]
    fn head_threshold_is_inclusive() {
        let mut card = card();
        card.pos = HEAD_POSITION;
        assert!(card.is_at_head());
        card.pos = HEAD_POSITION + 1.0;
        assert!(!card.is_at_head());
    }

    #[test]
    fn decodes_remote_payload_with_missing_optional_fields() {
        let card: Card = serde_json::from_value(serde_json::json!({
            "id": "c9",
            "name": "Bare",
            "due": null,
            "checklists": [{"id": "k", "name": "Todo", "checkItems": [
                {"id": "i1", "name": "a", "state": "complete"},
                {"id": "i2", "name": "b", "state": "incomplete"}
            ]}]
        }))
        .expect("decode");

        assert_eq!(card.due, None);
        assert_eq!(card.checklists[0].check_items[0].state, CheckItemState::Complete);
        assert!(card.labels.is_empty());
    }
}
