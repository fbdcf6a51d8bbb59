use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BoardId, LabelId, ListId, MemberId};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Board {
    pub id: BoardId,
    pub name: String,
    #[serde(default)]
    pub prefs: BoardPrefs,
    #[serde(default)]
    pub date_last_activity: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date_last_view: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardPrefs {
    #[serde(default)]
    pub background: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    pub id: ListId,
    pub name: String,
    #[serde(default)]
    pub id_board: BoardId,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: MemberId,
    pub username: String,
    #[serde(default)]
    pub full_name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    pub id: LabelId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub uses: u32,
}

impl Label {
    /// Unnamed labels are shown by their color.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            self.color.as_deref().unwrap_or("")
        } else {
            &self.name
        }
    }
}

/// Everything a single board-detail fetch returns.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoardDetail {
    #[serde(default)]
    pub lists: Vec<List>,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub labels: Vec<Label>,
}
