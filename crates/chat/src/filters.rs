//! Reply keyboard for tuning which board events a chat hears about.

use boardlink_core::domain::identity::ChatId;
use boardlink_core::domain::settings::{ChatBoardSetting, NotificationKind};
use boardlink_core::domain::BoardId;
use boardlink_core::notifications::{NotificationError, NotificationSettings};
use thiserror::Error;

use crate::render::MARK;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterButton {
    Switch,
    Finish,
    Kind(NotificationKind),
}

impl FilterButton {
    pub fn encode(self) -> &'static str {
        match self {
            Self::Switch => "switch",
            Self::Finish => "finish",
            Self::Kind(kind) => kind.button_id(),
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "switch" => Some(Self::Switch),
            "finish" => Some(Self::Finish),
            other => NotificationKind::from_button_id(other).map(Self::Kind),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterKey {
    pub label: String,
    pub button: FilterButton,
}

pub type FilterKeyboard = Vec<Vec<FilterKey>>;

/// Switch and finish first, then the kinds three per row. A disabled board
/// only gets the first row.
pub fn filter_keyboard(setting: &ChatBoardSetting) -> FilterKeyboard {
    let switch = if setting.enabled { "☑️ Notifications enabled" } else { "Turn on notifications" };
    let mut rows = vec![vec![
        FilterKey { label: switch.to_owned(), button: FilterButton::Switch },
        FilterKey { label: "🏁 Finish tuning".to_owned(), button: FilterButton::Finish },
    ]];
    if !setting.enabled {
        return rows;
    }
    rows.extend(NotificationKind::ALL.chunks(3).map(|kinds| {
        kinds
            .iter()
            .map(|kind| {
                let mark = if setting.filter.contains(*kind) { MARK } else { "" };
                FilterKey { label: format!("{mark}{}", kind.label()), button: FilterButton::Kind(*kind) }
            })
            .collect()
    }));
    rows
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FilterReply {
    /// Tuning is over; hide the keyboard.
    Finished { text: String },
    Updated { text: String, keyboard: FilterKeyboard },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("`{0}` is not a filter button")]
    UnknownButton(String),
    #[error(transparent)]
    Notification(#[from] NotificationError),
}

impl FilterError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::UnknownButton(_) => "Please use the keyboard buttons.",
            Self::Notification(NotificationError::BoardNotLinked { .. }) => {
                "This board is not connected to the chat any more."
            }
            Self::Notification(NotificationError::Store(_)) => {
                "Something went wrong. Please try again."
            }
        }
    }
}

#[derive(Clone)]
pub struct FilterTuner {
    settings: NotificationSettings,
}

impl FilterTuner {
    pub fn new(settings: NotificationSettings) -> Self {
        Self { settings }
    }

    pub async fn keyboard(
        &self,
        chat: ChatId,
        board: &BoardId,
    ) -> Result<FilterKeyboard, FilterError> {
        let setting = self
            .settings
            .board_setting(chat, board)
            .await
            .map_err(NotificationError::from)?
            .ok_or_else(|| NotificationError::BoardNotLinked { chat, board: board.clone() })?;
        Ok(filter_keyboard(&setting))
    }

    pub async fn press(
        &self,
        chat: ChatId,
        board: &BoardId,
        raw: &str,
    ) -> Result<FilterReply, FilterError> {
        let button =
            FilterButton::parse(raw).ok_or_else(|| FilterError::UnknownButton(raw.to_owned()))?;
        let (setting, text) = match button {
            FilterButton::Finish => return Ok(FilterReply::Finished { text: "Ok!".to_owned() }),
            FilterButton::Switch => {
                let setting = self.settings.toggle_enabled(chat, board).await?;
                let state = if setting.enabled { "on" } else { "off" };
                (setting, format!("All notifications turned {state}"))
            }
            FilterButton::Kind(kind) => {
                let setting = self.settings.toggle_notification(chat, board, kind).await?;
                (setting, "👌".to_owned())
            }
        };
        Ok(FilterReply::Updated { text, keyboard: filter_keyboard(&setting) })
    }
}
