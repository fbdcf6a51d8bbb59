use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{LabelId, ListId, MemberId};

pub const STATE_OFF: u8 = 0;
pub const STATE_ON: u8 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Menu {
    Collapsed,
    Expanded,
    Move,
    Label,
    Assign,
    Due,
}

impl Menu {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Collapsed => "collapsed",
            Self::Expanded => "expanded",
            Self::Move => "move",
            Self::Label => "label",
            Self::Assign => "assign",
            Self::Due => "due",
        }
    }

    /// Menu a `back` press returns to. Label and due pickers are opened from
    /// the expanded panel, so they step back one level instead of collapsing.
    pub fn parent(self) -> Self {
        match self {
            Self::Label | Self::Due => Self::Expanded,
            Self::Collapsed | Self::Expanded | Self::Move | Self::Assign => Self::Collapsed,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Assign,
    Move,
    Vote,
    More,
    Name,
    Description,
    Due,
    Position,
    Label,
    Archive,
    Back,
    DueManual,
    DueClear,
}

impl Command {
    const ALL: [Command; 13] = [
        Self::Assign,
        Self::Move,
        Self::Vote,
        Self::More,
        Self::Name,
        Self::Description,
        Self::Due,
        Self::Position,
        Self::Label,
        Self::Archive,
        Self::Back,
        Self::DueManual,
        Self::DueClear,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Assign => "assign",
            Self::Move => "move",
            Self::Vote => "vote",
            Self::More => "more",
            Self::Name => "name",
            Self::Description => "desc",
            Self::Due => "due",
            Self::Position => "position",
            Self::Label => "label",
            Self::Archive => "archive",
            Self::Back => "back",
            Self::DueManual => "due_manual",
            Self::DueClear => "due_clear",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.as_str() == value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ButtonId {
    Command(Command),
    Member(MemberId),
    Label(LabelId),
    List(ListId),
    /// Quick due pick, unix seconds.
    DueAt(i64),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ButtonIdError {
    #[error("button id `{0}` has no tag")]
    Untagged(String),
    #[error("button id `{0}` has an unknown tag")]
    UnknownTag(String),
    #[error("button id `{0}` has an invalid value")]
    InvalidValue(String),
}

impl ButtonId {
    pub fn encode(&self) -> String {
        match self {
            Self::Command(command) => format!("cmd:{}", command.as_str()),
            Self::Member(member) => format!("member:{member}"),
            Self::Label(label) => format!("label:{label}"),
            Self::List(list) => format!("list:{list}"),
            Self::DueAt(unix) => format!("due:{unix}"),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ButtonIdError> {
        let (tag, value) =
            raw.split_once(':').ok_or_else(|| ButtonIdError::Untagged(raw.to_owned()))?;
        if value.is_empty() {
            return Err(ButtonIdError::InvalidValue(raw.to_owned()));
        }
        match tag {
            "cmd" => Command::parse(value)
                .map(Self::Command)
                .ok_or_else(|| ButtonIdError::InvalidValue(raw.to_owned())),
            "member" => Ok(Self::Member(MemberId::new(value))),
            "label" => Ok(Self::Label(LabelId::new(value))),
            "list" => Ok(Self::List(ListId::new(value))),
            "due" => value
                .parse::<i64>()
                .map(Self::DueAt)
                .map_err(|_| ButtonIdError::InvalidValue(raw.to_owned())),
            _ => Err(ButtonIdError::UnknownTag(raw.to_owned())),
        }
    }
}

impl From<Command> for ButtonId {
    fn from(command: Command) -> Self {
        Self::Command(command)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PanelButton {
    pub label: String,
    pub id: ButtonId,
    pub state: Option<u8>,
}

impl PanelButton {
    pub fn new(label: impl Into<String>, id: impl Into<ButtonId>) -> Self {
        Self { label: label.into(), id: id.into(), state: None }
    }

    pub fn with_state(mut self, state: u8) -> Self {
        self.state = Some(state);
        self
    }
}

/// Buttons attached to a card message, tagged with the menu they render.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Panel {
    pub menu: Menu,
    pub rows: Vec<Vec<PanelButton>>,
}

impl Panel {
    pub fn new(menu: Menu) -> Self {
        Self { menu, rows: Vec::new() }
    }

    pub fn buttons(&self) -> impl Iterator<Item = &PanelButton> {
        self.rows.iter().flatten()
    }

    pub fn find(&self, id: &ButtonId) -> Option<&PanelButton> {
        self.buttons().find(|button| &button.id == id)
    }

    /// Swaps the button carrying `replacement.id` in place.
    pub fn replace_button(&mut self, replacement: PanelButton) -> bool {
        match self.rows.iter_mut().flatten().find(|button| button.id == replacement.id) {
            Some(button) => {
                *button = replacement;
                true
            }
            None => false,
        }
    }
}
