//! Card message text and the button panels for every menu.

use boardlink_core::domain::board::{Label, List, Member};
use boardlink_core::domain::card::{Card, CheckItemState};
use boardlink_core::due::QuickPick;
use boardlink_core::panel::{ButtonId, Command, Menu, Panel, PanelButton, STATE_OFF, STATE_ON};
use boardlink_core::ranking::labels_by_usage;
use chrono::{DateTime, FixedOffset, Utc};

pub const MARK: &str = "✅ ";
const UNMARKED: &str = "   ";

pub const COLLAPSED_WIDTH: usize = 4;
pub const EXPANDED_WIDTH: usize = 3;
pub const PICKER_WIDTH: usize = 1;

/// Lays buttons out left to right, wrapping at a fixed width.
pub struct PanelBuilder {
    menu: Menu,
    width: usize,
    rows: Vec<Vec<PanelButton>>,
}

impl PanelBuilder {
    pub fn new(menu: Menu, width: usize) -> Self {
        Self { menu, width: width.max(1), rows: Vec::new() }
    }

    pub fn button(mut self, button: PanelButton) -> Self {
        match self.rows.last_mut() {
            Some(row) if row.len() < self.width => row.push(button),
            _ => self.rows.push(vec![button]),
        }
        self
    }

    pub fn buttons(self, buttons: impl IntoIterator<Item = PanelButton>) -> Self {
        buttons.into_iter().fold(self, Self::button)
    }

    pub fn build(self) -> Panel {
        Panel { menu: self.menu, rows: self.rows }
    }
}

pub fn vote_button(card: &Card) -> PanelButton {
    let label = match card.vote_count() {
        0 => "👍".to_owned(),
        votes => format!("👍 {votes}"),
    };
    PanelButton::new(label, Command::Vote)
}

/// State 1 moves the card to the top, so it is offered while the card sits
/// below the head of its list.
pub fn position_button(card: &Card) -> PanelButton {
    if card.is_at_head() {
        PanelButton::new("⬇ To the bottom", Command::Position).with_state(STATE_OFF)
    } else {
        PanelButton::new("⬆ To the top", Command::Position).with_state(STATE_ON)
    }
}

pub fn archive_button(card: &Card) -> PanelButton {
    if card.closed {
        PanelButton::new("Unarchive", Command::Archive).with_state(STATE_OFF)
    } else {
        PanelButton::new("Archive", Command::Archive).with_state(STATE_ON)
    }
}

pub fn member_button(member: &Member, assigned: bool) -> PanelButton {
    let (mark, state) = if assigned { (MARK, STATE_ON) } else { (UNMARKED, STATE_OFF) };
    PanelButton::new(format!("{mark}@{}", member.username), ButtonId::Member(member.id.clone()))
        .with_state(state)
}

pub fn label_button(label: &Label, attached: bool) -> PanelButton {
    let (mark, state) = if attached { (MARK, STATE_ON) } else { (UNMARKED, STATE_OFF) };
    let text = format!("{mark}{} {}", color_emoji(label.color.as_deref()), label.display_name());
    PanelButton::new(text, ButtonId::Label(label.id.clone())).with_state(state)
}

pub fn collapsed_panel(card: &Card) -> Panel {
    PanelBuilder::new(Menu::Collapsed, COLLAPSED_WIDTH)
        .button(PanelButton::new("Assign", Command::Assign))
        .button(PanelButton::new("Move", Command::Move))
        .button(vote_button(card))
        .button(PanelButton::new("…", Command::More))
        .build()
}

pub fn expanded_panel(card: &Card) -> Panel {
    PanelBuilder::new(Menu::Expanded, EXPANDED_WIDTH)
        .button(PanelButton::new("Assign", Command::Assign))
        .button(PanelButton::new("Move", Command::Move))
        .button(vote_button(card))
        .button(PanelButton::new("Name", Command::Name))
        .button(PanelButton::new("Description", Command::Description))
        .button(PanelButton::new("Due", Command::Due))
        .button(position_button(card))
        .button(PanelButton::new("Label", Command::Label))
        .button(archive_button(card))
        .button(PanelButton::new("↑ Less", Command::Back))
        .build()
}

/// Lists of the card's board other than the one it is in.
pub fn move_panel(card: &Card, lists: &[List]) -> Panel {
    PanelBuilder::new(Menu::Move, PICKER_WIDTH)
        .buttons(
            lists
                .iter()
                .filter(|list| list.id != card.id_list)
                .map(|list| PanelButton::new(list.name.clone(), ButtonId::List(list.id.clone()))),
        )
        .button(PanelButton::new("↑ Less", Command::Back))
        .build()
}

pub fn assign_panel(card: &Card, members: &[Member]) -> Panel {
    PanelBuilder::new(Menu::Assign, PICKER_WIDTH)
        .buttons(members.iter().map(|member| member_button(member, card.is_assigned_to(&member.id))))
        .button(PanelButton::new("← Back", Command::Back))
        .build()
}

/// Most used labels first.
pub fn label_panel(card: &Card, labels: &[Label]) -> Panel {
    PanelBuilder::new(Menu::Label, PICKER_WIDTH)
        .buttons(
            labels_by_usage(labels)
                .iter()
                .map(|label| label_button(label, card.has_label(&label.id))),
        )
        .button(PanelButton::new("← Back", Command::Back))
        .build()
}

pub fn due_panel(card: &Card, now: DateTime<Utc>, offset: FixedOffset) -> Panel {
    let mut builder = PanelBuilder::new(Menu::Due, PICKER_WIDTH);
    if card.due.is_some() {
        builder = builder.button(PanelButton::new("Clear the due date", Command::DueClear));
    }
    builder
        .buttons(QuickPick::ALL.into_iter().filter_map(|pick| {
            let due = pick.resolve(now, offset)?;
            Some(PanelButton::new(pick.label(), ButtonId::DueAt(due.timestamp())))
        }))
        .button(PanelButton::new("Enter the date", Command::DueManual))
        .button(PanelButton::new("← Back", Command::Back))
        .build()
}

pub fn color_emoji(color: Option<&str>) -> &str {
    match color {
        Some("yellow") => "🍋",
        Some("red") => "🍎",
        Some("blue") => "🔵",
        Some("green") => "🍏",
        Some("orange") => "🍊",
        Some("purple") => "🍆",
        Some("black") => "⚫️",
        Some("pink") => "🎀",
        Some("sky") => "💎",
        Some("lime") => "🎾",
        Some(other) => other,
        None => "▫️",
    }
}

pub fn format_due(due: DateTime<Utc>, offset: FixedOffset) -> String {
    due.with_timezone(&offset).format("%d.%m.%Y %H:%M").to_string()
}

/// Plain text body of a card message.
pub fn card_text(card: &Card, offset: FixedOffset) -> String {
    let mut lines = Vec::new();
    if card.closed {
        lines.push("📦 Card archived".to_owned());
    }
    let mut title = card.name.clone();
    if let Some(creator) = &card.member_creator {
        title.push_str(&format!(" (by {})", creator.full_name));
    }
    lines.push(title);

    let desc = card.desc.trim();
    if !desc.is_empty() {
        lines.push(desc.to_owned());
    }
    if !card.labels.is_empty() {
        let labels: Vec<String> = card
            .labels
            .iter()
            .map(|label| format!("{} {}", color_emoji(label.color.as_deref()), label.display_name()))
            .collect();
        lines.push(format!("  {}", labels.join(" ")));
    }
    if !card.members.is_empty() {
        let members: Vec<String> =
            card.members.iter().map(|member| format!("@{}", member.username)).collect();
        lines.push(format!("  👤 {}", members.join(", ")));
    }
    if let Some(due) = card.due {
        lines.push(format!("  📅 {}", format_due(due, offset)));
    }
    for checklist in card.checklists.iter().filter(|checklist| !checklist.check_items.is_empty()) {
        lines.push(format!("  🚩 {}", checklist.name));
        for item in &checklist.check_items {
            let mark = match item.state {
                CheckItemState::Complete => "✅",
                CheckItemState::Incomplete => "⬜️",
            };
            lines.push(format!("       {mark} {}", item.name));
        }
    }
    if let Some(list) = &card.list {
        lines.push(format!("  📁 {}", list.name));
    }
    lines.join("\n")
}
