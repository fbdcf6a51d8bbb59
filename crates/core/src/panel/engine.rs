use chrono::{DateTime, Utc};
use thiserror::Error;

use super::states::{ButtonId, Command, Menu, STATE_ON};
use crate::domain::{LabelId, ListId, MemberId};
use crate::ports::PositionTarget;

#[derive(Clone, Debug, PartialEq)]
pub enum PanelEffect {
    None,
    ToggleVote,
    PromptName,
    PromptDescription,
    PromptDue,
    Reposition(PositionTarget),
    Archive(bool),
    MoveToList(ListId),
    ToggleMember { member: MemberId, assign: bool },
    ToggleLabel { label: LabelId, attach: bool },
    SetDue(DateTime<Utc>),
    ClearDue,
}

impl PanelEffect {
    pub fn mutates_remote(&self) -> bool {
        !matches!(self, Self::None | Self::PromptName | Self::PromptDescription | Self::PromptDue)
    }

    /// Opens a side conversation whose answer is written to the remote.
    pub fn prompts_for_input(&self) -> bool {
        matches!(self, Self::PromptName | Self::PromptDescription | Self::PromptDue)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanelRender {
    /// Re-render the whole panel in this menu.
    Menu(Menu),
    /// Relabel only the pressed button.
    PressedButton,
    /// Leave the panel as it is.
    Keep,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PanelTransition {
    pub from: Menu,
    pub button: ButtonId,
    pub effect: PanelEffect,
    pub render: PanelRender,
}

impl PanelTransition {
    /// Mutations, input prompts and pickers built from board data need a
    /// live credential.
    pub fn requires_credential(&self) -> bool {
        self.effect.mutates_remote()
            || self.effect.prompts_for_input()
            || matches!(self.render, PanelRender::Menu(Menu::Move | Menu::Label | Menu::Assign))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PanelTransitionError {
    #[error("invalid transition from {menu:?} using button {button:?}")]
    InvalidTransition { menu: Menu, button: ButtonId },
    #[error("toggle button {button:?} in {menu:?} carries no state")]
    MissingState { menu: Menu, button: ButtonId },
    #[error("due timestamp {0} is out of range")]
    InvalidDueTimestamp(i64),
}

/// The closed transition table of the card panel.
pub fn transition(
    menu: Menu,
    button: &ButtonId,
    state: Option<u8>,
) -> Result<PanelTransition, PanelTransitionError> {
    use Command::{
        Archive, Assign, Back, Description, Due, DueClear, DueManual, Label, More, Move, Name,
        Position, Vote,
    };
    use PanelRender::{Keep, PressedButton};

    let toggled_on = || {
        state
            .map(|state| state == STATE_ON)
            .ok_or_else(|| PanelTransitionError::MissingState { menu, button: button.clone() })
    };

    let (effect, render) = match (menu, button) {
        (Menu::Collapsed | Menu::Expanded, ButtonId::Command(Assign)) => {
            (PanelEffect::None, PanelRender::Menu(Menu::Assign))
        }
        (Menu::Collapsed | Menu::Expanded, ButtonId::Command(Move)) => {
            (PanelEffect::None, PanelRender::Menu(Menu::Move))
        }
        (Menu::Collapsed | Menu::Expanded, ButtonId::Command(Vote)) => {
            (PanelEffect::ToggleVote, PressedButton)
        }
        (Menu::Collapsed, ButtonId::Command(More)) => {
            (PanelEffect::None, PanelRender::Menu(Menu::Expanded))
        }
        (Menu::Expanded, ButtonId::Command(Name)) => (PanelEffect::PromptName, Keep),
        (Menu::Expanded, ButtonId::Command(Description)) => (PanelEffect::PromptDescription, Keep),
        (Menu::Expanded, ButtonId::Command(Due)) => (PanelEffect::None, PanelRender::Menu(Menu::Due)),
        (Menu::Expanded, ButtonId::Command(Label)) => {
            (PanelEffect::None, PanelRender::Menu(Menu::Label))
        }
        (Menu::Expanded, ButtonId::Command(Position)) => {
            let target = if toggled_on()? { PositionTarget::Top } else { PositionTarget::Bottom };
            (PanelEffect::Reposition(target), PressedButton)
        }
        (Menu::Expanded, ButtonId::Command(Archive)) => {
            (PanelEffect::Archive(toggled_on()?), PressedButton)
        }
        (Menu::Move, ButtonId::List(list)) => {
            (PanelEffect::MoveToList(list.clone()), PanelRender::Menu(Menu::Collapsed))
        }
        (Menu::Assign, ButtonId::Member(member)) => (
            PanelEffect::ToggleMember { member: member.clone(), assign: !toggled_on()? },
            PressedButton,
        ),
        (Menu::Label, ButtonId::Label(label)) => (
            PanelEffect::ToggleLabel { label: label.clone(), attach: !toggled_on()? },
            PressedButton,
        ),
        (Menu::Due, ButtonId::DueAt(unix)) => {
            let due = DateTime::<Utc>::from_timestamp(*unix, 0)
                .ok_or(PanelTransitionError::InvalidDueTimestamp(*unix))?;
            (PanelEffect::SetDue(due), PanelRender::Menu(Menu::Collapsed))
        }
        (Menu::Due, ButtonId::Command(DueClear)) => {
            (PanelEffect::ClearDue, PanelRender::Menu(Menu::Collapsed))
        }
        (Menu::Due, ButtonId::Command(DueManual)) => (PanelEffect::PromptDue, Keep),
        (
            Menu::Expanded | Menu::Move | Menu::Assign | Menu::Label | Menu::Due,
            ButtonId::Command(Back),
        ) => (PanelEffect::None, PanelRender::Menu(menu.parent())),
        _ => {
            return Err(PanelTransitionError::InvalidTransition { menu, button: button.clone() })
        }
    };

    Ok(PanelTransition { from: menu, button: button.clone(), effect, render })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::panel::states::STATE_OFF;

    fn cmd(command: Command) -> ButtonId {
        ButtonId::Command(command)
    }

    #[test]
    fn navigation_only_rerenders() {
        let more = transition(Menu::Collapsed, &cmd(Command::More), None).expect("more");
        assert_eq!(more.effect, PanelEffect::None);
        assert_eq!(more.render, PanelRender::Menu(Menu::Expanded));
        assert!(!more.requires_credential());

        let back = transition(Menu::Label, &cmd(Command::Back), None).expect("back");
        assert_eq!(back.render, PanelRender::Menu(Menu::Expanded));
        let back = transition(Menu::Due, &cmd(Command::Back), None).expect("back");
        assert_eq!(back.render, PanelRender::Menu(Menu::Expanded));
        let back = transition(Menu::Move, &cmd(Command::Back), None).expect("back");
        assert_eq!(back.render, PanelRender::Menu(Menu::Collapsed));
    }

    #[test]
    fn member_toggle_flips_on_state_and_relabels_pressed_button() {
        let member = ButtonId::Member(MemberId::new("m1"));
        let assign = transition(Menu::Assign, &member, Some(STATE_OFF)).expect("assign");
        assert_eq!(
            assign.effect,
            PanelEffect::ToggleMember { member: MemberId::new("m1"), assign: true }
        );
        assert_eq!(assign.render, PanelRender::PressedButton);

        let unassign = transition(Menu::Assign, &member, Some(STATE_ON)).expect("unassign");
        assert_eq!(
            unassign.effect,
            PanelEffect::ToggleMember { member: MemberId::new("m1"), assign: false }
        );
    }

    #[test]
    fn archive_and_position_follow_their_state_tags() {
        let archive = transition(Menu::Expanded, &cmd(Command::Archive), Some(STATE_ON))
            .expect("archive");
        assert_eq!(archive.effect, PanelEffect::Archive(true));
        let restore = transition(Menu::Expanded, &cmd(Command::Archive), Some(STATE_OFF))
            .expect("unarchive");
        assert_eq!(restore.effect, PanelEffect::Archive(false));

        let top = transition(Menu::Expanded, &cmd(Command::Position), Some(STATE_ON))
            .expect("top");
        assert_eq!(top.effect, PanelEffect::Reposition(PositionTarget::Top));
        assert_eq!(top.render, PanelRender::PressedButton);
        assert!(top.requires_credential());
    }

    #[test]
    fn toggles_without_state_are_rejected() {
        let error = transition(Menu::Expanded, &cmd(Command::Archive), None)
            .expect_err("state is required");
        assert!(matches!(error, PanelTransitionError::MissingState { .. }));
    }

    #[test]
    fn move_and_due_picks_return_to_collapsed() {
        let moved = transition(Menu::Move, &ButtonId::List(ListId::new("l2")), None)
            .expect("move");
        assert_eq!(moved.effect, PanelEffect::MoveToList(ListId::new("l2")));
        assert_eq!(moved.render, PanelRender::Menu(Menu::Collapsed));

        let due = transition(Menu::Due, &ButtonId::DueAt(1_767_225_599), None).expect("due");
        assert!(matches!(due.effect, PanelEffect::SetDue(_)));
        assert_eq!(due.render, PanelRender::Menu(Menu::Collapsed));

        let cleared = transition(Menu::Due, &cmd(Command::DueClear), None).expect("clear");
        assert_eq!(cleared.effect, PanelEffect::ClearDue);
    }

    #[test]
    fn side_conversations_keep_panel() {
        for (menu, command, effect) in [
            (Menu::Expanded, Command::Name, PanelEffect::PromptName),
            (Menu::Expanded, Command::Description, PanelEffect::PromptDescription),
            (Menu::Due, Command::DueManual, PanelEffect::PromptDue),
        ] {
            let outcome = transition(menu, &cmd(command), None).expect("prompt");
            assert_eq!(outcome.effect, effect);
            assert_eq!(outcome.render, PanelRender::Keep);
            assert!(!outcome.effect.mutates_remote());
            assert!(outcome.requires_credential());
        }
    }

    #[test]
    fn buttons_from_other_menus_are_invalid() {
        for (menu, button) in [
            (Menu::Collapsed, ButtonId::List(ListId::new("l1"))),
            (Menu::Move, ButtonId::Member(MemberId::new("m1"))),
            (Menu::Collapsed, cmd(Command::Back)),
            (Menu::Collapsed, cmd(Command::Archive)),
            (Menu::Expanded, cmd(Command::More)),
            (Menu::Assign, ButtonId::DueAt(1)),
        ] {
            let error = transition(menu, &button, Some(STATE_ON)).expect_err("invalid");
            assert!(matches!(error, PanelTransitionError::InvalidTransition { .. }));
        }
    }
}
