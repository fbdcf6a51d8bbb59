pub mod engine;
pub mod states;

pub use engine::{transition, PanelEffect, PanelRender, PanelTransition, PanelTransitionError};
pub use states::{
    ButtonId, ButtonIdError, Command, Menu, Panel, PanelButton, STATE_OFF, STATE_ON,
};
