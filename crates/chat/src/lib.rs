//! Chat front end: card panels, free-text replies, notification filters
//! and the update loop that ties them to a messaging host.

pub mod drafts;
pub mod events;
pub mod filters;
pub mod interaction;
pub mod platform;
pub mod render;
pub mod updates;

pub use events::{
    dispatcher, ActorResolver, ChatEnvelope, ChatEvent, ChatServices, EventContext,
    EventDispatcher, HandlerResult, Reply, Sender,
};
pub use drafts::{CardCreator, DraftReply};
pub use filters::{FilterReply, FilterTuner};
pub use interaction::{CardInteraction, InteractionError, PanelEdit, PressResponse};
pub use platform::{MessageHandle, MessagingPlatform, PlatformError};
pub use updates::{NoopUpdateTransport, ReconnectPolicy, UpdatePump, UpdateTransport};
