//! Domain entities - Events, senders and outbound actions

pub mod action;
pub mod event;
pub mod user;

pub use action::Action;
pub use event::{Event, EventKind, MessageEvent, MessageType, MetaEvent, NoticeEvent, RequestEvent, Segment};
pub use user::{Role, Sender};
