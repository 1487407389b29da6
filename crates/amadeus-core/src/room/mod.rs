//! The Room state machine (C4), split into the mailbox contract
//! ([`messages`]), the controller-private data it operates on
//! ([`state`]), and the actor loop itself ([`controller`]).

mod controller;
mod messages;
mod state;

pub use controller::{spawn, RoomHandle};
pub use messages::ControllerMessage;
