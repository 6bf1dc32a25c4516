//! WebSocket relay: presence, rooms and the socket event loop.

mod events;
mod hub;
mod socket;

pub use events::{ClientEvent, ServerEvent, SignalKind};
pub use hub::Hub;
pub use socket::websocket_handler;
