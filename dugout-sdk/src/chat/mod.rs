//! Real-time watch-crew chat: room sockets, popup registry, view state.

pub mod connection;
pub mod event;
pub mod frame;
pub mod room;
pub mod widget;

pub use connection::{RoomHandle, SocketState, open_room};
pub use event::{ChatEvent, ChatMessage};
pub use room::RoomState;
pub use widget::{ChatWidgetRegistry, OpenedRoom};
