pub mod fanout;
pub mod handle;
pub mod registry;

pub use fanout::{DeliveryReport, Fanout};
pub use handle::{ConnectionHandle, ConnectionId, PushError, ServerEvent};
pub use registry::{Binding, ConnectionRegistry, RoomRegistry};
