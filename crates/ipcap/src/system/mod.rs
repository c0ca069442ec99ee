pub mod dispatch;
pub mod mux;

pub use dispatch::{DispatchStats, PacketStream};
pub use mux::{merge, Completion};
