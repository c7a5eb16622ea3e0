//! Audio pipeline components.
//!
//! Both directions meet the render clock here:
//!
//! ```text
//! network → delivery shim → MessagePort → InboundBridge → render outputs
//! capture → OutboundBridge → outbound channel → Router → transports
//! ```
//!
//! - **Sample Buffer**: Fixed-capacity store absorbing irregular network arrival
//! - **Gate**: Buffering/playback hysteresis over buffer occupancy
//! - **Inbound/Outbound Bridges**: Per-tick state machines for each direction
//! - **Router**: Fans outbound messages out to transports with retry logic
//! - **Delivery**: Decodes network payloads into processor mailboxes
//!
//! Nothing on the render path blocks or awaits.

mod delivery;
mod gate;
mod inbound;
mod outbound;
mod router;
mod sample_buffer;

pub use delivery::{run_delivery, spawn_delivery};
pub use gate::{BufferingGate, BufferingState, Transition};
pub use inbound::InboundBridge;
pub use outbound::OutboundBridge;
pub use router::{DeliveryHandle, Router, RouterCommand};
pub use sample_buffer::{SampleBuffer, WriteOutcome};
