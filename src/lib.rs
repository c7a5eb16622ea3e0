//! # voice-bridge
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Real-time duplex audio bridging between a packetized network stream and a
//! fixed-quantum renderer.
//!
//! `voice-bridge` buffers irregularly arriving mono PCM, converts it to the
//! render rate and serves it one quantum at a time; in the other direction it
//! quantizes captured audio to little-endian PCM16 and pushes one message per
//! quantum towards the network.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use voice_bridge::{ControlSignal, UplinkTransport, VoiceBridge};
//! use tokio::sync::mpsc;
//!
//! let (uplink_tx, mut uplink_rx) = mpsc::channel(64);
//!
//! let mut bridge = VoiceBridge::builder()
//!     .add_transport(UplinkTransport::new(uplink_tx))
//!     .on_event(|e| tracing::warn!(?e, "bridge event"))
//!     .build()?;
//! let delivery = bridge.start_delivery().await?;
//!
//! // From the network side
//! let port = bridge.port();
//! port.post_pcm(samples)?;
//! port.post_control(ControlSignal::Mute)?;
//!
//! // From the audio callback, once per quantum
//! bridge.tick(&captured, &mut [&mut left[..], &mut right[..]]);
//!
//! delivery.stop().await;
//! ```
//!
//! ## Architecture
//!
//! The crate maintains a strict thread boundary:
//!
//! - **Render Thread**: Calls [`RenderHost::tick`]; never blocks, never awaits
//! - **Sample Buffer**: Fixed-capacity store absorbs irregular network arrival
//! - **Tokio Runtime**: Delivery shim and transport router run as async tasks
//!
//! Messages cross into the render thread only through processor mailboxes,
//! which the host drains between ticks.

#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod builder;
mod chunk;
mod config;
mod error;
mod event;
pub mod format;
mod host;
mod message;
pub mod pipeline;
mod processor;
mod stats;
mod transport;

pub use builder::{VoiceBridge, VoiceBridgeBuilder, INBOUND_PROCESSOR, OUTBOUND_PROCESSOR};
pub use chunk::AudioChunk;
pub use config::{
    DeliveryConfig, FallbackPolicy, InboundConfig, OutboundConfig, QualityProfile,
    UnderrunPolicy,
};
pub use error::{BridgeError, FrameError, TransportError};
pub use event::{event_callback, BridgeEvent, Direction, DropReason, EventCallback};
pub use host::{MessagePort, RenderHost, TickReport, DEFAULT_MAILBOX_CAPACITY};
pub use message::{ControlSignal, InboundFrame, InboundMessage, OutboundMessage, UplinkFrame};
pub use pipeline::{
    spawn_delivery, BufferingState, DeliveryHandle, InboundBridge, OutboundBridge, SampleBuffer,
};
pub use processor::{MessageSink, ProcessorId, RenderProcessor, TickOutcome};
pub use stats::{BridgeStats, StatsHandle};
pub use transport::{ChannelTransport, Transport, UplinkTransport};
