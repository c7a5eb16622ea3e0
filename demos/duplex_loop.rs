//! Duplex loop example.
//!
//! Simulates a voice session without audio hardware: a fake network streams
//! a 24 kHz tone in 20 ms packets, a tokio interval stands in for the 48 kHz
//! render clock, and the uplink frames produced from a synthetic microphone
//! are counted on the other side. Halfway through, the network signals
//! speech start (mute) and then speech end (unmute).
//!
//! Run with: cargo run --example duplex_loop
//! More detail: RUST_LOG=voice_bridge=debug cargo run --example duplex_loop

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;
use voice_bridge::{
    spawn_delivery, ControlSignal, InboundConfig, OutboundConfig, QualityProfile, UplinkFrame,
    UplinkTransport, VoiceBridge,
};

const NETWORK_RATE: u32 = 24_000;
const RENDER_RATE: u32 = 48_000;
const QUANTUM: usize = 128;
const PACKET_MS: u64 = 20;

fn tone_packet(start: usize, len: usize) -> Bytes {
    let mut bytes = Vec::with_capacity(len * 2);
    for i in start..start + len {
        let t = i as f32 / NETWORK_RATE as f32;
        let sample = ((t * 440.0 * std::f32::consts::TAU).sin() * 6000.0) as i16;
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    Bytes::from(bytes)
}

fn control_packet(signal: ControlSignal) -> Bytes {
    Bytes::copy_from_slice(&signal.code().to_le_bytes())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("voice_bridge=info")),
        )
        .init();

    let (uplink_tx, mut uplink_rx) = mpsc::channel::<Bytes>(64);

    let mut bridge = VoiceBridge::builder()
        .inbound(InboundConfig {
            source_rate: NETWORK_RATE,
            render_rate: RENDER_RATE,
            quantum: QUANTUM,
            quality: QualityProfile::SincMedium,
            ..Default::default()
        })
        .outbound(OutboundConfig {
            capture_rate: RENDER_RATE,
            target_rate: NETWORK_RATE,
            quantum: QUANTUM,
            ..Default::default()
        })
        .add_transport(UplinkTransport::new(uplink_tx))
        .on_event(|e| tracing::debug!(?e, "bridge event"))
        .build()?;

    let delivery = bridge.start_delivery().await?;

    // Uplink side: count what would go out over the socket
    let uplink = tokio::spawn(async move {
        let mut frames = 0u64;
        let mut bytes = 0usize;
        while let Some(frame) = uplink_rx.recv().await {
            if let Ok(UplinkFrame::Audio(payload)) = UplinkFrame::decode(&frame) {
                frames += 1;
                bytes += payload.len();
            }
        }
        (frames, bytes)
    });

    // Network side: 20 ms packets, with a barge-in in the middle
    let (payload_tx, payload_rx) = mpsc::channel::<Bytes>(32);
    let shim = spawn_delivery(payload_rx, bridge.port(), None);
    let network = tokio::spawn(async move {
        let packet_len = (NETWORK_RATE as u64 * PACKET_MS / 1000) as usize;
        let mut interval = tokio::time::interval(Duration::from_millis(PACKET_MS));
        for n in 0..100 {
            interval.tick().await;
            let result = match n {
                50 => payload_tx.send(control_packet(ControlSignal::Mute)).await,
                60 => payload_tx.send(control_packet(ControlSignal::Unmute)).await,
                _ => payload_tx.send(tone_packet(n * packet_len, packet_len)).await,
            };
            if result.is_err() {
                break;
            }
        }
    });

    // Render clock: one quantum every 128 / 48000 s
    let period = Duration::from_secs_f64(QUANTUM as f64 / f64::from(RENDER_RATE));
    let mut clock = tokio::time::interval(period);
    clock.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Burst);

    let mic: Vec<f32> = (0..QUANTUM).map(|i| (i as f32 / 16.0).sin() * 0.1).collect();
    let mut left = vec![0.0f32; QUANTUM];
    let mut right = vec![0.0f32; QUANTUM];
    let mut peak = 0.0f32;

    let ticks = (2.5 * f64::from(RENDER_RATE) / QUANTUM as f64) as usize;
    for i in 0..ticks {
        clock.tick().await;
        bridge.tick(&mic, &mut [&mut left[..], &mut right[..]]);
        peak = left.iter().fold(peak, |p, s| p.max(s.abs()));

        if i % 75 == 0 {
            let stats = bridge.inbound_stats().stats();
            println!(
                "tick {i:4}: emitted={} underruns={} not_ready={} rejected={} peak={peak:.3}",
                stats.frames_emitted, stats.underruns, stats.not_ready_ticks, stats.rejected_samples
            );
            peak = 0.0;
        }
    }

    network.await?;
    shim.await?;
    delivery.stop().await;

    let outbound = bridge.outbound_stats().stats();
    drop(bridge);

    let (frames, bytes) = uplink.await?;
    println!(
        "\nUplink: {frames} audio frames, {bytes} bytes ({} frames converted, {} messages dropped)",
        outbound.frames_emitted, outbound.dropped_messages
    );

    Ok(())
}
