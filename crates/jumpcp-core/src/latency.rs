//! Round-trip latency probing over the framed stream.
//!
//! The sender measures RTT directly with PING/PONG exchanges. The receiver
//! only echoes, but consecutive PINGs reach it one round-trip apart (the
//! sender blocks on each PONG), so it can estimate RTT from inter-PING gaps.

use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::constants::DEFAULT_RTT;
use crate::protocol::frame::{Frame, FrameKind};
use crate::transport::FrameStream;

/// Measure RTT with `samples` PING/PONG exchanges.
///
/// The worst sample is discarded and the rest averaged. Probe failures are
/// non-fatal: any error falls back to [`DEFAULT_RTT`].
pub async fn measure_rtt<S>(stream: &mut FrameStream<S>, samples: usize) -> Duration
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let samples = samples.max(1);
    let mut rtts = Vec::with_capacity(samples);

    for _ in 0..samples {
        let started = Instant::now();
        if let Err(e) = stream.write_frame(&Frame::ping()).await {
            debug!(error = %e, "latency probe send failed, using default RTT");
            return DEFAULT_RTT;
        }
        match stream.read_frame().await {
            Ok(frame) if frame.kind == FrameKind::Pong => rtts.push(started.elapsed()),
            Ok(frame) => {
                debug!(kind = ?frame.kind, "unexpected probe reply, using default RTT");
                return DEFAULT_RTT;
            }
            Err(e) => {
                debug!(error = %e, "latency probe failed, using default RTT");
                return DEFAULT_RTT;
            }
        }
    }

    filter_samples(rtts)
}

/// Discard the worst sample, then average.
fn filter_samples(mut rtts: Vec<Duration>) -> Duration {
    if rtts.is_empty() {
        return DEFAULT_RTT;
    }
    if rtts.len() > 1 {
        let max_idx = rtts
            .iter()
            .enumerate()
            .max_by_key(|(_, d)| **d)
            .map(|(i, _)| i)
            .unwrap_or(0);
        rtts.swap_remove(max_idx);
    }
    let total: Duration = rtts.iter().sum();
    total / rtts.len() as u32
}

/// RTT estimate built on the echoing side from PING arrival times.
#[derive(Debug, Default)]
pub struct InterPingEstimator {
    last_ping: Option<Instant>,
    gaps: Vec<Duration>,
}

impl InterPingEstimator {
    /// Record the arrival of a PING frame.
    pub fn observe_ping(&mut self) {
        let now = Instant::now();
        if let Some(prev) = self.last_ping {
            self.gaps.push(now.duration_since(prev));
        }
        self.last_ping = Some(now);
    }

    /// Number of recorded inter-PING gaps.
    pub fn samples(&self) -> usize {
        self.gaps.len()
    }

    /// Mean inter-PING gap, or [`DEFAULT_RTT`] with fewer than two pings.
    pub fn estimate(&self) -> Duration {
        if self.gaps.is_empty() {
            return DEFAULT_RTT;
        }
        let total: Duration = self.gaps.iter().sum();
        total / self.gaps.len() as u32
    }
}
