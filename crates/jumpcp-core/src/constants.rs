//! Protocol and configuration constants for jumpcp.

use std::time::Duration;

// =============================================================================
// Protocol Constants
// =============================================================================

/// Length of the frame header: 1-byte kind + 4-byte big-endian payload length.
pub const FRAME_HEADER_LEN: usize = 5;

/// Maximum frame payload size (16 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Control string opening the handshake (sender → receiver).
pub const MSG_HELLO: &str = "HELLO";

/// Control string accepting the handshake (receiver → sender).
pub const MSG_READY: &str = "READY";

/// Control string acknowledging a completed transfer (receiver → sender).
pub const MSG_ACK: &str = "ACK";

/// Suffix appended to the output file until the transfer completes.
pub const PART_SUFFIX: &str = "part";

// =============================================================================
// Buffer Sizing Constants
// =============================================================================

/// Lower clamp for the adaptive chunk size (4 KiB).
pub const MIN_BUFFER_SIZE: usize = 4 * 1024;

/// Upper clamp for the adaptive chunk size (16 MiB).
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Chunk size used before any measurement is available (64 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Throughput samples retained for trend analysis.
pub const DEFAULT_HISTORY_SIZE: usize = 32;

/// Minimum interval between two buffer adjustments.
pub const DEFAULT_ADJUST_COOLDOWN: Duration = Duration::from_secs(1);

/// RTT floor used in the bandwidth-delay product.
pub const BDP_RTT_FLOOR: Duration = Duration::from_millis(10);

// =============================================================================
// Latency Probing Constants
// =============================================================================

/// RTT assumed when probing fails or no samples exist.
pub const DEFAULT_RTT: Duration = Duration::from_millis(50);

/// PING/PONG samples taken during the handshake.
pub const DEFAULT_PROBE_SAMPLES: usize = 3;

// =============================================================================
// Timing Constants
// =============================================================================

/// Whole-frame deadline for control frames.
pub const CONTROL_FRAME_DEADLINE: Duration = Duration::from_secs(30);

/// Maximum time without byte progress during bulk transfer.
pub const STALL_DEADLINE: Duration = Duration::from_secs(60);

/// Deadline for the best-effort ERROR frame on teardown.
pub const ERROR_FLUSH_DEADLINE: Duration = Duration::from_secs(5);

/// Client dial timeout per attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client dial attempts.
pub const CONNECT_RETRIES: u32 = 3;

/// Backoff between dial attempts.
pub const CONNECT_BACKOFF: Duration = Duration::from_secs(1);

// =============================================================================
// Progress Constants
// =============================================================================

/// Minimum interval between progress lines per task in the simple observer.
pub const SIMPLE_PRINT_INTERVAL: Duration = Duration::from_millis(200);
