//! Transfer configuration shared between sender and receiver.
//!
//! Every knob the core recognizes lives here; loading these values from a
//! config file or CLI is the caller's concern.

use std::time::Duration;

use crate::buffer::AdaptationStrategy;
use crate::constants::{
    CONNECT_RETRIES, CONNECT_TIMEOUT, CONTROL_FRAME_DEADLINE, DEFAULT_ADJUST_COOLDOWN,
    DEFAULT_HISTORY_SIZE, MAX_BUFFER_SIZE, MIN_BUFFER_SIZE, STALL_DEADLINE,
};
use crate::error::{Error, Result};

/// Configuration recognized by the transfer core.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Overrides the RTT-derived buffer seed when set.
    pub initial_buffer_size: Option<usize>,
    /// Lower clamp for the adaptive chunk size.
    pub min_buffer_size: usize,
    /// Upper clamp for the adaptive chunk size.
    pub max_buffer_size: usize,
    /// Throughput samples retained for trend analysis.
    pub history_size: usize,
    /// Minimum interval between buffer adjustments.
    pub adjust_cooldown: Duration,
    /// How eagerly the initial buffer is sized from measured RTT.
    pub strategy: AdaptationStrategy,
    /// Select the live progress renderer over the line printer.
    pub use_rich_progress: bool,
    /// Whole-frame deadline for control frames.
    pub control_frame_deadline: Duration,
    /// Maximum time without byte progress during bulk transfer.
    pub stall_deadline: Duration,
    /// Client dial timeout per attempt.
    pub connect_timeout: Duration,
    /// Client dial attempts.
    pub connect_retries: u32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            initial_buffer_size: None,
            min_buffer_size: MIN_BUFFER_SIZE,
            max_buffer_size: MAX_BUFFER_SIZE,
            history_size: DEFAULT_HISTORY_SIZE,
            adjust_cooldown: DEFAULT_ADJUST_COOLDOWN,
            strategy: AdaptationStrategy::default(),
            use_rich_progress: true,
            control_frame_deadline: CONTROL_FRAME_DEADLINE,
            stall_deadline: STALL_DEADLINE,
            connect_timeout: CONNECT_TIMEOUT,
            connect_retries: CONNECT_RETRIES,
        }
    }
}

impl TransferConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the initial buffer size instead of seeding from RTT.
    pub fn with_initial_buffer_size(mut self, size: usize) -> Self {
        self.initial_buffer_size = Some(size);
        self
    }

    /// Set the buffer size clamps.
    pub fn with_buffer_bounds(mut self, min: usize, max: usize) -> Self {
        self.min_buffer_size = min;
        self.max_buffer_size = max;
        self
    }

    /// Set the number of retained throughput samples.
    pub fn with_history_size(mut self, size: usize) -> Self {
        self.history_size = size;
        self
    }

    /// Set the minimum interval between buffer adjustments.
    pub fn with_adjust_cooldown(mut self, cooldown: Duration) -> Self {
        self.adjust_cooldown = cooldown;
        self
    }

    /// Set the adaptation strategy.
    pub fn with_strategy(mut self, strategy: AdaptationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Select rich or plain progress rendering.
    pub fn with_rich_progress(mut self, enabled: bool) -> Self {
        self.use_rich_progress = enabled;
        self
    }

    /// Set the control-frame and stall deadlines.
    pub fn with_deadlines(mut self, control: Duration, stall: Duration) -> Self {
        self.control_frame_deadline = control;
        self.stall_deadline = stall;
        self
    }

    /// Set dial attempts.
    pub fn with_connect_retries(mut self, retries: u32) -> Self {
        self.connect_retries = retries;
        self
    }

    /// Validate the configuration.
    ///
    /// This is the only place `Config` errors originate besides buffer
    /// manager construction.
    pub fn validate(&self) -> Result<()> {
        if self.min_buffer_size == 0 {
            return Err(Error::config("min_buffer_size must be non-zero"));
        }
        if self.min_buffer_size > self.max_buffer_size {
            return Err(Error::config(format!(
                "min_buffer_size ({}) exceeds max_buffer_size ({})",
                self.min_buffer_size, self.max_buffer_size
            )));
        }
        if let Some(initial) = self.initial_buffer_size
            && initial == 0
        {
            return Err(Error::config("initial_buffer_size must be non-zero"));
        }
        if self.history_size < 3 {
            return Err(Error::config("history_size must be at least 3"));
        }
        if self.connect_retries == 0 {
            return Err(Error::config("connect_retries must be at least 1"));
        }
        Ok(())
    }
}
