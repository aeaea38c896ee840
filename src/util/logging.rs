//! # Logging Utilities
//!
//! Rate limiting for warnings raised from the byte-delivery context, plus hex dumps of
//! raw line bytes for diagnosing rejected packets.
//!
//! ## Usage
//!
//! ```rust
//! use e5_gateway::util::logging::LogThrottle;
//!
//! let mut throttle = LogThrottle::new(1000, 5); // 5 messages per second
//! if throttle.allow() {
//!     log::warn!("line queue full");
//! }
//! ```

use std::time::Instant;

/// Throttling structure for rate-limiting log messages
///
/// A radio module stuck emitting garbage can produce a malformed frame every few
/// milliseconds; the throttle keeps such bursts from flooding the log.
#[derive(Debug)]
pub struct LogThrottle {
    /// Time window for throttling (in milliseconds)
    window_ms: u64,
    /// Maximum messages allowed per window
    cap: u32,
    /// Current message count in window
    count: u32,
    /// Start time of current window
    t0: Instant,
    /// Messages suppressed since the last allowed one
    suppressed: u64,
}

impl LogThrottle {
    /// Create new throttle with time window and message cap
    pub fn new(window_ms: u64, cap: u32) -> Self {
        Self {
            window_ms,
            cap,
            count: 0,
            t0: Instant::now(),
            suppressed: 0,
        }
    }

    /// Check if logging is allowed (resets counter after window expires)
    pub fn allow(&mut self) -> bool {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(self.t0).as_millis() as u64;

        if elapsed_ms > self.window_ms {
            self.t0 = now;
            self.count = 0;
        }

        if self.count < self.cap {
            self.count += 1;
            if self.suppressed > 0 {
                log::debug!("{} log messages suppressed by throttle", self.suppressed);
                self.suppressed = 0;
            }
            true
        } else {
            self.suppressed += 1;
            false
        }
    }

    /// Get current throttle statistics
    pub fn stats(&self) -> ThrottleStats {
        ThrottleStats {
            window_ms: self.window_ms,
            cap: self.cap,
            count: self.count,
            suppressed: self.suppressed,
        }
    }

    /// Reset the throttle (start new window immediately)
    pub fn reset(&mut self) {
        self.t0 = Instant::now();
        self.count = 0;
    }
}

/// Statistics about a log throttle instance
#[derive(Debug, Clone, Copy)]
pub struct ThrottleStats {
    pub window_ms: u64,
    pub cap: u32,
    pub count: u32,
    pub suppressed: u64,
}

/// Log raw line bytes in hex at debug level
pub fn log_line_bytes(prefix: &str, data: &[u8]) {
    const MAX_LOG_BYTES: usize = 64;

    let shown = &data[..data.len().min(MAX_LOG_BYTES)];
    let suffix = if data.len() > MAX_LOG_BYTES {
        format!(" ... ({} bytes total)", data.len())
    } else {
        String::new()
    };

    log::debug!(
        target: "e5_gateway::line",
        "{prefix}: {}{suffix}",
        crate::util::hex::format_hex_compact(shown)
    );
}

/// Log a warning with throttling
#[macro_export]
macro_rules! log_warn_throttled {
    ($throttle:expr, $($arg:tt)*) => {
        if $throttle.allow() {
            log::warn!($($arg)*);
        }
    };
}
