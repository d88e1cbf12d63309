//! Engine sizing and timing knobs
//!
//! Every buffer the engine touches on the hot path is dimensioned here, once,
//! when a port is added. `poll()` never grows any of them.

/// Capacities and the default command timeout.
///
/// Start from [`Config::default`] and override individual fields:
///
/// ```
/// use at_engine::config::Config;
///
/// let config = Config {
///     default_timeout_ms: 1_000,
///     ..Config::default()
/// };
/// assert_eq!(config.max_queue, 8);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Per-port command FIFO depth, in-flight command included.
    pub max_queue: usize,
    /// Upper bound on a single command's text (CR/LF excluded). Longer
    /// commands are truncated at submission.
    pub max_cmd_len: usize,
    /// Upper bound on the accumulated response of one command: all
    /// intermediate lines plus the final error token, or the binary capture.
    pub max_resp_len: usize,
    /// Line parser accumulator size. Longer device lines are delivered
    /// truncated.
    pub max_line_len: usize,
    /// Per-port URC handler table capacity.
    pub max_urc_handlers: usize,
    /// Timeout applied when a submission passes `0`.
    pub default_timeout_ms: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_queue: 8,
            max_cmd_len: 128,
            max_resp_len: 512,
            max_line_len: 256,
            max_urc_handlers: 10,
            default_timeout_ms: 100,
        }
    }
}
