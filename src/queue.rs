//! Command records and the per-port FIFO
//!
//! One record per submitted command: the command text, the accumulating
//! response (doubling as the binary capture buffer), deadline bookkeeping,
//! the completion callback and, for transactional commands, the descriptor
//! plus all data-phase progress counters.

use std::collections::VecDeque;

use crate::engine::ResponseCallback;
use crate::transaction::Transaction;

/// Skip state for the single line ending a device may emit right after a
/// binary-receive prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RxSkip {
    /// Freshly armed; the next byte may be CR or LF.
    Armed,
    /// Swallowed a CR; an LF completes the skip, anything else means the CR
    /// was payload.
    HeldCr,
    /// Skip window closed; everything is payload.
    Done,
}

/// Data-phase progress for a transactional command.
pub(crate) struct TxnState {
    pub desc: Transaction,
    /// Payload bytes already accepted by the transport.
    pub payload_sent: usize,
    /// Terminator bytes already accepted by the transport.
    pub term_sent: usize,
    /// Prompt bytes matched so far (consecutively).
    pub prompt_matched: usize,
    /// Latches true on the full prompt match; never reverts for this record.
    pub prompt_received: bool,
    /// The payload phase has opened (line suppression active).
    pub payload_started: bool,
    /// Prompt seen, every further line is captured into the response.
    pub line_rx_mode: bool,
    /// Prompt seen, raw bytes bypass the line parser entirely.
    pub binary_rx_mode: bool,
    /// Binary bytes captured so far (fixed-length reception).
    pub rx_received: usize,
    /// Inbound terminator bytes matched so far.
    pub rx_term_matched: usize,
    pub rx_skip: RxSkip,
}

impl TxnState {
    fn new(desc: Transaction) -> Self {
        // Length mode has no prompt to wait for; the data phase is open the
        // moment the command line goes out.
        let immediate = matches!(desc, Transaction::LengthSend { .. });
        Self {
            desc,
            payload_sent: 0,
            term_sent: 0,
            prompt_matched: 0,
            prompt_received: immediate,
            payload_started: false,
            line_rx_mode: false,
            binary_rx_mode: false,
            rx_received: 0,
            rx_term_matched: 0,
            rx_skip: RxSkip::Done,
        }
    }
}

/// One queued command, alive from submission until its callback fires.
pub(crate) struct Command {
    /// Command text, CR/LF excluded, truncated to `max_cmd_len`.
    pub cmd: Vec<u8>,
    /// Accumulated response lines or binary capture, capped at
    /// `max_resp_len`.
    pub resp: Vec<u8>,
    /// Set only when a successful terminal line was observed.
    pub success: bool,
    pub timeout_ms: u32,
    /// Monotonic timestamp captured when the record goes in-flight.
    pub start_ms: u32,
    /// Fired exactly once; `None` after that.
    pub cb: Option<ResponseCallback>,
    pub txn: Option<TxnState>,
    /// Latched on the first response truncation so it is logged once.
    pub resp_truncated: bool,
}

impl Command {
    pub(crate) fn new(
        cmd: &str,
        timeout_ms: u32,
        default_timeout_ms: u32,
        max_cmd_len: usize,
        max_resp_len: usize,
        cb: ResponseCallback,
        txn: Option<Transaction>,
    ) -> Self {
        let text = cmd.as_bytes();
        let n = text.len().min(max_cmd_len);
        Self {
            cmd: text[..n].to_vec(),
            resp: Vec::with_capacity(max_resp_len),
            success: false,
            timeout_ms: if timeout_ms == 0 {
                default_timeout_ms
            } else {
                timeout_ms
            },
            start_ms: 0,
            cb: Some(cb),
            txn: txn.map(TxnState::new),
            resp_truncated: false,
        }
    }
}

/// Bounded FIFO of command records. Capacity is fixed at port setup; a full
/// queue rejects further pushes, so the backing storage never reallocates.
pub(crate) struct CommandQueue {
    items: VecDeque<Command>,
    max_queue: usize,
}

impl CommandQueue {
    pub(crate) fn new(max_queue: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(max_queue),
            max_queue,
        }
    }

    pub(crate) fn is_full(&self) -> bool {
        self.items.len() >= self.max_queue
    }

    /// Caller must check [`CommandQueue::is_full`] first.
    pub(crate) fn push(&mut self, cmd: Command) {
        debug_assert!(!self.is_full());
        self.items.push_back(cmd);
    }

    pub(crate) fn front_mut(&mut self) -> Option<&mut Command> {
        self.items.front_mut()
    }

    pub(crate) fn pop(&mut self) -> Option<Command> {
        self.items.pop_front()
    }

    /// Puts a record lifted out by `pop` back at the head.
    pub(crate) fn restore_front(&mut self, cmd: Command) {
        self.items.push_front(cmd);
    }
}
