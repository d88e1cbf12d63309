//! The per-port command engine
//!
//! One [`AtEngine`] owns any number of ports, each with its own transport,
//! command FIFO, line parser and URC table. Everything happens inside
//! [`AtEngine::poll`]: reading, prompt scanning, line dispatch, data-phase
//! streaming, timeout checks and callback delivery. `poll()` never blocks and
//! never allocates; call it from your main loop as often as you like.
//!
//! Three byte streams interleave on a port and the engine keeps them apart:
//! the echoed command line, the device's reply lines, and raw binary payload
//! during transactional data phases. Suppression windows make sure payload
//! bytes are never mistaken for reply lines and vice versa.

use std::borrow::Cow;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::logging::{debug, trace, warn};
use crate::parser::LineParser;
use crate::queue::{Command, CommandQueue, RxSkip};
use crate::transaction::Transaction;
use crate::transport::Transport;
use crate::urc::UrcTable;

/// Bytes pulled from a transport per read inside `poll()`.
const READ_CHUNK: usize = 64;

/// Payload handed to the callback of a command that timed out.
pub const TIMEOUT_RESPONSE: &[u8] = b"TIMEOUT";

/// Outcome of one submitted command, borrowed for the duration of the
/// callback.
#[derive(Debug)]
pub struct Response<'a> {
    /// Whether a successful terminal line (`OK` / `SEND OK`) was seen, or the
    /// binary capture completed.
    pub success: bool,
    /// Intermediate lines joined by LF plus the final error token on failure,
    /// the literal [`TIMEOUT_RESPONSE`] on timeout, or the raw binary capture
    /// (opaque bytes) for a binary-receive transaction.
    pub data: &'a [u8],
}

impl<'a> Response<'a> {
    /// Lossy string view of [`Response::data`]. Do not use on binary
    /// captures.
    pub fn text(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.data)
    }

    /// Whether this command ended by deadline instead of a device reply.
    pub fn is_timeout(&self) -> bool {
        !self.success && self.data == TIMEOUT_RESPONSE
    }
}

/// Completion callback, fired exactly once per accepted submission,
/// synchronously from inside [`AtEngine::poll`].
pub type ResponseCallback = Box<dyn for<'a> FnOnce(Response<'a>)>;

/// Everything per-port except the transport, the parser and the scratch
/// buffer, which are kept as siblings so byte processing can borrow them
/// independently.
struct PortState {
    index: usize,
    queue: CommandQueue,
    urc: UrcTable,
    busy: bool,
    echo_ignore: bool,
    echo_pending: bool,
    suppress_lines: bool,
}

struct PortContext<T> {
    transport: T,
    parser: LineParser,
    /// Pre-prompt bytes reassembled by the prompt scanner before they go to
    /// the line parser.
    scratch: Vec<u8>,
    state: PortState,
}

/// Result of running the prompt matcher over one chunk.
struct PromptScan {
    /// Pattern bytes from a carried-over partial match that turned out not
    /// to be the prompt; they must be replayed to the line parser.
    replay: usize,
    /// Chunk bytes before the prompt (or before a trailing partial match)
    /// that belong to the line stream.
    forward_to: usize,
    /// Where the post-prompt remainder starts.
    rest_from: usize,
    matched: bool,
}

/// The engine: port contexts plus the sizing configuration.
///
/// ```
/// use at_engine::config::Config;
/// use at_engine::engine::AtEngine;
/// use at_engine::transport::Transport;
///
/// struct Loopback;
/// impl Transport for Loopback {
///     fn read(&mut self, _buf: &mut [u8]) -> usize { 0 }
///     fn write(&mut self, data: &[u8]) -> usize { data.len() }
///     fn now_ms(&mut self) -> u32 { 0 }
/// }
///
/// let mut engine = AtEngine::new(Config::default());
/// let port = engine.add_port(Loopback);
/// engine.submit(port, "AT", |resp| assert!(resp.success)).unwrap();
/// engine.poll();
/// ```
pub struct AtEngine<T: Transport> {
    config: Config,
    ports: Vec<PortContext<T>>,
}

impl<T: Transport> AtEngine<T> {
    /// Creates an engine with no ports; add them with [`AtEngine::add_port`].
    pub fn new(config: Config) -> Self {
        Self {
            config,
            ports: Vec::new(),
        }
    }

    /// Registers a transport as a new port and returns its index. All
    /// per-port buffers are allocated here, once.
    pub fn add_port(&mut self, mut transport: T) -> usize {
        transport.init();
        let index = self.ports.len();
        self.ports.push(PortContext {
            transport,
            parser: LineParser::new(self.config.max_line_len),
            scratch: Vec::with_capacity(READ_CHUNK + self.config.max_line_len),
            state: PortState {
                index,
                queue: CommandQueue::new(self.config.max_queue),
                urc: UrcTable::new(self.config.max_urc_handlers, self.config.max_cmd_len),
                busy: false,
                echo_ignore: false,
                echo_pending: false,
                suppress_lines: false,
            },
        });
        debug!("port {index} added");
        index
    }

    /// Number of ports added so far.
    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    /// When enabled, the first reply line that exactly equals the in-flight
    /// command text is discarded (device-side local echo).
    pub fn set_echo_ignore(&mut self, port: usize, ignore: bool) -> Result<()> {
        self.port_mut(port)?.state.echo_ignore = ignore;
        Ok(())
    }

    /// Registers a URC handler for lines starting with `prefix`. Handlers are
    /// tried in registration order; the first match wins.
    pub fn register_urc(
        &mut self,
        port: usize,
        prefix: &str,
        handler: impl FnMut(&[u8]) + 'static,
    ) -> Result<()> {
        if prefix.is_empty() {
            return Err(Error::EmptyPrefix);
        }
        let state = &mut self.port_mut(port)?.state;
        if state.urc.is_full() {
            return Err(Error::UrcTableFull(port));
        }
        state.urc.register(prefix.as_bytes(), Box::new(handler));
        debug!("urc handler registered (port {port}): {prefix}");
        Ok(())
    }

    /// Removes the handler registered for exactly `prefix`.
    pub fn unregister_urc(&mut self, port: usize, prefix: &str) -> Result<()> {
        if prefix.is_empty() {
            return Err(Error::EmptyPrefix);
        }
        let state = &mut self.port_mut(port)?.state;
        if state.urc.unregister(prefix.as_bytes()) {
            Ok(())
        } else {
            Err(Error::UrcNotFound)
        }
    }

    /// Queues a plain command with the default timeout.
    pub fn submit(
        &mut self,
        port: usize,
        cmd: &str,
        cb: impl for<'a> FnOnce(Response<'a>) + 'static,
    ) -> Result<()> {
        self.submit_inner(port, cmd, 0, None, Box::new(cb))
    }

    /// Queues a plain command; `timeout_ms == 0` means the default.
    pub fn submit_with_timeout(
        &mut self,
        port: usize,
        cmd: &str,
        timeout_ms: u32,
        cb: impl for<'a> FnOnce(Response<'a>) + 'static,
    ) -> Result<()> {
        self.submit_inner(port, cmd, timeout_ms, None, Box::new(cb))
    }

    /// Queues a transactional command (see [`Transaction`]); `timeout_ms == 0`
    /// means the default.
    pub fn submit_transaction(
        &mut self,
        port: usize,
        cmd: &str,
        txn: Transaction,
        timeout_ms: u32,
        cb: impl for<'a> FnOnce(Response<'a>) + 'static,
    ) -> Result<()> {
        self.submit_inner(port, cmd, timeout_ms, Some(txn), Box::new(cb))
    }

    fn submit_inner(
        &mut self,
        port: usize,
        cmd: &str,
        timeout_ms: u32,
        txn: Option<Transaction>,
        cb: ResponseCallback,
    ) -> Result<()> {
        let config = &self.config;
        let ctx = self.ports.get_mut(port).ok_or(Error::InvalidPort(port))?;
        if let Some(txn) = txn.as_ref() {
            txn.validate().map_err(Error::InvalidTransaction)?;
        }
        if ctx.state.queue.is_full() {
            return Err(Error::QueueFull(port));
        }
        if cmd.len() > config.max_cmd_len {
            warn!(
                "command longer than {} bytes, truncating (port {port})",
                config.max_cmd_len
            );
        }
        ctx.state.queue.push(Command::new(
            cmd,
            timeout_ms,
            config.default_timeout_ms,
            config.max_cmd_len,
            config.max_resp_len,
            cb,
            txn,
        ));
        debug!("command queued (port {port}): {cmd}");
        Ok(())
    }

    /// Runs one engine cycle over all ports, in index order: drain the
    /// transport, check timeouts, start the next queued command on idle
    /// ports, advance transactional sends. Callbacks fire from in here.
    pub fn poll(&mut self) {
        // 1) input: prompt scanning, binary capture, line parsing
        for port in &mut self.ports {
            let mut buf = [0u8; READ_CHUNK];
            loop {
                let n = port.transport.read(&mut buf);
                if n == 0 {
                    break;
                }
                trace!("port {}: read {n} bytes", port.state.index);
                Self::consume_rx(
                    &self.config,
                    &mut port.parser,
                    &mut port.scratch,
                    &mut port.state,
                    &buf[..n],
                );
            }
        }

        // 2) timeouts
        for port in &mut self.ports {
            let state = &mut port.state;
            if !state.busy {
                continue;
            }
            let now = port.transport.now_ms();
            let expired = state
                .queue
                .front_mut()
                .is_some_and(|cmd| now.wrapping_sub(cmd.start_ms) >= cmd.timeout_ms);
            if expired {
                let mut cmd = state.queue.pop().expect("busy port has a head record");
                warn!(
                    "command timeout (port {}): {}",
                    state.index,
                    String::from_utf8_lossy(&cmd.cmd)
                );
                cmd.success = false;
                state.busy = false;
                state.echo_pending = false;
                state.suppress_lines = false;
                if let Some(cb) = cmd.cb.take() {
                    cb(Response {
                        success: false,
                        data: TIMEOUT_RESPONSE,
                    });
                }
            }
        }

        // 3) start the head command on idle ports
        for port in &mut self.ports {
            let state = &mut port.state;
            if state.busy {
                continue;
            }
            let Some(cmd) = state.queue.front_mut() else {
                continue;
            };
            if !cmd.cmd.is_empty() {
                debug!(
                    "sending command (port {}): {}",
                    state.index,
                    String::from_utf8_lossy(&cmd.cmd)
                );
                let sent = port.transport.write(&cmd.cmd);
                let crlf = port.transport.write(b"\r\n");
                if sent < cmd.cmd.len() || crlf < 2 {
                    warn!("short write on command line (port {})", state.index);
                }
            }
            if let Some(t) = cmd.txn.as_mut() {
                if matches!(t.desc, Transaction::LengthSend { .. }) {
                    // length mode goes straight into its data phase
                    t.prompt_received = true;
                    state.suppress_lines = true;
                } else {
                    t.prompt_matched = 0;
                }
            }
            cmd.start_ms = port.transport.now_ms();
            state.busy = true;
            state.echo_pending = state.echo_ignore;
        }

        // 4) advance transactional sends
        for port in &mut self.ports {
            let state = &mut port.state;
            if !state.busy {
                continue;
            }
            let Some(cmd) = state.queue.front_mut() else {
                continue;
            };
            let Some(t) = cmd.txn.as_mut() else {
                continue;
            };
            if !t.desc.is_send() || !t.prompt_received {
                continue;
            }
            if !t.payload_started {
                // suppress line handling so payload bytes with '\n' in them
                // are not taken for replies
                state.suppress_lines = true;
                t.payload_started = true;
            }
            let payload = t.desc.payload();
            if t.payload_sent < payload.len() {
                let n = port.transport.write(&payload[t.payload_sent..]);
                t.payload_sent += n;
                trace!(
                    "port {}: payload {}/{}",
                    state.index,
                    t.payload_sent,
                    payload.len()
                );
                continue; // terminator goes out on a later poll
            }
            let term = t.desc.terminator();
            if t.term_sent < term.len() {
                let n = port.transport.write(&term[t.term_sent..]);
                t.term_sent += n;
                if t.term_sent < term.len() {
                    continue;
                }
            }
            // data phase over, let the terminal line through
            state.suppress_lines = false;
        }
    }

    fn port_mut(&mut self, port: usize) -> Result<&mut PortContext<T>> {
        self.ports.get_mut(port).ok_or(Error::InvalidPort(port))
    }

    /// Routes one received chunk. The in-flight record is lifted out of the
    /// queue while bytes are processed so line handling can borrow the port
    /// state and the record independently; it is parked back unless the
    /// chunk finished it.
    fn consume_rx(
        cfg: &Config,
        parser: &mut LineParser,
        scratch: &mut Vec<u8>,
        state: &mut PortState,
        chunk: &[u8],
    ) {
        let mut inflight: Option<Command> = if state.busy { state.queue.pop() } else { None };
        let mut data = chunk;

        if Self::in_binary(&inflight) {
            Self::consume_binary(cfg, state, &mut inflight, data);
            Self::park(state, inflight);
            return;
        }

        let awaiting_prompt = inflight
            .as_ref()
            .and_then(|c| c.txn.as_ref())
            .is_some_and(|t| !t.prompt_received);

        let mut matched = false;
        if awaiting_prompt {
            scratch.clear();
            let cmd = inflight.as_mut().expect("awaiting prompt without record");
            let scan = Self::scan_prompt(cmd, data);
            let prompt = cmd.txn.as_ref().expect("prompt scan on plain command").desc.prompt();
            if scan.replay > 0 {
                scratch.extend_from_slice(&prompt[..scan.replay]);
            }
            scratch.extend_from_slice(&data[..scan.forward_to]);
            matched = scan.matched;
            data = &data[scan.rest_from..];

            // Pre-prompt bytes are handled first, against pre-prompt state:
            // echo, URCs and early terminal lines all still apply here.
            parser.feed(scratch.as_slice(), |line| {
                Self::handle_line(cfg, state, &mut inflight, line)
            });
        }

        if matched {
            if let Some(cmd) = inflight.as_mut() {
                let t = cmd.txn.as_mut().expect("prompt matched on plain command");
                t.prompt_received = true;
                match t.desc {
                    Transaction::PromptLineRx { .. } => t.line_rx_mode = true,
                    Transaction::PromptBinaryRx { .. } => {
                        t.binary_rx_mode = true;
                        t.rx_skip = RxSkip::Armed;
                        state.suppress_lines = true;
                        // a stray half-line must not bleed into the capture
                        parser.reset();
                    }
                    _ => {}
                }
                debug!("port {}: prompt matched", state.index);
            }
        }

        if Self::in_binary(&inflight) {
            Self::consume_binary(cfg, state, &mut inflight, data);
        } else {
            parser.feed(data, |line| {
                Self::handle_line(cfg, state, &mut inflight, line)
            });
        }

        Self::park(state, inflight);
    }

    fn in_binary(inflight: &Option<Command>) -> bool {
        inflight
            .as_ref()
            .and_then(|c| c.txn.as_ref())
            .is_some_and(|t| t.binary_rx_mode)
    }

    fn park(state: &mut PortState, inflight: Option<Command>) {
        if let Some(cmd) = inflight {
            state.queue.restore_front(cmd);
        }
    }

    /// Incremental prompt matcher. Matched prompt bytes are consumed from the
    /// stream; everything else belongs to the line parser, including a
    /// carried-over partial match that failed (replayed from the pattern,
    /// since those bytes arrived in an earlier chunk).
    fn scan_prompt(cmd: &mut Command, data: &[u8]) -> PromptScan {
        let t = cmd.txn.as_mut().expect("prompt scan on plain command");
        let prompt = t.desc.prompt();
        let mut m = t.prompt_matched;
        let mut in_chunk = 0usize;
        let mut replay = 0usize;

        for (i, &b) in data.iter().enumerate() {
            if b == prompt[m] {
                m += 1;
                in_chunk += 1;
                if m == prompt.len() {
                    t.prompt_matched = m;
                    return PromptScan {
                        replay,
                        forward_to: i + 1 - in_chunk,
                        rest_from: i + 1,
                        matched: true,
                    };
                }
            } else {
                if in_chunk < m {
                    // the partial carried in from earlier chunks was a false
                    // start; its bytes are line bytes after all
                    replay = m - in_chunk;
                }
                if b == prompt[0] {
                    m = 1;
                    in_chunk = 1;
                } else {
                    m = 0;
                    in_chunk = 0;
                }
            }
        }
        t.prompt_matched = m;
        PromptScan {
            replay,
            forward_to: data.len() - in_chunk,
            rest_from: data.len(),
            matched: false,
        }
    }

    /// Raw capture for `PromptBinaryRx`, fed with every chunk once the prompt
    /// has been seen. Finishes the command itself; bytes after completion are
    /// discarded.
    fn consume_binary(
        cfg: &Config,
        state: &mut PortState,
        inflight: &mut Option<Command>,
        mut data: &[u8],
    ) {
        let mut done = false;
        {
            let Some(cmd) = inflight.as_mut() else {
                return;
            };
            let Command {
                resp,
                resp_truncated,
                txn,
                ..
            } = cmd;
            let Some(t) = txn.as_mut() else {
                return;
            };

            // devices often follow the prompt with one line ending; swallow it
            while t.rx_skip != RxSkip::Done {
                let Some(&b) = data.first() else {
                    break;
                };
                match t.rx_skip {
                    RxSkip::Armed => match b {
                        b'\r' => {
                            t.rx_skip = RxSkip::HeldCr;
                            data = &data[1..];
                        }
                        b'\n' => {
                            t.rx_skip = RxSkip::Done;
                            data = &data[1..];
                        }
                        _ => t.rx_skip = RxSkip::Done,
                    },
                    RxSkip::HeldCr => {
                        if b == b'\n' {
                            data = &data[1..];
                        } else {
                            // the held CR was payload after all
                            push_capped(resp, resp_truncated, cfg.max_resp_len, b'\r', state.index);
                        }
                        t.rx_skip = RxSkip::Done;
                    }
                    RxSkip::Done => {}
                }
            }

            match &t.desc {
                Transaction::PromptBinaryRx { rx_len, .. } if *rx_len > 0 => {
                    let want = *rx_len - t.rx_received;
                    let room = cfg.max_resp_len.saturating_sub(resp.len());
                    let take = data.len().min(want);
                    let n = take.min(room);
                    resp.extend_from_slice(&data[..n]);
                    t.rx_received += n;
                    if n < take && !*resp_truncated {
                        warn!("binary capture full, dropping bytes (port {})", state.index);
                        *resp_truncated = true;
                    }
                    if t.rx_received == *rx_len {
                        done = true;
                    }
                }
                Transaction::PromptBinaryRx { rx_terminator, .. } => {
                    for &b in data {
                        if b == rx_terminator[t.rx_term_matched] {
                            t.rx_term_matched += 1;
                            if t.rx_term_matched == rx_terminator.len() {
                                done = true;
                                break;
                            }
                        } else {
                            // a failed partial match was data, not terminator
                            for &fb in &rx_terminator[..t.rx_term_matched] {
                                push_capped(resp, resp_truncated, cfg.max_resp_len, fb, state.index);
                            }
                            t.rx_term_matched = 0;
                            if b == rx_terminator[0] {
                                t.rx_term_matched = 1;
                            } else {
                                push_capped(resp, resp_truncated, cfg.max_resp_len, b, state.index);
                            }
                        }
                    }
                }
                _ => {}
            }
        }

        if done {
            let mut cmd = inflight.take().expect("finished record present");
            cmd.success = true;
            debug!(
                "binary capture complete (port {}): {} bytes",
                state.index,
                cmd.resp.len()
            );
            Self::complete(state, cmd);
        }
    }

    /// One parsed line, run through the dispatch chain. First match wins:
    /// suppression, the pre-prompt binary guard, empty lines, echo, line
    /// capture, URC handlers, the in-flight response, and finally the drop
    /// log.
    fn handle_line(
        cfg: &Config,
        state: &mut PortState,
        inflight: &mut Option<Command>,
        line: &[u8],
    ) {
        if state.suppress_lines || Self::in_binary(inflight) {
            return;
        }

        if let Some(t) = inflight.as_ref().and_then(|c| c.txn.as_ref()) {
            if matches!(t.desc, Transaction::PromptBinaryRx { .. }) && !t.prompt_received {
                // only the prompt scanner may consume bytes in this window
                trace!("port {}: dropping pre-prompt line", state.index);
                return;
            }
        }

        if line.is_empty() {
            return;
        }

        if state.echo_ignore && state.echo_pending {
            state.echo_pending = false;
            if let Some(cmd) = inflight.as_ref() {
                if line == cmd.cmd.as_slice() {
                    trace!("port {}: echo discarded", state.index);
                    return;
                }
            }
        }

        let line_rx = inflight
            .as_ref()
            .and_then(|c| c.txn.as_ref())
            .is_some_and(|t| t.line_rx_mode);
        if line_rx {
            match Self::terminal(line) {
                Some(ok) => Self::finish_with_terminal(cfg, state, inflight, ok, line),
                None => {
                    if let Some(cmd) = inflight.as_mut() {
                        Self::append_resp(cfg, state.index, cmd, line);
                    }
                }
            }
            return;
        }

        if state.urc.dispatch(line) {
            return;
        }

        if state.busy && inflight.is_some() {
            match Self::terminal(line) {
                Some(ok) => Self::finish_with_terminal(cfg, state, inflight, ok, line),
                None => {
                    if let Some(cmd) = inflight.as_mut() {
                        Self::append_resp(cfg, state.index, cmd, line);
                    }
                }
            }
            return;
        }

        debug!(
            "unhandled line (port {}): {}",
            state.index,
            String::from_utf8_lossy(line)
        );
    }

    /// `Some(success)` when `line` ends a command's response cycle.
    fn terminal(line: &[u8]) -> Option<bool> {
        if line == &b"OK"[..] || line == &b"SEND OK"[..] {
            return Some(true);
        }
        let failures: [&[u8]; 4] = [b"ERROR", b"+CME ERROR", b"+CMS ERROR", b"SEND FAIL"];
        if failures.iter().any(|p| line.starts_with(p)) {
            return Some(false);
        }
        None
    }

    /// Intermediate line: copy plus an LF separator, truncating at capacity.
    fn append_resp(cfg: &Config, port: usize, cmd: &mut Command, line: &[u8]) {
        let avail = cfg.max_resp_len - cmd.resp.len();
        if line.len() + 1 <= avail {
            cmd.resp.extend_from_slice(line);
            cmd.resp.push(b'\n');
        } else {
            cmd.resp.extend_from_slice(&line[..avail]);
            if !cmd.resp_truncated {
                warn!("response buffer full, truncating (port {port})");
                cmd.resp_truncated = true;
            }
        }
    }

    fn finish_with_terminal(
        cfg: &Config,
        state: &mut PortState,
        inflight: &mut Option<Command>,
        success: bool,
        line: &[u8],
    ) {
        let mut cmd = inflight.take().expect("terminal for a live record");
        cmd.success = success;
        if !success {
            // the error terminal itself belongs in the response
            let avail = cfg.max_resp_len - cmd.resp.len();
            let n = line.len().min(avail);
            cmd.resp.extend_from_slice(&line[..n]);
            if n < line.len() && !cmd.resp_truncated {
                warn!("response buffer full, truncating (port {})", state.index);
                cmd.resp_truncated = true;
            }
        }
        if cmd.resp.last() == Some(&b'\n') {
            cmd.resp.pop();
        }
        Self::complete(state, cmd);
    }

    /// Fires the callback and reopens the port. The record was already
    /// removed from the queue by the caller.
    fn complete(state: &mut PortState, mut cmd: Command) {
        state.busy = false;
        state.echo_pending = false;
        state.suppress_lines = false;
        debug!(
            "command finished (port {}), success={}",
            state.index, cmd.success
        );
        if let Some(cb) = cmd.cb.take() {
            cb(Response {
                success: cmd.success,
                data: &cmd.resp,
            });
        }
    }
}

/// Bounded byte append for the binary capture, logging the first overflow.
fn push_capped(resp: &mut Vec<u8>, truncated: &mut bool, cap: usize, b: u8, port: usize) {
    if resp.len() < cap {
        resp.push(b);
    } else if !*truncated {
        warn!("binary capture full, dropping bytes (port {port})");
        *truncated = true;
    }
}
