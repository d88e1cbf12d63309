#![cfg_attr(docsrs, feature(doc_auto_cfg))]
#![deny(missing_docs)]
#![deny(unused_must_use)]
#![deny(clippy::all)]

//! `at-engine` is a poll-driven engine for talking to serial devices that
//! speak the Hayes/3GPP AT command set: cellular modems, Wi-Fi and BLE
//! coprocessors, GNSS modules.
//!
//! Commands are submitted asynchronously and serialized per port. A single
//! [`engine::AtEngine::poll`] call reads whatever bytes the transport has,
//! matches device reply lines to the in-flight command or to registered URC
//! handlers, drives prompt- and length-based data phases, checks timeouts and
//! fires completion callbacks. Nothing blocks and nothing allocates once a
//! port is set up, so the engine is equally at home in a firmware main loop
//! and in a host-side tool.
//!
//! ## Usage
//!
//! ```
//! use at_engine::config::Config;
//! use at_engine::engine::AtEngine;
//! use at_engine::transport::Transport;
//!
//! // Any non-blocking byte pipe works; see `transport::serial` for a
//! // ready-made serialport-backed implementation.
//! struct Loopback;
//! impl Transport for Loopback {
//!     fn read(&mut self, _buf: &mut [u8]) -> usize { 0 }
//!     fn write(&mut self, data: &[u8]) -> usize { data.len() }
//!     fn now_ms(&mut self) -> u32 { 0 }
//! }
//!
//! # fn main() -> at_engine::error::Result<()> {
//! let mut engine = AtEngine::new(Config::default());
//! let port = engine.add_port(Loopback);
//!
//! engine.register_urc(port, "+CMTI", |line| {
//!     println!("unsolicited: {}", String::from_utf8_lossy(line));
//! })?;
//!
//! engine.submit_with_timeout(port, "AT+GMR", 500, |resp| {
//!     println!("ok={} body={}", resp.success, resp.text());
//! })?;
//!
//! engine.poll();
//! # Ok(())
//! # }
//! ```
//!
//! Transactional commands (prompt-driven payloads, raw binary capture) are
//! described by [`transaction::Transaction`] and submitted through
//! [`engine::AtEngine::submit_transaction`].

pub mod config;
pub mod engine;
pub mod error;

pub(crate) mod logging;

mod parser;
mod queue;
pub mod transaction;
pub mod transport;
mod urc;
