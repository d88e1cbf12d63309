//! Transactional command descriptors
//!
//! A plain AT command is one line out, some lines back. Transactional
//! commands add a data phase: sending a payload after a prompt (`AT+CMGS`),
//! sending it immediately (length-announcing commands like `AT#BIN=<n>`), or
//! receiving lines or raw binary after a prompt (`AT+DOWNLOAD`, PPP dial-up).

/// Prompt assumed when [`Transaction::prompt_send`] is not given one.
pub const DEFAULT_PROMPT: &[u8] = b"> ";

/// Describes the data phase of a transactional command.
///
/// Built via the constructors; payloads, prompts and terminators are owned by
/// the descriptor and live until the command's callback has fired.
///
/// ```
/// use at_engine::transaction::Transaction;
///
/// // Classic SMS submit: wait for "> ", send the text, close with Ctrl-Z.
/// let txn = Transaction::prompt_send("HELLO").with_terminator([0x1A]);
/// assert!(txn.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Transaction {
    /// Wait for a prompt (default `"> "`), then stream the payload and the
    /// optional terminator, then wait for a terminal line.
    PromptSend {
        /// Bytes streamed once the prompt has been seen.
        payload: Vec<u8>,
        /// Bytes sent verbatim right after the payload; empty for none.
        terminator: Vec<u8>,
        /// Raw byte pattern announcing the device is ready for the payload.
        prompt: Vec<u8>,
    },
    /// Stream the payload (and optional terminator) immediately after the
    /// command line, then wait for a terminal line.
    LengthSend {
        /// Bytes streamed directly after the command's CRLF.
        payload: Vec<u8>,
        /// Bytes sent verbatim right after the payload; empty for none.
        terminator: Vec<u8>,
    },
    /// Wait for a prompt, then capture every following line into the response
    /// until a terminal line arrives.
    PromptLineRx {
        /// Raw byte pattern that opens the capture window.
        prompt: Vec<u8>,
    },
    /// Wait for a prompt, then capture raw bytes (a fixed count, or until a
    /// terminator pattern) and finish without a terminal line.
    PromptBinaryRx {
        /// Raw byte pattern that opens the binary phase.
        prompt: Vec<u8>,
        /// Expected byte count; `0` means "until `rx_terminator`".
        rx_len: usize,
        /// Pattern closing the capture when `rx_len == 0`; never delivered.
        rx_terminator: Vec<u8>,
    },
}

impl Transaction {
    /// Prompt-driven send with the default `"> "` prompt and no terminator.
    pub fn prompt_send(payload: impl Into<Vec<u8>>) -> Self {
        Self::PromptSend {
            payload: payload.into(),
            terminator: Vec::new(),
            prompt: DEFAULT_PROMPT.to_vec(),
        }
    }

    /// Immediate (length-announced) send with no terminator.
    pub fn length_send(payload: impl Into<Vec<u8>>) -> Self {
        Self::LengthSend {
            payload: payload.into(),
            terminator: Vec::new(),
        }
    }

    /// Line capture opened by `prompt`.
    pub fn prompt_line_rx(prompt: impl Into<Vec<u8>>) -> Self {
        Self::PromptLineRx {
            prompt: prompt.into(),
        }
    }

    /// Binary capture of exactly `rx_len` bytes, opened by `prompt`.
    pub fn binary_rx_len(prompt: impl Into<Vec<u8>>, rx_len: usize) -> Self {
        Self::PromptBinaryRx {
            prompt: prompt.into(),
            rx_len,
            rx_terminator: Vec::new(),
        }
    }

    /// Binary capture running until `rx_terminator`, opened by `prompt`.
    pub fn binary_rx_until(
        prompt: impl Into<Vec<u8>>,
        rx_terminator: impl Into<Vec<u8>>,
    ) -> Self {
        Self::PromptBinaryRx {
            prompt: prompt.into(),
            rx_len: 0,
            rx_terminator: rx_terminator.into(),
        }
    }

    /// Replaces the terminator on the send variants; no effect on receive
    /// variants.
    #[must_use]
    pub fn with_terminator(mut self, terminator: impl Into<Vec<u8>>) -> Self {
        match &mut self {
            Self::PromptSend { terminator: t, .. } | Self::LengthSend { terminator: t, .. } => {
                *t = terminator.into();
            }
            _ => {}
        }
        self
    }

    /// Replaces the prompt on the prompt-driven variants; no effect on
    /// [`Transaction::LengthSend`].
    #[must_use]
    pub fn with_prompt(mut self, prompt: impl Into<Vec<u8>>) -> Self {
        match &mut self {
            Self::PromptSend { prompt: p, .. }
            | Self::PromptLineRx { prompt: p }
            | Self::PromptBinaryRx { prompt: p, .. } => {
                *p = prompt.into();
            }
            Self::LengthSend { .. } => {}
        }
        self
    }

    /// Checks the descriptor for contradictions a submission must reject:
    /// an empty prompt on a prompt-driven variant, or a binary capture that
    /// does not pick exactly one of length and terminator.
    pub fn validate(&self) -> Result<(), &'static str> {
        match self {
            Self::PromptSend { prompt, .. } | Self::PromptLineRx { prompt } => {
                if prompt.is_empty() {
                    return Err("prompt must not be empty");
                }
            }
            Self::LengthSend { .. } => {}
            Self::PromptBinaryRx {
                prompt,
                rx_len,
                rx_terminator,
            } => {
                if prompt.is_empty() {
                    return Err("prompt must not be empty");
                }
                if (*rx_len > 0) == !rx_terminator.is_empty() {
                    return Err("binary rx needs a length or a terminator, not both");
                }
            }
        }
        Ok(())
    }

    /// The prompt pattern this transaction waits for; empty when it starts
    /// its data phase unconditionally.
    pub(crate) fn prompt(&self) -> &[u8] {
        match self {
            Self::PromptSend { prompt, .. }
            | Self::PromptLineRx { prompt }
            | Self::PromptBinaryRx { prompt, .. } => prompt,
            Self::LengthSend { .. } => &[],
        }
    }

    /// Outbound payload for the send variants.
    pub(crate) fn payload(&self) -> &[u8] {
        match self {
            Self::PromptSend { payload, .. } | Self::LengthSend { payload, .. } => payload,
            _ => &[],
        }
    }

    /// Outbound terminator for the send variants.
    pub(crate) fn terminator(&self) -> &[u8] {
        match self {
            Self::PromptSend { terminator, .. } | Self::LengthSend { terminator, .. } => terminator,
            _ => &[],
        }
    }

    pub(crate) fn is_send(&self) -> bool {
        matches!(self, Self::PromptSend { .. } | Self::LengthSend { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_send_defaults() {
        let txn = Transaction::prompt_send("HELLO").with_terminator([0x1A]);
        assert_eq!(txn.prompt(), b"> ");
        assert_eq!(txn.payload(), b"HELLO");
        assert_eq!(txn.terminator(), &[0x1A]);
        assert!(txn.validate().is_ok());
    }

    #[test]
    fn binary_rx_requires_length_xor_terminator() {
        assert!(Transaction::binary_rx_len("CONNECT", 8).validate().is_ok());
        assert!(
            Transaction::binary_rx_until("DOWNLOAD", "END_DATA")
                .validate()
                .is_ok()
        );

        // Neither…
        assert!(Transaction::binary_rx_len("CONNECT", 0).validate().is_err());
        // …and both.
        let both = Transaction::PromptBinaryRx {
            prompt: b"CONNECT".to_vec(),
            rx_len: 8,
            rx_terminator: b"END".to_vec(),
        };
        assert!(both.validate().is_err());
    }

    #[test]
    fn empty_prompt_is_rejected() {
        assert!(
            Transaction::prompt_line_rx("")
                .validate()
                .is_err()
        );
        assert!(
            Transaction::prompt_send("X")
                .with_prompt("")
                .validate()
                .is_err()
        );
    }
}
