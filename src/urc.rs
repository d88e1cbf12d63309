//! Unsolicited result code (URC) dispatch
//!
//! Devices emit lines nobody asked for: `+CMTI: ...`, `RING`, `+CREG: ...`.
//! Each port keeps an ordered table of prefix handlers; the first registered
//! prefix that matches wins, so callers control aliasing (`+C` vs `+CMTI`) by
//! registration order.

use crate::logging::debug;

/// Handler invoked with the full URC line, terminator excluded.
pub(crate) type UrcHandler = Box<dyn FnMut(&[u8])>;

struct UrcEntry {
    prefix: Vec<u8>,
    handler: UrcHandler,
}

/// Ordered, fixed-capacity prefix → handler table.
pub(crate) struct UrcTable {
    entries: Vec<UrcEntry>,
    max_handlers: usize,
    max_prefix_len: usize,
}

impl UrcTable {
    pub(crate) fn new(max_handlers: usize, max_prefix_len: usize) -> Self {
        Self {
            entries: Vec::with_capacity(max_handlers),
            max_handlers,
            max_prefix_len,
        }
    }

    pub(crate) fn is_full(&self) -> bool {
        self.entries.len() >= self.max_handlers
    }

    /// Appends at the tail. Oversized prefixes are stored truncated.
    pub(crate) fn register(&mut self, prefix: &[u8], handler: UrcHandler) {
        let n = prefix.len().min(self.max_prefix_len);
        self.entries.push(UrcEntry {
            prefix: prefix[..n].to_vec(),
            handler,
        });
    }

    /// Removes the entry for `prefix` by swapping the last entry into its
    /// slot. Returns whether the prefix was present.
    pub(crate) fn unregister(&mut self, prefix: &[u8]) -> bool {
        match self.entries.iter().position(|e| e.prefix == prefix) {
            Some(i) => {
                self.entries.swap_remove(i);
                true
            }
            None => false,
        }
    }

    /// Scans in insertion order; the first entry whose prefix starts `line`
    /// gets the full line. Returns whether any entry matched.
    pub(crate) fn dispatch(&mut self, line: &[u8]) -> bool {
        for entry in &mut self.entries {
            if line.starts_with(&entry.prefix) {
                debug!("urc dispatch: {}", String::from_utf8_lossy(line));
                (entry.handler)(line);
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder(log: &Rc<RefCell<Vec<(u8, Vec<u8>)>>>, tag: u8) -> UrcHandler {
        let log = Rc::clone(log);
        Box::new(move |line| log.borrow_mut().push((tag, line.to_vec())))
    }

    #[test]
    fn dispatch_matches_byte_prefix() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut table = UrcTable::new(4, 32);
        table.register(b"+CMTI", recorder(&log, 0));

        assert!(table.dispatch(b"+CMTI: \"SM\",1"));
        assert!(!table.dispatch(b"+CREG: 1"));
        assert_eq!(log.borrow().as_slice(), &[(0, b"+CMTI: \"SM\",1".to_vec())]);
    }

    #[test]
    fn earliest_registered_prefix_wins() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut table = UrcTable::new(4, 32);
        table.register(b"+C", recorder(&log, 0));
        table.register(b"+CMTI", recorder(&log, 1));

        assert!(table.dispatch(b"+CMTI: \"SM\",1"));
        assert_eq!(log.borrow()[0].0, 0);
    }

    #[test]
    fn unregister_swaps_last_into_slot() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut table = UrcTable::new(4, 32);
        table.register(b"RING", recorder(&log, 0));
        table.register(b"+CMTI", recorder(&log, 1));
        table.register(b"+CREG", recorder(&log, 2));

        assert!(table.unregister(b"RING"));
        assert!(!table.unregister(b"RING"));

        // +CREG moved into slot 0; both survivors still dispatch.
        assert!(table.dispatch(b"+CREG: 5"));
        assert!(table.dispatch(b"+CMTI: \"SM\",2"));
        let tags: Vec<u8> = log.borrow().iter().map(|(t, _)| *t).collect();
        assert_eq!(tags, vec![2, 1]);
    }

    #[test]
    fn oversized_prefix_is_truncated() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut table = UrcTable::new(4, 4);
        table.register(b"+CMTI", recorder(&log, 0));
        // Stored as "+CMT", so it matches more broadly.
        assert!(table.dispatch(b"+CMT: deliver"));
    }
}
