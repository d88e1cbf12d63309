//! Byte transport abstraction
//!
//! The engine does not open ports or own file descriptors; it consumes a
//! narrow non-blocking capability and drives everything from `poll()`.

#[cfg(feature = "transport-serial")]
pub mod serial;

/// Non-blocking byte I/O plus a millisecond clock, one instance per port.
///
/// `read` and `write` must never block: returning `0` means "nothing right
/// now" and the engine simply tries again on the next poll. Partial writes
/// are honored; the engine resumes payload streaming where the transport
/// left off.
pub trait Transport {
    /// One-time setup, called when the port is added to the engine.
    fn init(&mut self) {}

    /// Reads up to `buf.len()` bytes without blocking. `0` = no data now.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Writes as much of `data` as the transport accepts without blocking,
    /// returning the accepted byte count.
    fn write(&mut self, data: &[u8]) -> usize;

    /// Monotonic milliseconds. Free to wrap; the engine compares with
    /// wrapping subtraction and tolerates a single wrap per command.
    fn now_ms(&mut self) -> u32;
}

// Lets an engine over `Box<dyn Transport>` mix transport types per port.
impl<T: Transport + ?Sized> Transport for Box<T> {
    fn init(&mut self) {
        (**self).init();
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        (**self).read(buf)
    }

    fn write(&mut self, data: &[u8]) -> usize {
        (**self).write(data)
    }

    fn now_ms(&mut self) -> u32 {
        (**self).now_ms()
    }
}
