// Scripted serial port stand-in for transport, scanner, and controller
// tests. Records written frames, replays programmed responses keyed off the
// request, and can fail writes on demand.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::packet;
use super::transport::BusPort;

/// Shared log of every frame successfully written to a mock port
pub type FrameLog = Arc<Mutex<Vec<Vec<u8>>>>;

type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

pub struct MockPort {
    writes: FrameLog,
    rx: VecDeque<u8>,
    responder: Option<Responder>,
    fail_writes: usize,
}

impl MockPort {
    /// Port that accepts writes and never answers
    pub fn new() -> Self {
        Self {
            writes: Arc::new(Mutex::new(Vec::new())),
            rx: VecDeque::new(),
            responder: None,
            fail_writes: 0,
        }
    }

    /// Port whose responses are computed from each written frame;
    /// returning `None` models a silent bus
    pub fn with_responder(f: impl FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static) -> Self {
        let mut port = Self::new();
        port.responder = Some(Box::new(f));
        port
    }

    /// Handle to the write log, usable after the port moves into a transport
    pub fn writes(&self) -> FrameLog {
        self.writes.clone()
    }

    /// Make the next `n` writes fail with an io error
    pub fn fail_next_writes(&mut self, n: usize) {
        self.fail_writes = n;
    }

    /// Pre-load unread input, as if a stale response were still buffered
    pub fn push_input(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes);
    }
}

impl BusPort for MockPort {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        if self.fail_writes > 0 {
            self.fail_writes -= 1;
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure"));
        }
        self.writes.lock().unwrap().push(frame.to_vec());
        if let Some(responder) = &mut self.responder {
            if let Some(reply) = responder(frame) {
                self.rx.extend(reply);
            }
        }
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.rx.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "mock read timeout"));
        }
        let n = buf.len().min(self.rx.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.rx.pop_front().expect("checked non-empty");
        }
        Ok(n)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.rx.clear();
        Ok(())
    }

    fn set_read_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }
}

/// Well-formed 2-byte register read response from `id`
pub fn register_response(id: u8, value: u16) -> Vec<u8> {
    let [lo, hi] = value.to_le_bytes();
    let mut frame = vec![0xFF, 0xFF, id, 4, 0, lo, hi];
    frame.push(packet::checksum(&frame[2..]));
    frame
}
