// Serial transport for the servo bus: owns the port, sends frames, reads
// timed responses, and retries connection establishment.
//
// The bus is half-duplex - one frame in flight at a time. Callers serialize
// access; the drive controller and the scanner share one transport behind a
// mutex rather than opening the device twice.

use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serialport::{ClearBuffer, SerialPort};
use tracing::{debug, warn};

/// Default serial configuration for the wheel servo bus
pub const DEFAULT_BAUDRATE: u32 = 1_000_000;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(100);

/// Upper bound on a single response read
const READ_BUF_LEN: usize = 128;

/// Error types for bus communication. Garbled or misaddressed frames are not
/// errors - they decode to absence in the packet layer.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("no response from motor {id}")]
    Timeout { id: u8 },

    #[error("failed to open {port} after {attempts} attempts: {source}")]
    Connection {
        port: String,
        attempts: u32,
        #[source]
        source: Box<BusError>,
    },
}

pub type Result<T> = std::result::Result<T, BusError>;

/// Narrow view of the serial device: just what a request/response cycle
/// needs. The production implementation wraps a serialport handle; tests
/// substitute a scripted mock.
pub trait BusPort: Send {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn clear_input(&mut self) -> io::Result<()>;
    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()>;
}

struct SerialDevice(Box<dyn SerialPort>);

impl BusPort for SerialDevice {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.0.write_all(frame)?;
        self.0.flush()
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.0.clear(ClearBuffer::Input).map_err(io::Error::from)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.0.set_timeout(timeout).map_err(io::Error::from)
    }
}

/// Connection retry policy: bounded attempt count with an optionally growing
/// delay between attempts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay_ms: u64,
    /// Multiplier applied to the delay after each failed attempt (1.0 = fixed)
    pub growth: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 500,
            growth: 1.0,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given zero-based failed attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let ms = self.base_delay_ms as f32 * self.growth.powi(attempt as i32);
        Duration::from_millis(ms as u64)
    }
}

/// Re-invoke `op` until it succeeds or the policy's attempts are exhausted;
/// the final attempt's error is returned as-is and no further attempt is
/// made. No delay follows the last attempt.
pub fn with_retries<T>(policy: &RetryPolicy, mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if attempt + 1 < policy.attempts => {
                warn!("attempt {} failed: {e}, retrying", attempt + 1);
                thread::sleep(policy.delay_after(attempt));
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Serial transport for the servo bus
pub struct BusTransport {
    port: Box<dyn BusPort>,
}

/// Transport handle shared between the controller and diagnostics. The mutex
/// enforces the one-frame-in-flight discipline on the half-duplex bus.
pub type SharedBus = Arc<Mutex<BusTransport>>;

impl BusTransport {
    /// Open the serial device
    pub fn open(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(DEFAULT_TIMEOUT)
            .open()?;
        debug!("opened {port_name} at {baudrate} baud");
        Ok(Self::from_port(Box::new(SerialDevice(port))))
    }

    /// Wrap an already-open port (tests use this with a scripted mock)
    pub fn from_port(port: Box<dyn BusPort>) -> Self {
        Self { port }
    }

    /// Open with bounded retries; the last failure is wrapped as a
    /// connection error naming the device
    pub fn open_with_retries(port_name: &str, baudrate: u32, policy: &RetryPolicy) -> Result<Self> {
        with_retries(policy, || Self::open(port_name, baudrate)).map_err(|e| {
            BusError::Connection {
                port: port_name.to_string(),
                attempts: policy.attempts,
                source: Box::new(e),
            }
        })
    }

    /// Write one frame. Stale input is dropped first so a previous partial
    /// response cannot be read back as this frame's answer.
    pub fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.port.clear_input()?;
        self.port.write_frame(frame)?;
        Ok(())
    }

    /// Read whatever arrives within `timeout`. An empty buffer is the normal
    /// "no device answered" outcome, not an error.
    pub fn receive(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        self.port.set_read_timeout(timeout)?;
        let mut buf = [0u8; READ_BUF_LEN];
        match self.port.read_available(&mut buf) {
            Ok(n) => Ok(buf[..n].to_vec()),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// One request/response cycle: send, give the servo a settle window to
    /// reply, then read. The next cycle must not start until this returns.
    pub fn transact(&mut self, frame: &[u8], settle: Duration, timeout: Duration) -> Result<Vec<u8>> {
        self.send(frame)?;
        thread::sleep(settle);
        self.receive(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::testing::MockPort;

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            base_delay_ms: 1,
            growth: 1.0,
        }
    }

    #[test]
    fn test_retry_exhaustion_stops_at_limit() {
        let mut calls = 0;
        let result: Result<()> = with_retries(&fast_policy(3), || {
            calls += 1;
            Err(BusError::Timeout { id: 1 })
        });
        assert!(result.is_err());
        // Third failure is final - no fourth attempt
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_retry_stops_on_success() {
        let mut calls = 0;
        let result = with_retries(&fast_policy(3), || {
            calls += 1;
            if calls < 2 {
                Err(BusError::Timeout { id: 1 })
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_retry_delay_growth() {
        let policy = RetryPolicy {
            attempts: 4,
            base_delay_ms: 100,
            growth: 2.0,
        };
        assert_eq!(policy.delay_after(0), Duration::from_millis(100));
        assert_eq!(policy.delay_after(1), Duration::from_millis(200));
        assert_eq!(policy.delay_after(2), Duration::from_millis(400));
    }

    #[test]
    fn test_open_missing_device_is_connection_error() {
        let err = BusTransport::open_with_retries("/dev/missing-bus-device", 1_000_000, &fast_policy(2))
            .err()
            .expect("open of a missing device should fail");
        match err {
            BusError::Connection { port, attempts, .. } => {
                assert_eq!(port, "/dev/missing-bus-device");
                assert_eq!(attempts, 2);
            }
            other => panic!("expected connection error, got {other}"),
        }
    }

    #[test]
    fn test_send_drops_stale_input() {
        let mut mock = MockPort::new();
        mock.push_input(&[0xFF, 0xFF, 1, 2]); // leftover partial response
        let mut bus = BusTransport::from_port(Box::new(mock));

        bus.send(&[0xFF, 0xFF, 3, 2, 0x01, 0xF9]).unwrap();
        let received = bus.receive(Duration::from_millis(1)).unwrap();
        assert!(received.is_empty());
    }

    #[test]
    fn test_receive_timeout_is_empty_not_error() {
        let mut bus = BusTransport::from_port(Box::new(MockPort::new()));
        let received = bus.receive(Duration::from_millis(1)).unwrap();
        assert!(received.is_empty());
    }

    #[test]
    fn test_receive_returns_queued_bytes() {
        let mut mock = MockPort::new();
        mock.push_input(&[0xFF, 0xFF, 3, 4, 0, 9, 3, 236]);
        let mut bus = BusTransport::from_port(Box::new(mock));
        let received = bus.receive(Duration::from_millis(1)).unwrap();
        assert_eq!(received, vec![0xFF, 0xFF, 3, 4, 0, 9, 3, 236]);
    }
}
