// Serial bus stack for the wheel servos
//
// Provides:
// - Packet building and response decoding for the checksummed frame protocol
// - Serial transport with input flushing, timed reads, and open retries
// - Bus ID scanning diagnostics

pub mod packet;
pub mod scanner;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use scanner::ScanConfig;
pub use transport::{BusError, BusPort, BusTransport, RetryPolicy, SharedBus, DEFAULT_BAUDRATE};
