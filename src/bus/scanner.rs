// Bus ID scan: walk candidate addresses and record which servos answer.
//
// Diagnostic path only - it must not run while the drive controller is
// writing to the same bus, so callers go through the shared transport handle.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::packet::{self, Register};
use super::transport::{BusTransport, Result};

/// Scan timing and bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Highest candidate ID (inclusive); the protocol allows up to 253
    pub max_id: u8,
    /// Read attempts per candidate before declaring it absent
    pub attempts: u32,
    /// Wait between sending a request and reading its reply
    pub settle_ms: u64,
    /// Read window per attempt
    pub timeout_ms: u64,
    /// Pause before retrying the same ID
    pub retry_gap_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_id: 20,
            attempts: 5,
            settle_ms: 20,
            timeout_ms: 100,
            retry_gap_ms: 10,
        }
    }
}

impl ScanConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_gap(&self) -> Duration {
        Duration::from_millis(self.retry_gap_ms)
    }
}

/// Read a 2-byte register with bounded attempts. `Ok(None)` means the servo
/// never produced a valid reply - silence and a garbled frame count the same.
pub fn read_register(
    bus: &mut BusTransport,
    id: u8,
    register: Register,
    cfg: &ScanConfig,
) -> Result<Option<u16>> {
    let request = packet::encode_read(id, register, 2);
    for attempt in 0..cfg.attempts {
        if attempt > 0 {
            thread::sleep(cfg.retry_gap());
        }
        let raw = bus.transact(&request, cfg.settle(), cfg.timeout())?;
        if let Some((_, value)) = packet::decode_register(&raw, id) {
            debug!("motor {id} answered on attempt {}", attempt + 1);
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// Presence probe: a successful model-register read means the ID is live
pub fn ping(bus: &mut BusTransport, id: u8, cfg: &ScanConfig) -> Result<Option<u16>> {
    read_register(bus, id, Register::ModelNumber, cfg)
}

/// Enumerate responding servos in ascending ID order as (id, model code).
/// Worst case is bounded by max_id x attempts x (settle + timeout).
pub fn scan(bus: &mut BusTransport, cfg: &ScanConfig) -> Result<Vec<(u8, u16)>> {
    let max_id = cfg.max_id.min(packet::MAX_MOTOR_ID);
    info!("scanning bus IDs 1-{max_id}");

    let mut found = Vec::new();
    for id in 1..=max_id {
        match ping(bus, id, cfg)? {
            Some(model) => {
                info!("motor {id}: model {model}");
                found.push((id, model));
            }
            None => debug!("motor {id}: no response"),
        }
    }

    info!("scan complete: {} motor(s) found", found.len());
    Ok(found)
}
