// Drive core for a three-wheel omnidirectional chassis whose wheel servos
// share a half-duplex serial bus.
//
// Provides:
// - Checksummed packet codec for the wheel servo protocol
// - Serial transport with bounded timeouts and open retries
// - Bus ID scanning diagnostics
// - Chassis drive controller with step-counted semantic commands

pub mod bus;
pub mod chassis;
pub mod config;

pub use bus::{BusError, BusTransport, RetryPolicy, ScanConfig, SharedBus};
pub use chassis::{
    CancelToken, ChassisCommands, ChassisController, DriveInterface, DriveVector, Motion,
    MotionConfig, SimulatedController, WheelRoleMap,
};
pub use config::RobotConfig;
