// Chassis control for the omni base
//
// Provides:
// - Fixed motion table mapping semantic drives to wheel velocity triples
// - Timed-pulse drive controller with cancellable holds
// - Step-counted command strings for the external tool layer

pub mod commands;
pub mod controller;

pub use commands::{ChassisCommands, DriveInterface, SimulatedController};
pub use controller::{
    CancelToken, ChassisController, DriveVector, Motion, MotionConfig, WheelRoleMap,
};
