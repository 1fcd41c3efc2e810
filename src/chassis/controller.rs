// Drive controller for the three-wheel omni base
//
// Maps semantic motions (forward, turn, strafe) onto per-wheel velocity
// triples and executes them as timed pulses: write the triple, hold, then
// always write zero. Wheel layout (top view):
//
//        front
//          O
//         / \
//   left O   O right
//
// The wheels sit 120 degrees apart with the front wheel's axis perpendicular
// to the forward direction, so the motion table is a fixed property of the
// geometry rather than something computed at runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bus::packet::{self, OperatingMode, Register};
use crate::bus::scanner::{self, ScanConfig};
use crate::bus::transport::{BusError, BusTransport, Result, SharedBus};
use crate::config::RobotConfig;

/// Cancellation poll interval during a motion hold
const HOLD_SLICE: Duration = Duration::from_millis(20);

/// Logical wheel roles bound to physical bus IDs.
///
/// This mapping is configuration, not inference. On the reference hardware
/// the servo configured under a "left" name (ID 7) is physically the right
/// wheel - verify the map against the actual wiring before driving.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct WheelRoleMap {
    pub right: u8,
    pub front: u8,
    pub left: u8,
}

impl Default for WheelRoleMap {
    fn default() -> Self {
        Self {
            right: 7,
            front: 8,
            left: 9,
        }
    }
}

impl WheelRoleMap {
    /// IDs in (right, front, left) order
    pub fn ids(&self) -> [u8; 3] {
        [self.right, self.front, self.left]
    }
}

/// Speeds and pulse durations for the semantic motions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Default wheel speed in raw servo units
    pub base_speed: i16,
    /// Hard clamp on any commanded wheel speed
    pub max_speed: i16,
    /// Translation pulse length
    pub move_ms: u64,
    /// Rotation pulse length
    pub turn_ms: u64,
    /// Strafe pulse length
    pub strafe_ms: u64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            base_speed: 600,
            max_speed: 3000,
            move_ms: 2000,
            turn_ms: 1000,
            strafe_ms: 500,
        }
    }
}

/// Per-wheel velocity commands in (right, front, left) order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriveVector {
    pub right: i16,
    pub front: i16,
    pub left: i16,
}

impl DriveVector {
    pub const ZERO: Self = Self {
        right: 0,
        front: 0,
        left: 0,
    };

    pub fn new(right: i16, front: i16, left: i16) -> Self {
        Self { right, front, left }
    }

    /// Clamp every component to the configured magnitude bound
    pub fn clamped(self, max: i16) -> Self {
        Self {
            right: self.right.clamp(-max, max),
            front: self.front.clamp(-max, max),
            left: self.left.clamp(-max, max),
        }
    }
}

/// Semantic motions of the chassis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Forward,
    Backward,
    TurnLeft,
    TurnRight,
    StrafeLeft,
    StrafeRight,
}

impl Motion {
    /// Wheel velocity triple realizing this motion at speed `v`
    pub fn vector(self, v: i16) -> DriveVector {
        match self {
            // front wheel axis is perpendicular to forward, so it stays still
            Motion::Forward => DriveVector::new(v, 0, -v),
            Motion::Backward => DriveVector::new(-v, 0, v),
            // all wheels in the same direction spin the platform in place
            Motion::TurnLeft => DriveVector::new(v, v, v),
            Motion::TurnRight => DriveVector::new(-v, -v, -v),
            // sideways: the front wheel does the work, the rear pair holds the line
            Motion::StrafeLeft => DriveVector::new(-v / 2, v, -v / 2),
            Motion::StrafeRight => DriveVector::new(v / 2, -v, v / 2),
        }
    }

    /// Default pulse duration for this motion kind
    pub fn duration(self, cfg: &MotionConfig) -> Duration {
        let ms = match self {
            Motion::Forward | Motion::Backward => cfg.move_ms,
            Motion::TurnLeft | Motion::TurnRight => cfg.turn_ms,
            Motion::StrafeLeft | Motion::StrafeRight => cfg.strafe_ms,
        };
        Duration::from_millis(ms)
    }

    /// Imperative name, used in logs and failure reports
    pub fn label(self) -> &'static str {
        match self {
            Motion::Forward => "move forward",
            Motion::Backward => "move backward",
            Motion::TurnLeft => "turn left",
            Motion::TurnRight => "turn right",
            Motion::StrafeLeft => "strafe left",
            Motion::StrafeRight => "strafe right",
        }
    }

    /// Past-tense description for success reports
    pub fn describe(self) -> &'static str {
        match self {
            Motion::Forward => "moved forward",
            Motion::Backward => "moved backward",
            Motion::TurnLeft => "turned left",
            Motion::TurnRight => "turned right",
            Motion::StrafeLeft => "strafed left",
            Motion::StrafeRight => "strafed right",
        }
    }
}

/// Cloneable stop request polled between hold slices. Cancelling skips the
/// rest of the in-flight motion's hold and goes straight to the stop write;
/// the token rearms when the next motion starts.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn rearm(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Drive controller for the omni base.
///
/// Every motion follows the same contract: one velocity write, a bounded
/// hold, then an unconditional zero write before control returns - wheels
/// never keep spinning past a pulse.
pub struct ChassisController {
    bus: SharedBus,
    wheels: WheelRoleMap,
    motion: MotionConfig,
    cancel: CancelToken,
    last_error: Option<String>,
    shut_down: bool,
}

impl ChassisController {
    /// Wrap an already-open bus. The transport handle may be shared with the
    /// scanner; the mutex keeps their request cycles from interleaving.
    pub fn new(bus: SharedBus, wheels: WheelRoleMap, motion: MotionConfig) -> Self {
        Self {
            bus,
            wheels,
            motion,
            cancel: CancelToken::new(),
            last_error: None,
            shut_down: false,
        }
    }

    /// Open the configured bus with retries and prepare the wheels for
    /// velocity control. Fails if the device cannot be claimed or a mapped
    /// wheel never answers.
    pub fn connect(cfg: &RobotConfig) -> Result<Self> {
        let transport = BusTransport::open_with_retries(&cfg.port, cfg.baud, &cfg.retry)?;
        let mut controller = Self::new(
            Arc::new(Mutex::new(transport)),
            cfg.wheels,
            cfg.motion.clone(),
        );
        controller.initialize(&cfg.scan)?;
        Ok(controller)
    }

    /// Verify each mapped wheel answers, then configure velocity control:
    /// torque off, operating mode = velocity, torque back on.
    pub fn initialize(&mut self, scan: &ScanConfig) -> Result<()> {
        let ids = self.wheels.ids();
        info!("initializing wheels {ids:?} for velocity control");

        {
            let mut bus = self.lock_bus();
            for id in ids {
                match scanner::ping(&mut bus, id, scan)? {
                    Some(model) => debug!("wheel {id} responding (model {model})"),
                    None => {
                        warn!("wheel {id} not responding");
                        return Err(BusError::Timeout { id });
                    }
                }
            }
        }

        self.sync_write_u8(Register::TorqueEnable, 0)?;
        self.sync_write_u8(Register::OperatingMode, OperatingMode::Velocity as u8)?;
        self.sync_write_u8(Register::TorqueEnable, 1)?;
        info!("wheels ready");
        Ok(())
    }

    /// Execute one motion pulse: write the vector, hold for the duration
    /// while polling the cancel token, then always write zero.
    ///
    /// Returns whether the velocity write succeeded. The stop write happens
    /// regardless, so a failed pulse cannot leave an earlier command spinning
    /// the wheels.
    pub fn drive(&mut self, motion: Motion, speed: Option<i16>, duration: Option<Duration>) -> bool {
        let speed = speed.unwrap_or(self.motion.base_speed);
        let duration = duration.unwrap_or_else(|| motion.duration(&self.motion));
        debug!("{}: speed={speed} duration={duration:?}", motion.label());

        self.cancel.rearm();
        let ok = self.write_vector(motion.vector(speed));
        self.hold(duration);
        let stopped = self.write_vector(DriveVector::ZERO);
        if ok && !stopped {
            warn!("trailing stop write failed after {}", motion.label());
        }
        ok
    }

    pub fn move_forward(&mut self, speed: Option<i16>, duration: Option<Duration>) -> bool {
        self.drive(Motion::Forward, speed, duration)
    }

    pub fn move_backward(&mut self, speed: Option<i16>, duration: Option<Duration>) -> bool {
        self.drive(Motion::Backward, speed, duration)
    }

    pub fn turn_left(&mut self, speed: Option<i16>, duration: Option<Duration>) -> bool {
        self.drive(Motion::TurnLeft, speed, duration)
    }

    pub fn turn_right(&mut self, speed: Option<i16>, duration: Option<Duration>) -> bool {
        self.drive(Motion::TurnRight, speed, duration)
    }

    pub fn strafe_left(&mut self, speed: Option<i16>, duration: Option<Duration>) -> bool {
        self.drive(Motion::StrafeLeft, speed, duration)
    }

    pub fn strafe_right(&mut self, speed: Option<i16>, duration: Option<Duration>) -> bool {
        self.drive(Motion::StrafeRight, speed, duration)
    }

    /// Immediate zero-velocity write
    pub fn stop(&mut self) -> bool {
        self.write_vector(DriveVector::ZERO)
    }

    /// Write a velocity triple to all three wheels in one broadcast frame,
    /// recording any failure as the retrievable last error
    pub fn write_vector(&mut self, vector: DriveVector) -> bool {
        match self.try_write_vector(vector) {
            Ok(()) => true,
            Err(e) => {
                warn!("velocity write failed: {e}");
                self.last_error = Some(e.to_string());
                false
            }
        }
    }

    /// Description of the most recent transport failure
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Token for preempting the in-flight motion's hold
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Shared transport handle, for running scan diagnostics on this bus
    pub fn bus(&self) -> SharedBus {
        self.bus.clone()
    }

    pub fn wheels(&self) -> &WheelRoleMap {
        &self.wheels
    }

    /// Zero the wheels and release torque. Issued once at teardown - between
    /// pulses the wheels stay powered so the next pulse starts crisply.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        info!("shutting down chassis: stop + torque release");
        if !self.write_vector(DriveVector::ZERO) {
            warn!("final stop write failed");
        }
        if let Err(e) = self.sync_write_u8(Register::TorqueEnable, 0) {
            warn!("torque release failed: {e}");
        }
    }

    fn try_write_vector(&mut self, vector: DriveVector) -> Result<()> {
        let v = vector.clamped(self.motion.max_speed);
        let data = [
            (self.wheels.right, v.right),
            (self.wheels.front, v.front),
            (self.wheels.left, v.left),
        ];
        let frame = packet::encode_sync_write_i16(Register::GoalVelocity, &data);
        debug!(
            "wheel velocities: right={} front={} left={}",
            v.right, v.front, v.left
        );
        self.lock_bus().send(&frame)
    }

    fn sync_write_u8(&mut self, register: Register, value: u8) -> Result<()> {
        let data = self.wheels.ids().map(|id| (id, value));
        let frame = packet::encode_sync_write_u8(register, &data);
        self.lock_bus().send(&frame)
    }

    /// Block for `duration`, waking every slice to poll for cancellation
    fn hold(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            if self.cancel.is_cancelled() {
                debug!("hold cancelled, stopping early");
                break;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            thread::sleep(remaining.min(HOLD_SLICE));
        }
    }

    fn lock_bus(&self) -> MutexGuard<'_, BusTransport> {
        // a poisoned lock still holds a usable transport
        self.bus.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for ChassisController {
    fn drop(&mut self) {
        self.shutdown();
    }
}
