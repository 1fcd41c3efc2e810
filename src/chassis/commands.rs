// Step-counted command surface for the external tool layer.
//
// The command layer owns its controller handle outright - nothing is looked
// up through process-wide state. When the hardware is unreachable it runs
// over a simulated controller that only logs, so an interactive session
// stays up without a robot attached.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::controller::{ChassisController, Motion};
use crate::config::RobotConfig;

/// Minimal controller surface the command layer drives. Implemented by the
/// real chassis controller and by the simulated fallback.
pub trait DriveInterface: Send {
    fn drive(&mut self, motion: Motion, speed: Option<i16>, duration: Option<Duration>) -> bool;
    fn stop(&mut self) -> bool;
    fn last_error(&self) -> Option<String>;
    fn shutdown(&mut self) {}
}

impl DriveInterface for ChassisController {
    fn drive(&mut self, motion: Motion, speed: Option<i16>, duration: Option<Duration>) -> bool {
        ChassisController::drive(self, motion, speed, duration)
    }

    fn stop(&mut self) -> bool {
        ChassisController::stop(self)
    }

    fn last_error(&self) -> Option<String> {
        ChassisController::last_error(self).map(str::to_string)
    }

    fn shutdown(&mut self) {
        ChassisController::shutdown(self)
    }
}

/// Fallback controller that performs no I/O; every operation logs and
/// reports success
#[derive(Debug, Default)]
pub struct SimulatedController;

impl DriveInterface for SimulatedController {
    fn drive(&mut self, motion: Motion, _speed: Option<i16>, _duration: Option<Duration>) -> bool {
        info!("simulated: {}", motion.label());
        true
    }

    fn stop(&mut self) -> bool {
        info!("simulated: stop");
        true
    }

    fn last_error(&self) -> Option<String> {
        None
    }
}

/// Command interface over an injected controller. Each call runs its steps
/// to completion (including the trailing stop of the final pulse) before
/// returning, and reports the outcome as a human-readable string.
pub struct ChassisCommands {
    controller: Box<dyn DriveInterface>,
}

impl ChassisCommands {
    pub fn new(controller: Box<dyn DriveInterface>) -> Self {
        Self { controller }
    }

    /// Connect to the configured bus. On failure fall back to the simulated
    /// controller rather than taking the host process down.
    pub fn connect(cfg: &RobotConfig) -> Self {
        match ChassisController::connect(cfg) {
            Ok(controller) => {
                info!("chassis connected on {}", cfg.port);
                Self::new(Box::new(controller))
            }
            Err(e) => {
                warn!("chassis unavailable ({e}), using simulated controller");
                Self::new(Box::new(SimulatedController))
            }
        }
    }

    pub fn move_forward(&mut self, steps: u32) -> String {
        self.repeat(Motion::Forward, steps)
    }

    pub fn move_backward(&mut self, steps: u32) -> String {
        self.repeat(Motion::Backward, steps)
    }

    pub fn turn_left(&mut self, steps: u32) -> String {
        self.repeat(Motion::TurnLeft, steps)
    }

    pub fn turn_right(&mut self, steps: u32) -> String {
        self.repeat(Motion::TurnRight, steps)
    }

    pub fn strafe_left(&mut self, steps: u32) -> String {
        self.repeat(Motion::StrafeLeft, steps)
    }

    pub fn strafe_right(&mut self, steps: u32) -> String {
        self.repeat(Motion::StrafeRight, steps)
    }

    pub fn stop(&mut self) -> String {
        if self.controller.stop() {
            "robot stopped".to_string()
        } else {
            format!("stop failed: {}", self.error_text())
        }
    }

    pub fn shutdown(&mut self) {
        self.controller.shutdown();
    }

    /// Run a motion `steps` times; halt at the first failed step and report
    /// how many completed
    fn repeat(&mut self, motion: Motion, steps: u32) -> String {
        let steps = steps.max(1);
        for done in 0..steps {
            debug!("{} step {}/{}", motion.label(), done + 1, steps);
            if !self.controller.drive(motion, None, None) {
                return format!(
                    "{} failed at step {} of {}: {} ({} step{} completed)",
                    motion.label(),
                    done + 1,
                    steps,
                    self.error_text(),
                    done,
                    plural(done),
                );
            }
        }
        format!("robot {} {} step{}", motion.describe(), steps, plural(steps))
    }

    fn error_text(&self) -> String {
        self.controller
            .last_error()
            .unwrap_or_else(|| "unknown transport error".to_string())
    }
}

fn plural(n: u32) -> &'static str {
    if n == 1 { "" } else { "s" }
}
