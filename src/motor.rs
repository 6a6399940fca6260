//! Timer driven stepper motor controller.
//!
//! Every motion (a bounded run of `n` steps or continuous rotation) is a tokio task that
//! owns a generation number. Starting, stopping or replacing a motion bumps the controller
//! generation while holding the state lock, so a tick that was already scheduled will see a
//! stale generation and exit without touching the pins.

use crate::error::{PortError, StepperError};
use crate::port::DigitalOutputPort;
use crate::sequence::{next_index, Direction, Level, WiringTopology};

use msg::response::{MotionKind, MotorStatus};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, trace, warn};

const MILLIS_PER_MINUTE: f64 = 60_000.0;

/// Called once when a bounded run ends, with the port error if a pin write failed.
pub type CompletionCallback = Box<dyn FnOnce(Result<(), StepperError>) + Send + 'static>;

enum Completion {
    Callback(CompletionCallback),
    Notify(oneshot::Sender<Result<(), StepperError>>),
}

impl Completion {
    fn succeed(self) {
        match self {
            Completion::Callback(callback) => callback(Ok(())),
            Completion::Notify(tx) => {
                let _ = tx.send(Ok(()));
            }
        }
    }

    fn fail(self, err: PortError) {
        match self {
            Completion::Callback(callback) => callback(Err(StepperError::Port(err))),
            Completion::Notify(tx) => {
                let _ = tx.send(Err(StepperError::Port(err)));
            }
        }
    }
}

enum ActiveMotion {
    None,
    Bounded {
        remaining: u32,
        completion: Option<Completion>,
    },
    Continuous,
}

struct MotorState {
    port: Box<dyn DigitalOutputPort>,
    step_index: u32,
    direction: Direction,
    step_delay: Duration,
    motion: ActiveMotion,
    generation: u64,
    task: Option<JoinHandle<()>>,
    last_fault: Option<String>,
}

impl MotorState {
    /// Invalidates the running motion, if any. A cancelled bounded run never completes.
    fn cancel_motion(&mut self) -> u64 {
        self.generation += 1;
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.motion = ActiveMotion::None;
        self.generation
    }

    fn finish_motion(&mut self) -> Option<Completion> {
        self.task = None;
        match std::mem::replace(&mut self.motion, ActiveMotion::None) {
            ActiveMotion::Bounded { completion, .. } => completion,
            _ => None,
        }
    }
}

struct Shared {
    name: String,
    topology: WiringTopology,
    pins: Vec<u8>,
    steps_per_revolution: u32,
    span: tracing::Span,
    state: Mutex<MotorState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, MotorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn drive(&self, state: &mut MotorState) -> Result<(), PortError> {
        let pattern = self.topology.pattern(state.step_index);
        for (&pin, &level) in self.pins.iter().zip(pattern) {
            state.port.write(pin, level)?;
        }
        return Ok(());
    }

    fn drive_low(&self, state: &mut MotorState) -> Result<(), PortError> {
        for &pin in &self.pins {
            state.port.write(pin, Level::Low)?;
        }
        return Ok(());
    }

    fn tick(&self, generation: u64) -> Tick {
        let _enter = self.span.enter();
        let mut state = self.lock();
        if state.generation != generation {
            return Tick::Stale;
        }

        state.step_index = next_index(state.step_index, self.steps_per_revolution, state.direction);
        trace!(step = state.step_index, "step");
        if let Err(err) = self.drive(&mut state) {
            error!("pin write failed, stopping motion: {}", err);
            state.last_fault = Some(err.to_string());
            state.generation += 1;
            let completion = state.finish_motion();
            return Tick::Failed(completion, err);
        }

        let step_delay = state.step_delay;
        match &mut state.motion {
            ActiveMotion::Bounded { remaining, .. } => {
                *remaining -= 1;
                if *remaining > 0 {
                    return Tick::Continue(step_delay);
                }
            }
            ActiveMotion::Continuous => return Tick::Continue(step_delay),
            ActiveMotion::None => return Tick::Stale,
        }
        debug!(step = state.step_index, "bounded run complete");
        Tick::Finished(state.finish_motion())
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(task) = state.task.take() {
            task.abort();
        }
    }
}

enum Tick {
    Continue(Duration),
    Finished(Option<Completion>),
    Failed(Option<Completion>, PortError),
    Stale,
}

async fn run_bounded(shared: Weak<Shared>, generation: u64, start: Instant, period: Duration) {
    let mut ticker = time::interval_at(start, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(shared) = shared.upgrade() else {
            return;
        };
        match shared.tick(generation) {
            Tick::Continue(_) => {}
            Tick::Finished(completion) => {
                if let Some(completion) = completion {
                    completion.succeed();
                }
                return;
            }
            Tick::Failed(completion, err) => {
                if let Some(completion) = completion {
                    completion.fail(err);
                }
                return;
            }
            Tick::Stale => return,
        }
    }
}

async fn run_continuous(shared: Weak<Shared>, generation: u64) {
    loop {
        let delay = {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            match shared.tick(generation) {
                Tick::Continue(delay) => delay,
                _ => return,
            }
        };
        time::sleep(delay).await;
    }
}

/// One step per millisecond is the fastest the timers can go.
fn max_rpm(steps_per_revolution: u32) -> f64 {
    MILLIS_PER_MINUTE / steps_per_revolution as f64
}

/// Step delay for `rpm`, which must not exceed [`max_rpm`]. The delay is `max_rpm / rpm`
/// milliseconds.
fn delay_for_rpm(steps_per_revolution: u32, rpm: f64) -> Duration {
    let delay_ms = max_rpm(steps_per_revolution) / rpm;
    Duration::from_nanos((delay_ms * 1_000_000.0).round() as u64)
}

/// Drives one stepper motor through a [`DigitalOutputPort`].
///
/// Handles are cheap to clone and all of them control the same motor, so a completion
/// callback can start the next motion. Dropping the last handle cancels any motion in
/// progress and leaves the pins at their last level.
#[derive(Clone)]
pub struct StepperController {
    shared: Arc<Shared>,
    runtime: Handle,
}

impl StepperController {
    /// Must be called from inside a tokio runtime, which then runs the step timers.
    ///
    /// The motor starts at 1 RPM, or at the maximum speed if one step per millisecond is
    /// already slower than that.
    pub fn new(
        steps_per_revolution: u32,
        pins: &[u8],
        port: Box<dyn DigitalOutputPort>,
    ) -> Result<StepperController, StepperError> {
        Self::with_name("stepper", steps_per_revolution, pins, port)
    }

    pub fn with_name(
        name: &str,
        steps_per_revolution: u32,
        pins: &[u8],
        mut port: Box<dyn DigitalOutputPort>,
    ) -> Result<StepperController, StepperError> {
        let topology = WiringTopology::from_pin_count(pins.len())?;
        if steps_per_revolution == 0 {
            return Err(StepperError::ZeroStepsPerRevolution);
        }
        for (i, pin) in pins.iter().enumerate() {
            if pins[..i].contains(pin) {
                return Err(StepperError::DuplicatePin(*pin));
            }
        }
        let runtime = Handle::try_current().map_err(|_| StepperError::NoRuntime)?;

        for &pin in pins {
            port.configure_as_output(pin)?;
        }

        let span = tracing::info_span!("motor", name = %name);
        span.in_scope(|| {
            debug!(
                "configured {:?} motor on pins {:?}, {} steps per revolution",
                topology, pins, steps_per_revolution
            )
        });

        let default_rpm = max_rpm(steps_per_revolution).min(1.0);
        let state = MotorState {
            port,
            step_index: 0,
            direction: Direction::Forward,
            step_delay: delay_for_rpm(steps_per_revolution, default_rpm),
            motion: ActiveMotion::None,
            generation: 0,
            task: None,
            last_fault: None,
        };
        let shared = Shared {
            name: name.to_string(),
            topology,
            pins: pins.to_vec(),
            steps_per_revolution,
            span,
            state: Mutex::new(state),
        };
        return Ok(StepperController {
            shared: Arc::new(shared),
            runtime,
        });
    }

    /// Sets the speed in revolutions per minute.
    ///
    /// The fastest achievable speed is one step per millisecond; anything above it is
    /// clamped without error.
    pub fn configure_speed(&self, desired_rpm: f64) -> Result<(), StepperError> {
        if !desired_rpm.is_finite() || desired_rpm <= 0.0 {
            return Err(StepperError::InvalidSpeed(desired_rpm));
        }
        let _enter = self.shared.span.enter();
        let max_rpm = max_rpm(self.shared.steps_per_revolution);
        let rpm = if desired_rpm > max_rpm {
            warn!("{} RPM is above the maximum of {} RPM, clamping", desired_rpm, max_rpm);
            max_rpm
        } else {
            desired_rpm
        };
        let delay = delay_for_rpm(self.shared.steps_per_revolution, rpm);
        debug!("speed set to {} RPM ({:?} per step)", rpm, delay);
        self.shared.lock().step_delay = delay;
        return Ok(());
    }

    pub fn rotate_forward(&self) {
        self.start_continuous(Direction::Forward);
    }

    pub fn rotate_backward(&self) {
        self.start_continuous(Direction::Backward);
    }

    /// Stops continuous rotation. Does nothing if the motor is idle or running a bounded move.
    pub fn stop_continuous(&self) {
        let mut state = self.shared.lock();
        if matches!(state.motion, ActiveMotion::Continuous) {
            state.cancel_motion();
            self.shared.span.in_scope(|| debug!("continuous rotation stopped"));
        }
    }

    /// Cancels any motion in progress. A cancelled bounded run does not invoke its callback.
    pub fn stop(&self) {
        let mut state = self.shared.lock();
        if !matches!(state.motion, ActiveMotion::None) {
            state.cancel_motion();
            self.shared.span.in_scope(|| debug!("motion cancelled"));
        }
    }

    /// Moves `steps` steps, backwards when negative, then calls `on_complete`.
    ///
    /// `on_complete` gets `Ok(())` after the last step, or the port error if a pin write
    /// failed and ended the run early. A run cancelled by another motion never calls it.
    ///
    /// The first pin change happens one full step delay after the call, so chaining
    /// `step(1)` and `step(-1)` always returns to the starting position. A zero step count
    /// completes synchronously without touching the pins.
    pub fn step(&self, steps: i32, on_complete: Option<CompletionCallback>) {
        self.start_bounded(steps, on_complete.map(Completion::Callback));
    }

    /// Like [`step`](Self::step) but waits for the run to end.
    pub async fn step_async(&self, steps: i32) -> Result<(), StepperError> {
        let (tx, rx) = oneshot::channel();
        self.start_bounded(steps, Some(Completion::Notify(tx)));
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(StepperError::MotionCancelled),
        }
    }

    /// Drives every pin low right now. Scheduled motion keeps running and will
    /// energize the coils again on its next tick; see [`emergency_stop`](Self::emergency_stop).
    pub fn halt_outputs(&self) -> Result<(), StepperError> {
        let mut state = self.shared.lock();
        self.shared.drive_low(&mut state)?;
        return Ok(());
    }

    /// Cancels any motion, then de-energizes the coils.
    pub fn emergency_stop(&self) -> Result<(), StepperError> {
        let mut state = self.shared.lock();
        state.cancel_motion();
        self.shared.drive_low(&mut state)?;
        self.shared.span.in_scope(|| debug!("emergency stop"));
        return Ok(());
    }

    fn start_bounded(&self, steps: i32, completion: Option<Completion>) {
        if steps == 0 {
            if let Some(completion) = completion {
                completion.succeed();
            }
            return;
        }

        let mut state = self.shared.lock();
        let generation = state.cancel_motion();
        state.direction = Direction::from_steps(steps);
        state.motion = ActiveMotion::Bounded {
            remaining: steps.unsigned_abs(),
            completion,
        };
        let period = state.step_delay;
        self.shared.span.in_scope(|| {
            debug!("moving {} steps, {:?} per step", steps, period);
        });
        let start = Instant::now() + period;
        let task = run_bounded(Arc::downgrade(&self.shared), generation, start, period);
        state.task = Some(self.runtime.spawn(task));
    }

    fn start_continuous(&self, direction: Direction) {
        let mut state = self.shared.lock();
        let generation = state.cancel_motion();
        state.direction = direction;
        state.motion = ActiveMotion::Continuous;
        self.shared.span.in_scope(|| debug!("rotating {:?}", direction));
        let task = run_continuous(Arc::downgrade(&self.shared), generation);
        state.task = Some(self.runtime.spawn(task));
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn topology(&self) -> WiringTopology {
        self.shared.topology
    }

    pub fn pins(&self) -> &[u8] {
        &self.shared.pins
    }

    pub fn steps_per_revolution(&self) -> u32 {
        self.shared.steps_per_revolution
    }

    pub fn step_index(&self) -> u32 {
        self.shared.lock().step_index
    }

    pub fn direction(&self) -> Direction {
        self.shared.lock().direction
    }

    pub fn step_delay(&self) -> Duration {
        self.shared.lock().step_delay
    }

    pub fn is_moving(&self) -> bool {
        !matches!(self.shared.lock().motion, ActiveMotion::None)
    }

    pub fn status(&self) -> MotorStatus {
        let state = self.shared.lock();
        let (motion, remaining_steps) = match &state.motion {
            ActiveMotion::None => (MotionKind::Idle, None),
            ActiveMotion::Bounded { remaining, .. } => (MotionKind::Bounded, Some(*remaining)),
            ActiveMotion::Continuous => (MotionKind::Continuous, None),
        };
        MotorStatus {
            name: self.shared.name.clone(),
            step_index: state.step_index,
            steps_per_revolution: self.shared.steps_per_revolution,
            direction: state.direction.sign(),
            motion,
            remaining_steps,
            step_delay_ms: state.step_delay.as_nanos() as f64 / 1_000_000.0,
            last_fault: state.last_fault.clone(),
        }
    }
}
