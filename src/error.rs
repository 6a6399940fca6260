use thiserror::Error;

/// Failure reported by a [`DigitalOutputPort`](crate::port::DigitalOutputPort).
#[derive(Debug, Error)]
pub enum PortError {
    #[error("pin {0} has not been configured as an output")]
    NotConfigured(u8),
    #[error("write to pin {0} failed (injected fault)")]
    Injected(u8),
    #[cfg(feature = "gpio")]
    #[error("GPIO error: {0}")]
    Gpio(#[from] rppal::gpio::Error),
}

#[derive(Debug, Error)]
pub enum StepperError {
    #[error("a stepper needs 2, 4 or 5 control pins, got {0}")]
    InvalidPinCount(usize),
    #[error("steps per revolution must be greater than zero")]
    ZeroStepsPerRevolution,
    #[error("speed must be a positive number of RPM, got {0}")]
    InvalidSpeed(f64),
    #[error("pin {0} is listed more than once")]
    DuplicatePin(u8),
    #[error("motion was cancelled before it completed")]
    MotionCancelled,
    #[error("no tokio runtime available to schedule motor steps")]
    NoRuntime,
    #[error(transparent)]
    Port(#[from] PortError),
}
