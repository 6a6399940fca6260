use crate::error::PortError;
use crate::sequence::Level;

use anyhow::Result;
use std::sync::{Arc, Mutex, MutexGuard};

/// The only GPIO capability the controller needs.
pub trait DigitalOutputPort: Send {
    fn configure_as_output(&mut self, pin: u8) -> Result<(), PortError>;
    fn write(&mut self, pin: u8, level: Level) -> Result<(), PortError>;
}

pub fn make_output_port(dry_run: bool) -> Result<Box<dyn DigitalOutputPort>> {
    #[cfg(feature = "gpio")]
    if !dry_run {
        let port: Box<dyn DigitalOutputPort> = Box::new(gpio_port::GpioPort::new()?);
        return Ok(port);
    }
    #[cfg(not(feature = "gpio"))]
    if !dry_run {
        tracing::warn!("built without the `gpio` feature, pin writes are only logged");
    }
    let port: Box<dyn DigitalOutputPort> = Box::new(TracingPort::default());
    return Ok(port);
}

/// Port for dry runs. Pin changes go to the log at trace level and are not kept.
#[derive(Debug, Default)]
pub struct TracingPort {
    configured: Vec<u8>,
}

impl DigitalOutputPort for TracingPort {
    fn configure_as_output(&mut self, pin: u8) -> Result<(), PortError> {
        tracing::debug!(pin, "configured as output");
        if !self.configured.contains(&pin) {
            self.configured.push(pin);
        }
        return Ok(());
    }

    fn write(&mut self, pin: u8, level: Level) -> Result<(), PortError> {
        if !self.configured.contains(&pin) {
            return Err(PortError::NotConfigured(pin));
        }
        tracing::trace!(pin, ?level, "write");
        return Ok(());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortEvent {
    Configure(u8),
    Write(u8, Level),
}

/// Shared view of everything a [`RecordingPort`] has been asked to do.
#[derive(Debug, Clone, Default)]
pub struct PortLog {
    events: Arc<Mutex<Vec<PortEvent>>>,
}

impl PortLog {
    fn lock(&self) -> MutexGuard<'_, Vec<PortEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, event: PortEvent) {
        self.lock().push(event);
    }

    pub fn events(&self) -> Vec<PortEvent> {
        self.lock().clone()
    }

    pub fn configured(&self) -> Vec<u8> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                PortEvent::Configure(pin) => Some(*pin),
                PortEvent::Write(..) => None,
            })
            .collect()
    }

    pub fn writes(&self) -> Vec<(u8, Level)> {
        self.lock()
            .iter()
            .filter_map(|e| match e {
                PortEvent::Write(pin, level) => Some((*pin, *level)),
                PortEvent::Configure(_) => None,
            })
            .collect()
    }

    pub fn write_count(&self) -> usize {
        self.lock()
            .iter()
            .filter(|e| matches!(e, PortEvent::Write(..)))
            .count()
    }

    /// Last level written to `pin`, if it was ever written.
    pub fn last_level(&self, pin: u8) -> Option<Level> {
        self.lock().iter().rev().find_map(|e| match e {
            PortEvent::Write(p, level) if *p == pin => Some(*level),
            _ => None,
        })
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// In-memory port for tests. Every call is kept in the shared [`PortLog`].
#[derive(Debug)]
pub struct RecordingPort {
    log: PortLog,
    configured: Vec<u8>,
    writes_left: Option<usize>,
}

impl RecordingPort {
    pub fn new() -> (RecordingPort, PortLog) {
        let log = PortLog::default();
        let port = RecordingPort {
            log: log.clone(),
            configured: Vec::new(),
            writes_left: None,
        };
        (port, log)
    }

    /// Accept `writes` more writes, then fail every later one.
    pub fn fail_after(mut self, writes: usize) -> RecordingPort {
        self.writes_left = Some(writes);
        self
    }
}

impl DigitalOutputPort for RecordingPort {
    fn configure_as_output(&mut self, pin: u8) -> Result<(), PortError> {
        self.configured.push(pin);
        self.log.push(PortEvent::Configure(pin));
        return Ok(());
    }

    fn write(&mut self, pin: u8, level: Level) -> Result<(), PortError> {
        if !self.configured.contains(&pin) {
            return Err(PortError::NotConfigured(pin));
        }
        if let Some(left) = self.writes_left.as_mut() {
            if *left == 0 {
                return Err(PortError::Injected(pin));
            }
            *left -= 1;
        }
        self.log.push(PortEvent::Write(pin, level));
        return Ok(());
    }
}

#[cfg(feature = "gpio")]
pub mod gpio_port {
    use super::*;
    use rppal::gpio::{Gpio, OutputPin};
    use std::collections::HashMap;

    impl From<Level> for rppal::gpio::Level {
        fn from(level: Level) -> Self {
            match level {
                Level::Low => rppal::gpio::Level::Low,
                Level::High => rppal::gpio::Level::High,
            }
        }
    }

    /// Raspberry Pi header pins, addressed by BCM number.
    pub struct GpioPort {
        gpio: Gpio,
        pins: HashMap<u8, OutputPin>,
    }

    impl GpioPort {
        pub fn new() -> Result<GpioPort, PortError> {
            let gpio = Gpio::new()?;
            return Ok(GpioPort {
                gpio,
                pins: HashMap::new(),
            });
        }
    }

    impl DigitalOutputPort for GpioPort {
        fn configure_as_output(&mut self, pin: u8) -> Result<(), PortError> {
            let mut output = self.gpio.get(pin)?.into_output();
            // pins keep their last driven level when the port goes away
            output.set_reset_on_drop(false);
            self.pins.insert(pin, output);
            return Ok(());
        }

        fn write(&mut self, pin: u8, level: Level) -> Result<(), PortError> {
            let output = self
                .pins
                .get_mut(&pin)
                .ok_or(PortError::NotConfigured(pin))?;
            output.write(level.into());
            return Ok(());
        }
    }
}
