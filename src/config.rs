use std::io::Read;

use crate::error::StepperError;
use crate::motor::StepperController;
use crate::port::DigitalOutputPort;
use crate::sequence::WiringTopology;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotorConfig {
    #[serde(default = "default_name")]
    pub name: String,
    pub steps_per_revolution: u32,
    /// BCM pin numbers, in coil order.
    pub pins: Vec<u8>,
    #[serde(default)]
    pub rpm: Option<f64>,
}

fn default_name() -> String {
    "stepper".to_string()
}

impl MotorConfig {
    /// 200 step motor on BCM pins 5, 6, 13 and 19.
    pub fn demo() -> MotorConfig {
        MotorConfig {
            name: "demo".to_string(),
            steps_per_revolution: 200,
            pins: vec![5, 6, 13, 19],
            rpm: None,
        }
    }

    pub fn topology(&self) -> Result<WiringTopology, StepperError> {
        WiringTopology::from_pin_count(self.pins.len())
    }

    pub fn validate(&self) -> Result<(), StepperError> {
        self.topology()?;
        if self.steps_per_revolution == 0 {
            return Err(StepperError::ZeroStepsPerRevolution);
        }
        for (i, pin) in self.pins.iter().enumerate() {
            if self.pins[..i].contains(pin) {
                return Err(StepperError::DuplicatePin(*pin));
            }
        }
        if let Some(rpm) = self.rpm {
            if !rpm.is_finite() || rpm <= 0.0 {
                return Err(StepperError::InvalidSpeed(rpm));
            }
        }
        return Ok(());
    }

    pub fn build(&self, port: Box<dyn DigitalOutputPort>) -> Result<StepperController, StepperError> {
        self.validate()?;
        let motor =
            StepperController::with_name(&self.name, self.steps_per_revolution, &self.pins, port)?;
        if let Some(rpm) = self.rpm {
            motor.configure_speed(rpm)?;
        }
        return Ok(motor);
    }
}

fn decorate_with_path(e: std::io::Error, path: &std::path::Path) -> std::io::Error {
    let p = path.display();
    return std::io::Error::new(e.kind(), format!("{p}: {e}"));
}

pub fn load_config(path: &std::path::Path) -> Result<MotorConfig> {
    let file = std::fs::File::open(path).map_err(|e| decorate_with_path(e, path))?;
    let mut reader = std::io::BufReader::new(file);

    let mut buffer = String::new();
    reader
        .read_to_string(&mut buffer)
        .map_err(|e| decorate_with_path(e, path))?;

    let config: MotorConfig = serde_json::from_str(&buffer)?;
    config.validate()?;
    return Ok(config);
}
