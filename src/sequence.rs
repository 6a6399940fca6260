use crate::error::StepperError;

/// Output level of a single control line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    /// Direction of a signed step count. Zero counts as forward.
    pub fn from_steps(steps: i32) -> Direction {
        if steps < 0 {
            Direction::Backward
        } else {
            Direction::Forward
        }
    }

    pub fn reversed(self) -> Direction {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }

    pub fn sign(self) -> i8 {
        match self {
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }
}

use Level::{High as H, Low as L};

const TWO_WIRE: [[Level; 2]; 4] = [
    [L, H],
    [H, H],
    [H, L],
    [L, L],
];

const FOUR_WIRE: [[Level; 4]; 4] = [
    [H, L, H, L],
    [L, H, H, L],
    [L, H, L, H],
    [H, L, L, H],
];

const FIVE_WIRE: [[Level; 5]; 10] = [
    [L, H, H, L, H],
    [L, H, L, L, H],
    [L, H, L, H, H],
    [L, H, L, H, L],
    [H, H, L, H, L],
    [H, L, L, H, L],
    [H, L, H, H, L],
    [H, L, H, L, L],
    [H, L, H, L, H],
    [L, L, H, L, H],
];

/// How the controller is wired to the motor coils.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WiringTopology {
    TwoWire,
    FourWire,
    FiveWire,
}

impl WiringTopology {
    pub fn from_pin_count(count: usize) -> Result<WiringTopology, StepperError> {
        match count {
            2 => Ok(WiringTopology::TwoWire),
            4 => Ok(WiringTopology::FourWire),
            5 => Ok(WiringTopology::FiveWire),
            n => Err(StepperError::InvalidPinCount(n)),
        }
    }

    pub fn pin_count(&self) -> usize {
        match self {
            WiringTopology::TwoWire => 2,
            WiringTopology::FourWire => 4,
            WiringTopology::FiveWire => 5,
        }
    }

    /// Number of entries in the commutation table.
    pub fn cycle_length(&self) -> usize {
        match self {
            WiringTopology::TwoWire => TWO_WIRE.len(),
            WiringTopology::FourWire => FOUR_WIRE.len(),
            WiringTopology::FiveWire => FIVE_WIRE.len(),
        }
    }

    /// Pin levels for `index`, ordered like the configured pins.
    pub fn pattern(&self, index: u32) -> &'static [Level] {
        let row = index as usize % self.cycle_length();
        match self {
            WiringTopology::TwoWire => &TWO_WIRE[row],
            WiringTopology::FourWire => &FOUR_WIRE[row],
            WiringTopology::FiveWire => &FIVE_WIRE[row],
        }
    }
}

/// Moves `index` one position in `direction`, wrapping inside `[0, steps_per_revolution)`.
pub fn next_index(index: u32, steps_per_revolution: u32, direction: Direction) -> u32 {
    match direction {
        Direction::Forward => {
            if index + 1 >= steps_per_revolution {
                0
            } else {
                index + 1
            }
        }
        Direction::Backward => {
            if index == 0 {
                steps_per_revolution - 1
            } else {
                index - 1
            }
        }
    }
}
