pub static DEFAULT_CONFIG_PATH: &str = "motor.json";

pub mod command {
    use serde;

    #[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
    #[serde(tag = "cmd", rename_all = "snake_case")]
    pub enum Command {
        Speed { rpm: f64 },
        Step { steps: i32 },
        Forward,
        Backward,
        Wait { millis: u64 },
        /// Stops continuous rotation only.
        Stop,
        /// Cancels whatever motion is in progress.
        Cancel,
        Halt,
        EmergencyStop,
        Status,
    }
}

pub mod response {
    use serde;

    #[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
    #[serde(rename_all = "snake_case")]
    pub enum Response {
        Ok,
        Error(String),
        Status(MotorStatus),
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
    #[serde(rename_all = "snake_case")]
    pub enum MotionKind {
        Idle,
        Bounded,
        Continuous,
    }

    #[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
    pub struct MotorStatus {
        pub name: String,
        pub step_index: u32,
        pub steps_per_revolution: u32,
        /// +1 forward, -1 backward
        pub direction: i8,
        pub motion: MotionKind,
        pub remaining_steps: Option<u32>,
        pub step_delay_ms: f64,
        pub last_fault: Option<String>,
    }
}
