use crate::error::StepperError;
use crate::motor::StepperController;

use msg::command::Command;
use msg::response::Response;
use std::io::Read;
use std::time::Duration;

pub fn load_script(path: &std::path::Path) -> anyhow::Result<Vec<Command>> {
    let mut buffer = String::new();
    std::fs::File::open(path)
        .and_then(|mut f| f.read_to_string(&mut buffer))
        .map_err(|e| std::io::Error::new(e.kind(), format!("{}: {e}", path.display())))?;
    let commands = serde_json::from_str(&buffer)?;
    return Ok(commands);
}

pub async fn process_command(motor: &StepperController, command: Command) -> Response {
    match execute(motor, command).await {
        Ok(response) => response,
        Err(e) => Response::Error(e.to_string()),
    }
}

async fn execute(motor: &StepperController, command: Command) -> Result<Response, StepperError> {
    use Command as cmd;
    match command {
        cmd::Speed { rpm } => motor.configure_speed(rpm)?,
        cmd::Step { steps } => motor.step_async(steps).await?,
        cmd::Forward => motor.rotate_forward(),
        cmd::Backward => motor.rotate_backward(),
        cmd::Wait { millis } => tokio::time::sleep(Duration::from_millis(millis)).await,
        cmd::Stop => motor.stop_continuous(),
        cmd::Cancel => motor.stop(),
        cmd::Halt => motor.halt_outputs()?,
        cmd::EmergencyStop => motor.emergency_stop()?,
        cmd::Status => return Ok(Response::Status(motor.status())),
    }
    Ok(Response::Ok)
}

/// Runs `commands` in order, stopping at the first error.
pub async fn run_script(motor: &StepperController, commands: Vec<Command>) -> Vec<Response> {
    let mut responses = Vec::with_capacity(commands.len());
    for command in commands {
        tracing::debug!("script command: {:?}", command);
        let response = process_command(motor, command).await;
        let failed = matches!(response, Response::Error(_));
        responses.push(response);
        if failed {
            break;
        }
    }
    responses
}
