use stepper_pi::config::{load_config, MotorConfig};
use stepper_pi::port::make_output_port;
use stepper_pi::script::{load_script, run_script};
use stepper_pi::{logging, StepperController};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[clap(version, about = "Drive a stepper motor from the GPIO header")]
struct Cli {
    /// Motor description (JSON)
    #[clap(long, default_value = msg::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Override the configured speed
    #[clap(long)]
    rpm: Option<f64>,
    /// Log pin writes (visible with -vv) instead of touching the hardware
    #[clap(long)]
    dry_run: bool,
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    #[clap(subcommand)]
    cmd: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum RotateDirection {
    Forward,
    Backward,
}

#[derive(Subcommand)]
enum Commands {
    /// Move a number of steps, negative moves backwards
    Step {
        #[clap(allow_negative_numbers = true)]
        steps: i32,
    },
    Degrees {
        #[clap(allow_negative_numbers = true)]
        degrees: f32,
    },
    /// Rotate continuously for a while, then stop
    Rotate {
        #[clap(value_enum)]
        direction: RotateDirection,
        #[clap(long, default_value = "5")]
        seconds: f64,
    },
    /// Drive every pin low
    Halt,
    /// Run a JSON list of commands
    Script { path: PathBuf },
    /// 200 steps on a 200 step motor wired to pins 5, 6, 13 and 19
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    logging::init(args.verbose);

    let mut config = match args.cmd {
        Commands::Demo => MotorConfig::demo(),
        _ => load_config(&args.config)?,
    };
    if args.rpm.is_some() {
        config.rpm = args.rpm;
    }

    let port = make_output_port(args.dry_run)?;
    let motor = config.build(port)?;
    tracing::info!(
        "Initialized {} ({:?}, {} steps/rev, {:?} per step)",
        motor.name(),
        motor.topology(),
        motor.steps_per_revolution(),
        motor.step_delay()
    );

    match args.cmd {
        Commands::Step { steps } => {
            motor.step_async(steps).await?;
        }
        Commands::Degrees { degrees } => {
            let steps_per_rev = motor.steps_per_revolution() as f32;
            let steps = (degrees / 360_f32 * steps_per_rev).round() as i32;
            tracing::info!("Moving motor {} degrees, {} steps", degrees, steps);
            motor.step_async(steps).await?;
        }
        Commands::Rotate { direction, seconds } => {
            rotate_for(&motor, direction, seconds).await?;
        }
        Commands::Halt => {
            motor.halt_outputs()?;
        }
        Commands::Script { path } => {
            let commands = load_script(&path)?;
            for response in run_script(&motor, commands).await {
                println!("{}", serde_json::to_string(&response)?);
            }
        }
        Commands::Demo => {
            motor.step_async(200).await?;
            tracing::info!("Demo complete, step index {}", motor.step_index());
        }
    }

    Ok(())
}

async fn rotate_for(
    motor: &StepperController,
    direction: RotateDirection,
    seconds: f64,
) -> Result<()> {
    let duration = Duration::try_from_secs_f64(seconds)?;
    match direction {
        RotateDirection::Forward => motor.rotate_forward(),
        RotateDirection::Backward => motor.rotate_backward(),
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted");
        }
    }
    motor.stop_continuous();
    if let Some(fault) = motor.status().last_fault {
        anyhow::bail!("motor stopped early: {fault}");
    }
    Ok(())
}
