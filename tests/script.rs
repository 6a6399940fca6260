use msg::command::Command;
use msg::response::{MotionKind, Response};
use stepper_pi::script::{load_script, process_command, run_script};
use stepper_pi::{Level, RecordingPort, StepperController};

use std::io::Write;

#[tokio::test(start_paused = true)]
async fn runs_commands_in_order() {
    let (port, log) = RecordingPort::new();
    let motor = StepperController::with_name("bench", 200, &[5, 6, 13, 19], Box::new(port)).unwrap();

    let commands = vec![
        Command::Speed { rpm: 60.0 },
        Command::Step { steps: 8 },
        Command::Status,
        Command::Forward,
        Command::Wait { millis: 12 },
        Command::Stop,
        Command::Halt,
        Command::Status,
    ];
    let responses = run_script(&motor, commands).await;
    assert_eq!(responses.len(), 8);

    let Response::Status(after_step) = &responses[2] else {
        panic!("expected a status, got {:?}", responses[2]);
    };
    assert_eq!(after_step.name, "bench");
    assert_eq!(after_step.step_index, 8);
    assert_eq!(after_step.motion, MotionKind::Idle);
    assert_eq!(after_step.step_delay_ms, 5.0);

    // continuous steps at 40, 45 and 50 ms
    let Response::Status(last) = &responses[7] else {
        panic!("expected a status, got {:?}", responses[7]);
    };
    assert_eq!(last.step_index, 11);
    assert_eq!(last.direction, 1);
    assert_eq!(last.motion, MotionKind::Idle);
    assert_eq!(last.last_fault, None);

    for pin in [5, 6, 13, 19] {
        assert_eq!(log.last_level(pin), Some(Level::Low));
    }
}

#[tokio::test(start_paused = true)]
async fn script_stops_at_first_error() {
    let (port, log) = RecordingPort::new();
    let motor = StepperController::new(200, &[5, 6], Box::new(port)).unwrap();

    let responses = run_script(
        &motor,
        vec![Command::Speed { rpm: -5.0 }, Command::Step { steps: 1 }],
    )
    .await;
    assert_eq!(responses.len(), 1);
    assert!(matches!(&responses[0], Response::Error(text) if text.contains("-5")));
    assert_eq!(log.write_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_and_emergency_stop() {
    let (port, log) = RecordingPort::new();
    let motor = StepperController::new(200, &[5, 6], Box::new(port)).unwrap();

    assert_eq!(process_command(&motor, Command::Backward).await, Response::Ok);
    assert!(motor.is_moving());
    assert_eq!(process_command(&motor, Command::Cancel).await, Response::Ok);
    assert!(!motor.is_moving());

    motor.rotate_forward();
    assert_eq!(
        process_command(&motor, Command::EmergencyStop).await,
        Response::Ok
    );
    assert!(!motor.is_moving());
    assert_eq!(log.last_level(5), Some(Level::Low));
    assert_eq!(log.last_level(6), Some(Level::Low));
}

#[test]
fn loads_script_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"[{{"cmd": "step", "steps": 4}}, {{"cmd": "halt"}}]"#).unwrap();
    let commands = load_script(file.path()).unwrap();
    assert_eq!(commands, vec![Command::Step { steps: 4 }, Command::Halt]);
}
