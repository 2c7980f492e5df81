// End-to-end checks of the public chassis API against the simulated board

use boe_chassis::chassis::{BoardWrite, ChassisDriver, SimBoard};
use boe_chassis::command::{ChassisCommand, parse_command_file};
use boe_chassis::config::ChassisConfig;
use boe_chassis::runtime::apply_request;

fn quick_driver() -> ChassisDriver<SimBoard> {
    let config = ChassisConfig::from_json(r#"{"default_hold_secs": 0.0, "hold_latency_secs": 0.0}"#)
        .expect("valid config");
    ChassisDriver::new(SimBoard::new(), &config).expect("driver")
}

#[test]
fn speed_three_forward_then_stop() {
    let mut driver = quick_driver();
    let pair = driver.calibration().lookup(3).unwrap();

    driver.set_speed(3).unwrap();
    driver.board_mut().clear();
    driver.forward(Some(0.05)).unwrap();

    assert_eq!(
        driver.board().writes(),
        &[
            BoardWrite::Throttle {
                channel: 0,
                value: pair.left
            },
            BoardWrite::Throttle {
                channel: 1,
                value: -pair.right
            },
            BoardWrite::Throttle {
                channel: 0,
                value: 0.0
            },
            BoardWrite::Throttle {
                channel: 1,
                value: 0.0
            },
        ]
    );
}

#[test]
fn camera_stays_in_range_for_any_sequence() {
    let mut driver = quick_driver();
    let steps = [
        (false, 90.0),
        (false, 90.0),
        (true, 45.0),
        (true, 500.0),
        (true, 135.0),
        (true, 1.0),
        (false, 360.0),
    ];

    for (clockwise, increment) in steps {
        let _ = driver.yaw_camera(clockwise, Some(increment), false);
        let angle = driver.camera_angle();
        assert!((-90.0..=90.0).contains(&angle), "angle {} escaped", angle);
        assert_eq!(driver.board().angle(2), Some(angle + 90.0));
    }
    assert_eq!(driver.camera_angle(), -90.0);

    driver
        .yaw_camera(false, Some(12.0), true)
        .expect("reset always succeeds");
    assert_eq!(driver.camera_angle(), 0.0);
}

#[test]
fn daemon_file_drives_the_chassis() {
    let mut driver = quick_driver();

    let request = parse_command_file("forward\nmedium\n0\n").unwrap().unwrap();
    apply_request(&mut driver, &request).unwrap();
    assert_eq!(driver.speed_level(), 2);

    let request = parse_command_file("camangle\n\n45\n").unwrap().unwrap();
    assert_eq!(request.command, ChassisCommand::CameraAngle { degrees: -45.0 });
    apply_request(&mut driver, &request).unwrap();
    assert_eq!(driver.board().angle(2), Some(45.0));

    assert_eq!(driver.board().throttle(0), Some(0.0));
    assert_eq!(driver.board().throttle(1), Some(0.0));
}
