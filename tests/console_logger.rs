use std::{fs, thread::sleep, time::Duration};

use airborne_logger::{
    cancel::CancelToken,
    display::ConsoleDisplay,
    joystick::{Direction, InputEvent, Joystick},
    logger::{Logger, State},
    reading::{LOG_HEADER, ROW_FIELDS},
    simulate, FailurePolicy, LogFile, ReaderPool,
};
use chrono::NaiveDate;
use crossbeam::channel::unbounded;

#[test]
fn new_run_creates_timestamped_log_with_header() {
    let dir = tempfile::tempdir().unwrap();
    let now = NaiveDate::from_ymd_opt(2024, 7, 14)
        .unwrap()
        .and_hms_opt(15, 4, 5)
        .unwrap();
    let log = LogFile::create_in(dir.path(), now).unwrap();
    let path = log.path().unwrap().to_owned();
    assert_eq!(
        path.file_name().unwrap(),
        "logger_2024-07-14_15-04-05.log"
    );
    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(text.lines().next(), Some(LOG_HEADER));
}

#[test]
fn simulated_run_pauses_and_resumes() {
    let dir = tempfile::tempdir().unwrap();
    let cancel = CancelToken::new();
    let pool = ReaderPool::spawn(simulate::readers(Duration::ZERO), &cancel).unwrap();
    let (presses, rx) = unbounded();
    let mut logger = Logger::new(
        pool,
        dir.path(),
        Box::new(ConsoleDisplay),
        Joystick::from_receiver(rx),
        FailurePolicy::Skip,
        cancel.clone(),
    );
    assert!(logger.log_path().is_none());
    presses.send(InputEvent::pressed(Direction::Middle)).unwrap();
    logger.wait_for_start().unwrap();
    let path = logger.log_path().unwrap().to_owned();
    let lines = || fs::read_to_string(&path).unwrap().lines().count();
    for _ in 0..3 {
        assert!(logger.step().unwrap());
    }
    assert_eq!(lines(), 4);

    presses.send(InputEvent::pressed(Direction::Up)).unwrap();
    logger.poll_controls();
    assert_eq!(logger.state(), State::Paused);
    logger.step().unwrap();
    sleep(Duration::from_millis(20));
    assert_eq!(lines(), 4);

    presses.send(InputEvent::pressed(Direction::Down)).unwrap();
    logger.poll_controls();
    assert!(logger.step().unwrap());
    assert_eq!(lines(), 5);

    let text = fs::read_to_string(&path).unwrap();
    for row in text.lines().skip(1) {
        assert!(row.ends_with(','));
        assert_eq!(row.trim_end_matches(',').split(',').count(), ROW_FIELDS);
    }
    logger.finish().unwrap();
}
