use std::{
    fs,
    sync::Arc,
    thread::sleep,
    time::{Duration, Instant},
};

use airborne_logger::{
    display::ConsoleDisplay,
    panel::{Command, PanelOptions, PanelSession, ReaderFactory},
    reading::SensorKind,
    simulate, Reader, Result,
};

fn simulated() -> ReaderFactory {
    Arc::new(|kind: SensorKind| -> Result<Box<dyn Reader>> {
        let mut all = simulate::readers(Duration::from_millis(5));
        Ok(all.swap_remove(kind.index()))
    })
}

#[test]
fn collects_combined_rows_until_stopped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flight.csv");
    let mut session = PanelSession::new(
        simulated(),
        Box::new(ConsoleDisplay),
        PanelOptions {
            interval: Duration::from_millis(10),
            log_dir: dir.path().to_owned(),
            ..PanelOptions::default()
        },
    );
    assert!(session.handle(Command::SaveAs(path.clone())).unwrap());
    assert!(session.handle(Command::Start).unwrap());

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut rows = 0;
    while rows < 3 && Instant::now() < deadline {
        rows += session.tick();
        sleep(Duration::from_millis(10));
    }
    assert!(rows >= 3, "only {rows} rows");
    assert!(SensorKind::ORDER.iter().all(|&k| session.is_connected(k)));

    assert!(!session.handle(Command::Quit).unwrap());
    assert!(!session.is_collecting());
    assert!(!session.is_connected(SensorKind::Gps));

    let text = fs::read_to_string(&path).unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("time,lat,lon,alt,speed,climb,track,pressure,humidity,temp,pitch,roll,yaw,acc_x,acc_y,acc_z,voltage,cpu_temp")
    );
    let body: Vec<&str> = lines.collect();
    assert_eq!(body.len(), rows);
    assert!(body.iter().all(|row| row.split(',').count() == 18));
}
