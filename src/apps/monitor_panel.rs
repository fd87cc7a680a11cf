use std::{
    io::{stdin, BufRead},
    sync::Arc,
    thread::spawn,
    time::Duration,
};

use airborne_logger::{
    cancel::CancelToken,
    config::{init_logging, PanelArgs},
    display::{ConsoleDisplay, LedMatrix, MessageDisplay},
    panel::{Command, PanelOptions, PanelSession, ReaderFactory},
    reading::SensorKind,
    Reader, Result,
};
use clap::Parser;
use crossbeam::{
    channel::{tick, unbounded},
    select,
};

fn main() -> Result<()> {
    init_logging();
    let args = PanelArgs::parse();

    let ctrlc = CancelToken::new();
    ctrlc.cancel_on_ctrlc()?;

    let sensors = args.sensors.clone();
    let open: ReaderFactory =
        Arc::new(move |kind: SensorKind| -> Result<Box<dyn Reader>> { sensors.open_reader(kind) });
    let opts = PanelOptions {
        interval: Duration::from_millis(args.interval_ms),
        retry_delay: args.sensors.retry_delay(),
        auto_save: !args.no_auto_save,
        log_dir: args.sensors.log_dir.clone(),
    };
    let mut session = PanelSession::new(open, open_display(&args), opts);

    let (cmd_tx, cmd_rx) = unbounded();
    spawn(move || {
        for line in stdin().lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match line.parse::<Command>() {
                Ok(cmd) => {
                    if cmd_tx.send(cmd).is_err() {
                        break;
                    }
                }
                Err(e) => println!("{e}"),
            }
        }
    });
    println!("commands: start, pause, stop, save <path>, autosave on|off, status, quit");

    let ticker = tick(Duration::from_millis(args.tick_ms));
    loop {
        select! {
            recv(cmd_rx) -> cmd => {
                let cmd = cmd.unwrap_or(Command::Quit);
                if !session.handle(cmd)? {
                    break;
                }
            }
            recv(ticker) -> _ => {
                session.tick();
                if ctrlc.is_cancelled() {
                    session.handle(Command::Quit)?;
                    break;
                }
            }
        }
    }
    Ok(())
}

fn open_display(args: &PanelArgs) -> Box<dyn MessageDisplay> {
    if args.sensors.simulate {
        return Box::new(ConsoleDisplay);
    }
    let speed = Duration::from_millis(args.scroll_speed_ms);
    match LedMatrix::open(args.framebuffer.as_deref(), speed) {
        Ok(led) => Box::new(led),
        Err(e) => {
            tracing::warn!("led matrix unavailable, messages go to the log: {e}");
            Box::new(ConsoleDisplay)
        }
    }
}
