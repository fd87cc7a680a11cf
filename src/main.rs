use std::time::Duration;

use airborne_logger::{
    cancel::CancelToken,
    config::{init_logging, LoggerArgs},
    display::{ConsoleDisplay, LedMatrix, MessageDisplay},
    joystick::Joystick,
    logger::Logger,
    ReaderPool, Result,
};
use clap::Parser;

fn main() -> Result<()> {
    init_logging();
    let args = LoggerArgs::parse();
    let cancel = CancelToken::new();
    cancel.cancel_on_ctrlc()?;

    let readers = match args.sensors.open_readers(&cancel) {
        Err(e) if e.is_cancelled() => return Ok(()),
        r => r?,
    };
    let pool = ReaderPool::spawn(readers, &cancel)?;

    let mut logger = Logger::new(
        pool,
        &args.sensors.log_dir,
        open_display(&args),
        open_joystick(&args),
        args.on_failure,
        cancel,
    );
    let res = logger.run();
    logger.finish()?;
    res
}

fn open_display(args: &LoggerArgs) -> Box<dyn MessageDisplay> {
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

fn open_joystick(args: &LoggerArgs) -> Joystick {
    if args.stdin_controls || args.sensors.simulate {
        println!("type start, pause or resume");
        return Joystick::stdin();
    }
    match Joystick::open(args.joystick.as_deref()) {
        Ok(js) => js,
        Err(e) => {
            tracing::warn!("joystick unavailable, reading controls from stdin: {e}");
            Joystick::stdin()
        }
    }
}
