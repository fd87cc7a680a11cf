use std::{
    fs::File,
    io::{BufRead, BufReader, Read},
    path::Path,
    thread::spawn,
};

use crossbeam::channel::{unbounded, Receiver};

use crate::{sysfs::find_device, Result};

pub const JOYSTICK_NAME: &str = "Raspberry Pi Sense HAT Joystick";

/// `struct input_event`: a `timeval`, then type, code and value.
#[cfg(target_pointer_width = "64")]
const EVENT_SIZE: usize = 24;
#[cfg(not(target_pointer_width = "64"))]
const EVENT_SIZE: usize = 16;

const EV_KEY: u16 = 0x01;
const KEY_ENTER: u16 = 28;
const KEY_UP: u16 = 103;
const KEY_LEFT: u16 = 105;
const KEY_RIGHT: u16 = 106;
const KEY_DOWN: u16 = 108;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Released,
    Pressed,
    Held,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub direction: Direction,
    pub action: Action,
}

impl InputEvent {
    pub fn pressed(direction: Direction) -> Self {
        Self {
            direction,
            action: Action::Pressed,
        }
    }
}

/// Decodes one raw `input_event`. Anything other than a joystick key is `None`.
pub fn decode(raw: &[u8; EVENT_SIZE]) -> Option<InputEvent> {
    let at = EVENT_SIZE - 8;
    let kind = u16::from_ne_bytes([raw[at], raw[at + 1]]);
    let code = u16::from_ne_bytes([raw[at + 2], raw[at + 3]]);
    let value = i32::from_ne_bytes([raw[at + 4], raw[at + 5], raw[at + 6], raw[at + 7]]);
    if kind != EV_KEY {
        return None;
    }
    let direction = match code {
        KEY_UP => Direction::Up,
        KEY_DOWN => Direction::Down,
        KEY_LEFT => Direction::Left,
        KEY_RIGHT => Direction::Right,
        KEY_ENTER => Direction::Middle,
        _ => return None,
    };
    let action = match value {
        0 => Action::Released,
        1 => Action::Pressed,
        2 => Action::Held,
        _ => return None,
    };
    Some(InputEvent { direction, action })
}

/// Stdin words standing in for joystick presses.
pub fn parse_command(line: &str) -> Option<Direction> {
    match line.trim() {
        "start" | "middle" => Some(Direction::Middle),
        "pause" | "up" => Some(Direction::Up),
        "resume" | "down" => Some(Direction::Down),
        "left" => Some(Direction::Left),
        "right" => Some(Direction::Right),
        _ => None,
    }
}

/// Events arrive on a background thread; [`get_events`](Joystick::get_events) drains
/// whatever has queued up since the last call without blocking.
pub struct Joystick {
    rx: Receiver<InputEvent>,
}

impl Joystick {
    /// Opens `path`, or the input device named [`JOYSTICK_NAME`] when `path` is `None`.
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_owned(),
            None => find_device(
                Path::new("/sys/class/input"),
                "event",
                "device/name",
                JOYSTICK_NAME,
                Path::new("/dev/input"),
                "sense hat joystick",
            )?,
        };
        let dev = File::open(&path)?;
        tracing::debug!("joystick at {}", path.display());
        Ok(Self::from_device(dev))
    }

    pub fn from_device<R: Read + Send + 'static>(mut dev: R) -> Self {
        let (tx, rx) = unbounded();
        spawn(move || {
            let mut raw = [0u8; EVENT_SIZE];
            loop {
                if let Err(e) = dev.read_exact(&mut raw) {
                    tracing::debug!("joystick closed: {e}");
                    break;
                }
                if let Some(event) = decode(&raw) {
                    if tx.send(event).is_err() {
                        break;
                    }
                }
            }
        });
        Self { rx }
    }

    /// Maps lines read from stdin (`start`, `pause`, `resume`, ...) to presses.
    pub fn stdin() -> Self {
        let (tx, rx) = unbounded();
        spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                match parse_command(&line) {
                    Some(direction) => {
                        if tx.send(InputEvent::pressed(direction)).is_err() {
                            break;
                        }
                    }
                    None => println!("bad input:{line}"),
                }
            }
        });
        Self { rx }
    }

    pub fn from_receiver(rx: Receiver<InputEvent>) -> Self {
        Self { rx }
    }

    pub fn get_events(&self) -> Vec<InputEvent> {
        self.rx.try_iter().collect()
    }
}
