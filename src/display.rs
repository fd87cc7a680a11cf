//! Text feedback on the Sense HAT 8x8 LED matrix.

use std::{
    convert::Infallible,
    fs::{File, OpenOptions},
    io::{Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    thread::sleep,
    time::Duration,
};

use embedded_graphics::{
    draw_target::DrawTarget,
    geometry::{OriginDimensions, Point, Size},
    mono_font::{ascii::FONT_5X8, MonoTextStyle},
    pixelcolor::{IntoStorage, Rgb565, RgbColor},
    text::{Baseline, Text},
    Drawable, Pixel,
};

use crate::{sysfs::find_device, Result};

pub const FB_NAME: &str = "RPi-Sense FB";

const SIDE: u32 = 8;

pub trait MessageDisplay: Send {
    /// Scrolls `text` across the display, blocking until it has gone by.
    fn show_message(&mut self, text: &str) -> Result<()>;
    fn clear(&mut self) -> Result<()>;
}

impl<D: MessageDisplay + ?Sized> MessageDisplay for Box<D> {
    fn show_message(&mut self, text: &str) -> Result<()> {
        (**self).show_message(text)
    }

    fn clear(&mut self) -> Result<()> {
        (**self).clear()
    }
}

/// Stand-in for headless runs: messages go to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleDisplay;

impl MessageDisplay for ConsoleDisplay {
    fn show_message(&mut self, text: &str) -> Result<()> {
        tracing::info!(target: "display", "{text}");
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        Ok(())
    }
}

/// One 8-pixel-high strip of text, padded with a blank screen on both sides.
struct Canvas {
    width: u32,
    pixels: Vec<Rgb565>,
}

impl Canvas {
    fn render(text: &str, color: Rgb565) -> Self {
        let glyph = FONT_5X8.character_size.width + FONT_5X8.character_spacing;
        let width = SIDE + glyph * text.chars().count() as u32 + SIDE;
        let mut canvas = Canvas {
            width,
            pixels: vec![Rgb565::BLACK; (width * SIDE) as usize],
        };
        let style = MonoTextStyle::new(&FONT_5X8, color);
        // drawing into a Vec cannot fail
        let _ = Text::with_baseline(text, Point::new(SIDE as i32, 0), style, Baseline::Top)
            .draw(&mut canvas);
        canvas
    }

    fn frame_count(&self) -> u32 {
        self.width - SIDE + 1
    }

    fn frame(&self, offset: u32) -> [Rgb565; 64] {
        let mut out = [Rgb565::BLACK; 64];
        for y in 0..SIDE {
            for x in 0..SIDE {
                out[(y * SIDE + x) as usize] = self.pixels[(y * self.width + offset + x) as usize];
            }
        }
        out
    }
}

impl OriginDimensions for Canvas {
    fn size(&self) -> Size {
        Size::new(self.width, SIDE)
    }
}

impl DrawTarget for Canvas {
    type Color = Rgb565;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> std::result::Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(p, color) in pixels {
            if p.x >= 0 && p.y >= 0 && (p.x as u32) < self.width && (p.y as u32) < SIDE {
                self.pixels[(p.y as u32 * self.width + p.x as u32) as usize] = color;
            }
        }
        Ok(())
    }
}

fn frame_bytes(frame: &[Rgb565; 64]) -> [u8; 128] {
    let mut buf = [0u8; 128];
    for (chunk, color) in buf.chunks_exact_mut(2).zip(frame) {
        chunk.copy_from_slice(&color.into_storage().to_le_bytes());
    }
    buf
}

pub struct LedMatrix<F = File> {
    fb: F,
    scroll_speed: Duration,
    color: Rgb565,
}

impl LedMatrix<File> {
    /// Opens `path`, or the framebuffer named [`FB_NAME`] when `path` is `None`.
    pub fn open(path: Option<&Path>, scroll_speed: Duration) -> Result<Self> {
        let path: PathBuf = match path {
            Some(p) => p.to_owned(),
            None => find_device(
                Path::new("/sys/class/graphics"),
                "fb",
                "name",
                FB_NAME,
                Path::new("/dev"),
                "sense hat framebuffer",
            )?,
        };
        let fb = OpenOptions::new().write(true).open(&path)?;
        tracing::debug!("led matrix at {}", path.display());
        Ok(Self::new(fb, scroll_speed))
    }
}

impl<F: Write + Seek + Send> LedMatrix<F> {
    pub fn new(fb: F, scroll_speed: Duration) -> Self {
        Self {
            fb,
            scroll_speed,
            color: Rgb565::WHITE,
        }
    }

    fn show(&mut self, frame: &[Rgb565; 64]) -> Result<()> {
        self.fb.seek(SeekFrom::Start(0))?;
        self.fb.write_all(&frame_bytes(frame))?;
        self.fb.flush()?;
        Ok(())
    }
}

impl<F: Write + Seek + Send> MessageDisplay for LedMatrix<F> {
    fn show_message(&mut self, text: &str) -> Result<()> {
        let canvas = Canvas::render(text, self.color);
        for offset in 0..canvas.frame_count() {
            self.show(&canvas.frame(offset))?;
            sleep(self.scroll_speed);
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.show(&[Rgb565::BLACK; 64])
    }
}
