use crate::error::Error;
use crate::ppu::{FRAME_HEIGHT, FRAME_WIDTH};
use minifb::{Key, Window, WindowOptions};

/// What the event pump wants the emulation loop to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Shutdown,
}

/// Presentation port: the emulator core renders into a loaned frame and
/// never talks to the windowing layer directly. Teardown is Drop.
pub trait Screen {
    /// Pump events, non-blocking.
    fn poll(&mut self) -> Control;

    /// Writable view of the frame to be presented, FRAME_WIDTH *
    /// FRAME_HEIGHT 0RGB pixels. Held only for the duration of one paint.
    fn frame(&mut self) -> &mut [u32];

    /// Commit and present the frame filled since the last call.
    fn present(&mut self) -> Result<(), Error>;
}

/// A minifb-backed screen at the rasterizer's fixed 4x scale.
pub struct MinifbScreen {
    window: Window,
    buffer: Vec<u32>,
}

impl MinifbScreen {
    pub fn open(title: &str) -> Result<Self, Error> {
        let window = Window::new(
            title,
            FRAME_WIDTH,
            FRAME_HEIGHT,
            WindowOptions::default(),
        )?;
        Ok(Self {
            window,
            buffer: vec![0u32; FRAME_WIDTH * FRAME_HEIGHT],
        })
    }
}

impl Screen for MinifbScreen {
    fn poll(&mut self) -> Control {
        if !self.window.is_open() || self.window.is_key_down(Key::Escape) {
            Control::Shutdown
        } else {
            Control::Continue
        }
    }

    fn frame(&mut self) -> &mut [u32] {
        &mut self.buffer
    }

    fn present(&mut self) -> Result<(), Error> {
        self.window
            .update_with_buffer(&self.buffer, FRAME_WIDTH, FRAME_HEIGHT)?;
        Ok(())
    }
}
