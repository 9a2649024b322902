//! On-screen display through `minifb`.

use anyhow::{anyhow, Result};
use minifb::{Key, Window, WindowOptions};

use super::FrameSink;
use crate::frame::Frame;

/// Roughly the 30 ms key poll of a classic `waitKey(30)` loop.
const TARGET_FPS: usize = 33;

/// Window sink. The window is created on the first frame so it matches the
/// negotiated capture size. ESC or closing the window requests a stop.
pub struct WindowSink {
    title: String,
    window: Option<Window>,
    buffer: Vec<u32>,
}

impl WindowSink {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            window: None,
            buffer: Vec::new(),
        }
    }

    fn window_for(&mut self, width: usize, height: usize) -> Result<&mut Window> {
        if self.window.is_none() {
            let mut window = Window::new(&self.title, width, height, WindowOptions::default())
                .map_err(|e| anyhow!("failed to open display window: {}", e))?;
            window.set_target_fps(TARGET_FPS);
            log::info!("display window opened ({}x{})", width, height);
            self.window = Some(window);
        }
        self.window
            .as_mut()
            .ok_or_else(|| anyhow!("display window missing"))
    }
}

/// Pack RGB24 into minifb's `0RGB` words.
fn pack_rgb(pixels: &[u8], out: &mut Vec<u32>) {
    out.clear();
    out.extend(
        pixels
            .chunks_exact(3)
            .map(|p| ((p[0] as u32) << 16) | ((p[1] as u32) << 8) | p[2] as u32),
    );
}

impl FrameSink for WindowSink {
    fn show(&mut self, frame: &Frame) -> Result<()> {
        let (width, height) = (frame.width() as usize, frame.height() as usize);
        let mut buffer = std::mem::take(&mut self.buffer);
        pack_rgb(frame.pixels(), &mut buffer);
        let result = self
            .window_for(width, height)?
            .update_with_buffer(&buffer, width, height)
            .map_err(|e| anyhow!("failed to update display window: {}", e));
        self.buffer = buffer;
        result
    }

    fn stop_requested(&mut self) -> bool {
        match &self.window {
            Some(window) => !window.is_open() || window.is_key_down(Key::Escape),
            None => false,
        }
    }
}

impl Drop for WindowSink {
    fn drop(&mut self) {
        if self.window.take().is_some() {
            log::info!("display window closed");
        }
    }
}
