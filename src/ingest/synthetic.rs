//! Synthetic frame source (`stub://name[?frames=N]`).
//!
//! Paints a slowly scrolling gradient with solid blocks where the demo
//! detector reports objects. With `frames=N` the stream ends after N frames,
//! which exercises the end-of-stream path.

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};

use super::{FrameSource, SourceStats};
use crate::config::CaptureSettings;
use crate::detect::DEMO_SCENE;
use crate::frame::Frame;

pub struct SyntheticSource {
    settings: CaptureSettings,
    frame_limit: Option<u64>,
    frame_count: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(settings: CaptureSettings) -> Result<Self> {
        let frame_limit = parse_frame_limit(&settings.device)?;
        Ok(Self {
            settings,
            frame_limit,
            frame_count: 0,
            connected: false,
        })
    }

    fn render(&self) -> RgbImage {
        let (width, height) = (self.settings.width, self.settings.height);
        let shift = self.frame_count as u32;
        let mut image = RgbImage::from_fn(width, height, |x, y| {
            Rgb([
                ((x + shift) % 256) as u8,
                ((y + shift / 2) % 256) as u8,
                96,
            ])
        });

        for (_, _, [l, t, r, b]) in DEMO_SCENE.iter() {
            let x0 = (l * width as f32) as u32;
            let y0 = (t * height as f32) as u32;
            let x1 = ((r * width as f32) as u32).min(width);
            let y1 = ((b * height as f32) as u32).min(height);
            for y in y0..y1 {
                for x in x0..x1 {
                    image.put_pixel(x, y, Rgb([220, 220, 220]));
                }
            }
        }
        image
    }
}

fn parse_frame_limit(device: &str) -> Result<Option<u64>> {
    let Some((_, query)) = device.split_once('?') else {
        return Ok(None);
    };
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("frames=") {
            let limit = value
                .parse::<u64>()
                .map_err(|_| anyhow!("invalid frame limit '{}' in {}", value, device))?;
            return Ok(Some(limit));
        }
    }
    Ok(None)
}

impl FrameSource for SyntheticSource {
    /// Synthetic sources are always "connected".
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!(
            "SyntheticSource: connected to {} ({}x{})",
            self.settings.device,
            self.settings.width,
            self.settings.height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if !self.connected {
            return Err(anyhow!("synthetic source {} not connected", self.settings.device));
        }
        if self
            .frame_limit
            .is_some_and(|limit| self.frame_count >= limit)
        {
            return Ok(None);
        }
        let image = self.render();
        self.frame_count += 1;
        Ok(Some(Frame::new(image, self.frame_count)))
    }

    fn release(&mut self) {
        if self.connected {
            log::info!("SyntheticSource: released {}", self.settings.device);
        }
        self.connected = false;
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.settings.device.clone(),
            width: self.settings.width,
            height: self.settings.height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(device: &str) -> CaptureSettings {
        CaptureSettings {
            device: device.to_string(),
            width: 320,
            height: 240,
            target_fps: 0,
        }
    }

    #[test]
    fn synthetic_source_produces_frames() -> Result<()> {
        let mut source = SyntheticSource::new(settings("stub://test"))?;
        source.connect()?;

        let frame = source.next_frame()?.expect("frame");
        assert_eq!(frame.width(), 320);
        assert_eq!(frame.height(), 240);
        assert_eq!(frame.sequence, 1);
        // first demo block is painted solid
        assert_eq!(*frame.image().get_pixel(20, 20), Rgb([220, 220, 220]));
        Ok(())
    }

    #[test]
    fn frame_limit_ends_stream() -> Result<()> {
        let mut source = SyntheticSource::new(settings("stub://test?frames=2"))?;
        source.connect()?;

        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_none());
        assert_eq!(source.stats().frames_captured, 2);
        Ok(())
    }

    #[test]
    fn invalid_frame_limit_is_rejected() {
        assert!(SyntheticSource::new(settings("stub://test?frames=many")).is_err());
    }

    #[test]
    fn released_source_stops_producing() -> Result<()> {
        let mut source = SyntheticSource::new(settings("stub://test"))?;
        source.connect()?;
        source.release();
        source.release();
        assert!(!source.is_healthy());
        assert!(source.next_frame().is_err());
        Ok(())
    }
}
