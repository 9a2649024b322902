//! V4L2 webcam source.
//!
//! Opens a local device node (e.g. /dev/video0), asks for the configured
//! resolution, and converts whatever pixel format the driver settles on to
//! RGB24. The negotiated size is what ends up in each `Frame`.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;
use std::time::{Duration, Instant};

use super::normalize::{normalize_to_rgb, strip_row_padding, PixelFormat};
use super::{FrameSource, SourceStats};
use crate::config::CaptureSettings;
use crate::frame::Frame;

/// V4L2 frame source using libv4l memory-mapped streaming.
pub struct V4l2Source {
    settings: CaptureSettings,
    state: Option<DeviceV4l2State>,
    pixel_format: PixelFormat,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
    active_width: u32,
    active_height: u32,
    /// Bytes per line reported by the driver.
    active_stride: u32,
}

#[self_referencing]
struct DeviceV4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

/// Preferred formats, in order. RGB needs no conversion.
const PREFERRED_FOURCC: [&[u8; 4]; 4] = [b"RGB3", b"YUYV", b"MJPG", b"NV12"];

impl V4l2Source {
    pub fn new(settings: CaptureSettings) -> Self {
        Self {
            active_width: settings.width,
            active_height: settings.height,
            active_stride: 0,
            settings,
            state: None,
            pixel_format: PixelFormat::Rgb24,
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
        }
    }

    fn health_grace(&self) -> Duration {
        let base_ms = if self.settings.target_fps == 0 {
            2_000
        } else {
            (1000 / self.settings.target_fps).saturating_mul(6)
        };
        Duration::from_millis(base_ms.max(2_000) as u64)
    }

    fn negotiate_format(&mut self, device: &mut v4l::Device) -> Result<()> {
        use v4l::video::Capture;

        let mut negotiated = None;
        for fourcc in PREFERRED_FOURCC {
            let mut format = device.format().context("read v4l2 format")?;
            format.width = self.settings.width;
            format.height = self.settings.height;
            format.fourcc = v4l::FourCC::new(fourcc);
            match device.set_format(&format) {
                Ok(applied) => {
                    if let Some(pixel_format) = PixelFormat::from_fourcc(&applied.fourcc.repr) {
                        negotiated = Some((applied, pixel_format));
                        break;
                    }
                }
                Err(err) => {
                    log::debug!(
                        "V4l2Source: {} rejected {:?}: {}",
                        self.settings.device,
                        std::str::from_utf8(fourcc).unwrap_or("????"),
                        err
                    );
                }
            }
        }

        let (format, pixel_format) = negotiated.ok_or_else(|| {
            anyhow!(
                "{} supports none of the pixel formats RGB3, YUYV, MJPG, NV12",
                self.settings.device
            )
        })?;

        if format.width != self.settings.width || format.height != self.settings.height {
            log::warn!(
                "V4l2Source: requested {}x{} on {}, device chose {}x{}",
                self.settings.width,
                self.settings.height,
                self.settings.device,
                format.width,
                format.height
            );
        }
        self.active_width = format.width;
        self.active_height = format.height;
        self.active_stride = format.stride;
        self.pixel_format = pixel_format;
        Ok(())
    }
}

impl FrameSource for V4l2Source {
    fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.settings.device)
            .with_context(|| format!("open v4l2 device {}", self.settings.device))?;
        self.negotiate_format(&mut device)?;

        if self.settings.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.settings.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "V4l2Source: failed to set fps on {}: {}",
                    self.settings.device,
                    err
                );
            }
        }

        self.last_error = None;

        let state = DeviceV4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()
        .map_err(|err| {
            self.last_error = Some(err.to_string());
            err
        })?;
        self.state = Some(state);

        log::info!(
            "V4l2Source: connected to {} ({}x{}, {:?})",
            self.settings.device,
            self.active_width,
            self.active_height,
            self.pixel_format
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let (width, height, format) = (self.active_width, self.active_height, self.pixel_format);
        let stride = self.active_stride;
        let pixels = state
            .with_mut(|fields| {
                fields
                    .stream
                    .next()
                    .map_err(|err| anyhow::Error::new(err).context("capture v4l2 frame"))
                    .and_then(|(buf, meta)| {
                        let used = (meta.bytesused as usize).min(buf.len());
                        let used = if used == 0 { buf.len() } else { used };
                        let packed =
                            strip_row_padding(&buf[..used], width, height, stride, format)?;
                        normalize_to_rgb(&packed, width, height, format)
                    })
            })
            .map_err(|err| {
                self.last_error = Some(err.to_string());
                err
            })?;

        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());

        Frame::from_rgb(pixels, width, height, self.frame_count).map(Some)
    }

    fn release(&mut self) {
        if self.state.take().is_some() {
            log::info!("V4l2Source: released {}", self.settings.device);
        }
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() || self.state.is_none() {
            return false;
        }
        let Some(last_frame_at) = self.last_frame_at else {
            return true;
        };
        last_frame_at.elapsed() <= self.health_grace()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.settings.device.clone(),
            width: self.active_width,
            height: self.active_height,
        }
    }
}

impl Drop for V4l2Source {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_device_fails_to_connect() {
        let mut source = V4l2Source::new(CaptureSettings {
            device: "/dev/video-does-not-exist".to_string(),
            width: 640,
            height: 480,
            target_fps: 30,
        });
        assert!(source.connect().is_err());
        assert!(!source.is_healthy());
        assert!(source.next_frame().is_err());
    }
}
