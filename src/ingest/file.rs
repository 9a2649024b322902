//! Local video file source using FFmpeg.
//!
//! Decodes the best video track of a local file to RGB24 frames. The end of
//! the file is reported as end of stream (`Ok(None)`), not as an error.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use std::time::{Duration, Instant};

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

pub struct FileSource {
    path: String,
    target_fps: u32,
    input: Option<ffmpeg::format::context::Input>,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    finished: bool,
    last_error: Option<String>,
}

impl FileSource {
    pub fn new(path: String, target_fps: u32) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open video file '{}' with ffmpeg", path))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("file has no video track"))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        Ok(Self {
            path,
            target_fps,
            input: Some(input),
            stream_index,
            decoder,
            scaler,
            frame_count: 0,
            last_frame_at: None,
            finished: false,
            last_error: None,
        })
    }

    fn health_grace(&self) -> Duration {
        let base_ms = if self.target_fps == 0 {
            2_000
        } else {
            (1000 / self.target_fps).saturating_mul(6)
        };
        Duration::from_millis(base_ms.max(2_000) as u64)
    }

    fn emit(&mut self, rgb_frame: &ffmpeg::frame::Video) -> Result<Frame> {
        let (pixels, width, height) = frame_to_pixels(rgb_frame)?;
        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Frame::from_rgb(pixels, width, height, self.frame_count)
    }
}

impl FrameSource for FileSource {
    fn connect(&mut self) -> Result<()> {
        log::info!(
            "FileSource: opened {} ({}x{})",
            self.path,
            self.decoder.width(),
            self.decoder.height()
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }
        let mut decoded = ffmpeg::frame::Video::empty();
        let mut rgb_frame = ffmpeg::frame::Video::empty();

        // Frames still buffered in the decoder from an earlier packet.
        let mut got_frame = self.decoder.receive_frame(&mut decoded).is_ok();

        if !got_frame {
            let input = self.input.as_mut().context("video file released")?;
            for (stream, packet) in input.packets() {
                if stream.index() != self.stream_index {
                    continue;
                }
                if let Err(err) = self.decoder.send_packet(&packet) {
                    self.last_error = Some(err.to_string());
                    return Err(anyhow::Error::new(err).context("send packet to ffmpeg decoder"));
                }
                if self.decoder.receive_frame(&mut decoded).is_ok() {
                    got_frame = true;
                    break;
                }
            }
        }

        // Flush whatever the decoder still holds.
        if !got_frame {
            got_frame =
                self.decoder.send_eof().is_ok() && self.decoder.receive_frame(&mut decoded).is_ok();
        }

        if got_frame {
            self.scaler
                .run(&decoded, &mut rgb_frame)
                .context("scale frame to RGB")?;
            return self.emit(&rgb_frame).map(Some);
        }

        self.finished = true;
        log::info!(
            "FileSource: end of {} after {} frames",
            self.path,
            self.frame_count
        );
        Ok(None)
    }

    fn release(&mut self) {
        if self.input.take().is_some() {
            log::info!("FileSource: released {}", self.path);
        }
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() || self.input.is_none() {
            return false;
        }
        let Some(last_frame_at) = self.last_frame_at else {
            return true;
        };
        self.finished || last_frame_at.elapsed() <= self.health_grace()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.path.clone(),
            width: self.decoder.width(),
            height: self.decoder.height(),
        }
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0) as usize;
    let data = frame.data(0);

    if stride == row_bytes {
        let packed = data
            .get(..row_bytes * height as usize)
            .context("ffmpeg frame is shorter than its dimensions")?;
        return Ok((packed.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_fails_to_open() {
        assert!(FileSource::new("/nonexistent/clip.mp4".to_string(), 30).is_err());
    }
}
