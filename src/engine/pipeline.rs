//! Pipeline construction and the volume curve (spec §4.E).
//!
//! Grounded on mpdhaj's `player.rs` for opening an output stream and
//! appending a decoded source to a sink; the `decodebin → convert →
//! pitch-shift+tempo → volume → sink` topology from spec §4.E is built
//! here as a straight chain of `rodio` combinators, since rodio has no
//! GStreamer-style dynamic pad linking of its own — `Decoder` already
//! only exposes raw PCM frames, so the "link only on raw audio caps"
//! rule has no separate step to perform.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use camino::Utf8Path;
use rodio::{Decoder, Sink, Source};

use crate::engine::pitch::{PitchParams, PitchTempo};
use crate::error::{ClimpError, Result};

/// Maps the internal `[0,100]` volume to the linear gain `rodio::Sink`
/// expects, per spec's `g(v) = (101 − 50·log10(101 − v)) / 101`.
pub fn volume_curve(v: u8) -> f32 {
    let v = v.clamp(0, 100) as f64;
    (101.0 - 50.0 * (101.0 - v).log10()) / 101.0
}

/// Trait seam so the engine's state machine can be exercised without a
/// real audio device (tests substitute a no-op pipeline).
pub trait Pipeline: Send {
    fn play_path(&mut self, path: &Utf8Path, params: Arc<PitchParams>) -> Result<()>;
    fn pause(&mut self);
    fn resume(&mut self);
    fn stop(&mut self);
    fn set_volume(&mut self, gain: f32);
    fn is_empty(&self) -> bool;
    fn try_seek(&mut self, pos: std::time::Duration) -> Result<()>;
    fn elapsed(&self) -> std::time::Duration;
}

pub struct RodioPipeline {
    _stream: rodio::OutputStream,
    handle: rodio::OutputStreamHandle,
    sink: Option<Sink>,
}

impl RodioPipeline {
    pub fn open_default() -> Result<Self> {
        let (stream, handle) = rodio::OutputStream::try_default()
            .map_err(|e| ClimpError::Engine(e.to_string()))?;
        Ok(RodioPipeline {
            _stream: stream,
            handle,
            sink: None,
        })
    }
}

impl Pipeline for RodioPipeline {
    fn play_path(&mut self, path: &Utf8Path, params: Arc<PitchParams>) -> Result<()> {
        let file =
            BufReader::new(File::open(path).map_err(ClimpError::from)?);
        let decoder = Decoder::new(file).map_err(|e| ClimpError::Engine(e.to_string()))?;
        let source = PitchTempo::new(decoder.convert_samples::<f32>(), params);

        let sink = Sink::try_new(&self.handle).map_err(|e| ClimpError::Engine(e.to_string()))?;
        sink.append(source);
        self.sink = Some(sink);
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(sink) = &self.sink {
            sink.pause();
        }
    }

    fn resume(&mut self) {
        if let Some(sink) = &self.sink {
            sink.play();
        }
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }

    fn set_volume(&mut self, gain: f32) {
        if let Some(sink) = &self.sink {
            sink.set_volume(gain);
        }
    }

    fn is_empty(&self) -> bool {
        self.sink.as_ref().is_none_or(Sink::empty)
    }

    fn try_seek(&mut self, pos: std::time::Duration) -> Result<()> {
        let Some(sink) = &self.sink else {
            return Err(ClimpError::NoMedium);
        };
        sink.try_seek(pos).map_err(|_| ClimpError::NotSeekable)
    }

    fn elapsed(&self) -> std::time::Duration {
        self.sink
            .as_ref()
            .map(Sink::get_pos)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_zero_is_near_silent() {
        assert!(volume_curve(0) < 0.1);
    }

    #[test]
    fn volume_hundred_is_unity() {
        assert!((volume_curve(100) - 1.0).abs() < 0.05);
    }

    #[test]
    fn volume_curve_is_monotonic() {
        let samples: Vec<f32> = (0..=100).map(volume_curve).collect();
        assert!(samples.windows(2).all(|w| w[0] <= w[1]));
    }
}
