//! Audio engine state machine (spec §4.E).
//!
//! Grounded on mpdhaj's `player.rs` (opening the output device, sink
//! lifecycle) and `original_source/.../media-player/` for the
//! state-machine shape and volume/pitch/speed field ranges.

pub mod pipeline;
pub mod pitch;

use std::time::Duration;

use camino::Utf8Path;

use crate::error::{ClimpError, Result};
use crate::media::Media;
use crate::playlist::Playlist;
use pipeline::{Pipeline, RodioPipeline, volume_curve};
use pitch::PitchParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Stopped,
    Paused,
    Playing,
}

pub struct Engine {
    pipeline: Box<dyn Pipeline>,
    state: PlayState,
    volume: u8,
    mute: bool,
    params: std::sync::Arc<PitchParams>,
    active: Option<Media>,
}

impl Engine {
    pub fn open_default() -> Result<Self> {
        Ok(Engine {
            pipeline: Box::new(RodioPipeline::open_default()?),
            state: PlayState::Stopped,
            volume: 100,
            mute: false,
            params: PitchParams::new(1.0, 1.0),
            active: None,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_pipeline(pipeline: Box<dyn Pipeline>) -> Self {
        Engine {
            pipeline,
            state: PlayState::Stopped,
            volume: 100,
            mute: false,
            params: PitchParams::new(1.0, 1.0),
            active: None,
        }
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn active_media(&self) -> Option<&Media> {
        self.active.as_ref()
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn mute(&self) -> bool {
        self.mute
    }

    pub fn pitch(&self) -> f32 {
        self.params.pitch()
    }

    pub fn speed(&self) -> f32 {
        self.params.speed()
    }

    pub fn elapsed(&self) -> Duration {
        self.pipeline.elapsed()
    }

    fn apply_gain(&mut self) {
        let gain = if self.mute { 0.0 } else { volume_curve(self.volume) };
        self.pipeline.set_volume(gain);
    }

    /// `play`: resumes from `Paused`, or — mirroring the state diagram
    /// in spec §4.E — behaves like `play_next` from `Stopped`.
    pub fn play(&mut self, playlist: &mut Playlist) -> Result<()> {
        match self.state {
            PlayState::Playing => Ok(()),
            PlayState::Paused => {
                self.pipeline.resume();
                self.state = PlayState::Playing;
                Ok(())
            }
            PlayState::Stopped => self.play_next(playlist),
        }
    }

    pub fn pause(&mut self) -> Result<()> {
        if self.state == PlayState::Playing {
            self.pipeline.pause();
            self.state = PlayState::Paused;
        }
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.pipeline.stop();
        self.state = PlayState::Stopped;
        self.active = None;
        Ok(())
    }

    /// Advances the playlist and plays the resulting track, or stops
    /// if the playlist is exhausted without repeat.
    pub fn play_next(&mut self, playlist: &mut Playlist) -> Result<()> {
        if playlist.is_empty() {
            return Err(ClimpError::NoMedium);
        }
        match playlist.next() {
            Some(media) => {
                let media = media.clone();
                self.start(media)
            }
            None => {
                self.pipeline.stop();
                self.state = PlayState::Stopped;
                self.active = None;
                Ok(())
            }
        }
    }

    /// Jumps to `index`, which — unlike `Playlist::at`'s own negative-
    /// from-the-back convention — must be a non-negative in-range index
    /// here (spec §8: "negative or out-of-range index fails without
    /// changing state").
    pub fn play_track(&mut self, playlist: &mut Playlist, index: isize) -> Result<()> {
        if index < 0 {
            return Err(ClimpError::SeekRange);
        }
        let media = playlist
            .at(index)
            .cloned()
            .ok_or(ClimpError::SeekRange)?;
        playlist.set_current(index)?;
        self.start(media)
    }

    fn start(&mut self, media: Media) -> Result<()> {
        let Some(path) = media.path() else {
            return Err(ClimpError::Engine(
                "cannot play a non-local uri without an http source".into(),
            ));
        };
        self.open_path(path)?;
        self.active = Some(media);
        self.state = PlayState::Playing;
        self.apply_gain();
        Ok(())
    }

    fn open_path(&mut self, path: &Utf8Path) -> Result<()> {
        self.pipeline.play_path(path, self.params.clone())
    }

    pub fn seek(&mut self, secs: f64) -> Result<()> {
        let Some(media) = &self.active else {
            return Err(ClimpError::NoMedium);
        };
        let info = media.info();
        if !info.seekable {
            return Err(ClimpError::NotSeekable);
        }
        if secs < 0.0 || Duration::from_secs_f64(secs) >= info.duration && !info.duration.is_zero()
        {
            return Err(ClimpError::SeekRange);
        }
        self.pipeline.try_seek(Duration::from_secs_f64(secs))
    }

    pub fn set_volume(&mut self, value: i32) {
        self.volume = value.clamp(0, 100) as u8;
        self.apply_gain();
    }

    pub fn set_mute(&mut self, value: bool) {
        self.mute = value;
        self.apply_gain();
    }

    pub fn toggle_mute(&mut self) -> bool {
        self.mute = !self.mute;
        self.apply_gain();
        self.mute
    }

    pub fn set_pitch(&mut self, value: f32) {
        self.params.set_pitch(value.clamp(0.1, 10.0));
    }

    pub fn set_speed(&mut self, value: f32) {
        self.params.set_speed(value.clamp(0.1, 40.0));
    }

    /// Called from the idle loop: if the current track has run out,
    /// advances to the next one. Returns whether a transition happened.
    pub fn poll_eos(&mut self, playlist: &mut Playlist) -> Result<bool> {
        if self.state == PlayState::Playing && self.pipeline.is_empty() {
            self.play_next(playlist)?;
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakePipeline {
        empty: bool,
        playing: bool,
        last_volume: f32,
    }

    impl Pipeline for FakePipeline {
        fn play_path(&mut self, _path: &Utf8Path, _params: Arc<PitchParams>) -> Result<()> {
            self.empty = false;
            self.playing = true;
            Ok(())
        }
        fn pause(&mut self) {
            self.playing = false;
        }
        fn resume(&mut self) {
            self.playing = true;
        }
        fn stop(&mut self) {
            self.playing = false;
            self.empty = true;
        }
        fn set_volume(&mut self, gain: f32) {
            self.last_volume = gain;
        }
        fn is_empty(&self) -> bool {
            self.empty
        }
        fn try_seek(&mut self, _pos: Duration) -> Result<()> {
            Ok(())
        }
        fn elapsed(&self) -> Duration {
            Duration::ZERO
        }
    }

    fn fake_media(uri: &str) -> Media {
        Media::from_arg(&format!("https://example.invalid/{uri}")).unwrap()
    }

    #[test]
    fn play_on_empty_playlist_fails_with_no_medium() {
        let mut engine = Engine::with_pipeline(Box::new(FakePipeline::default()));
        let mut pl = Playlist::new();
        assert!(matches!(engine.play(&mut pl), Err(ClimpError::NoMedium)));
    }

    #[test]
    fn set_volume_clamps_into_range() {
        let mut engine = Engine::with_pipeline(Box::new(FakePipeline::default()));
        engine.set_volume(500);
        assert_eq!(engine.volume(), 100);
        engine.set_volume(-10);
        assert_eq!(engine.volume(), 0);
    }

    #[test]
    fn set_pitch_and_speed_clamp_into_range() {
        let mut engine = Engine::with_pipeline(Box::new(FakePipeline::default()));
        engine.set_pitch(99.0);
        assert_eq!(engine.pitch(), 10.0);
        engine.set_speed(0.0001);
        assert_eq!(engine.speed(), 0.1);
    }

    #[test]
    fn toggle_mute_flips_state() {
        let mut engine = Engine::with_pipeline(Box::new(FakePipeline::default()));
        assert!(engine.toggle_mute());
        assert!(!engine.toggle_mute());
    }

    #[test]
    fn seek_without_active_media_fails() {
        let mut engine = Engine::with_pipeline(Box::new(FakePipeline::default()));
        assert!(matches!(engine.seek(1.0), Err(ClimpError::NoMedium)));
    }
}
