//! Independent pitch/tempo control (spec §4.E's "pitch-shift+tempo"
//! pipeline stage — the original's gstreamer `pitch` element, backed by
//! SoundTouch). Grounded on `rubato`'s resampling for the pitch change
//! and a fixed-hop overlap-add for the tempo correction, since rodio
//! has no SoundTouch-equivalent element of its own.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use rodio::Source;
use rubato::{FftFixedIn, Resampler};

/// Shared, atomically-updated pitch/speed, so a running `PitchTempo`
/// source reacts to `set_pitch`/`set_speed` without restarting playback.
#[derive(Debug)]
pub struct PitchParams {
    pitch: AtomicU32,
    speed: AtomicU32,
}

impl PitchParams {
    pub fn new(pitch: f32, speed: f32) -> Arc<Self> {
        Arc::new(PitchParams {
            pitch: AtomicU32::new(pitch.to_bits()),
            speed: AtomicU32::new(speed.to_bits()),
        })
    }

    pub fn pitch(&self) -> f32 {
        f32::from_bits(self.pitch.load(Ordering::Relaxed))
    }

    pub fn speed(&self) -> f32 {
        f32::from_bits(self.speed.load(Ordering::Relaxed))
    }

    pub fn set_pitch(&self, value: f32) {
        self.pitch.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn set_speed(&self, value: f32) {
        self.speed.store(value.to_bits(), Ordering::Relaxed);
    }
}

const CHUNK: usize = 1024;
const WINDOW: usize = 512;

/// Wraps a mono or interleaved `f32` source, resampling by `pitch` and
/// then overlap-adding at a hop ratio of `speed / pitch` to bring the
/// tempo back to `speed` without undoing the pitch shift.
pub struct PitchTempo<S: Source<Item = f32>> {
    inner: S,
    params: Arc<PitchParams>,
    channels: u16,
    sample_rate: u32,
    resampler: FftFixedIn<f32>,
    in_buf: Vec<Vec<f32>>,
    out_buf: Vec<Vec<f32>>,
    ola: Vec<f32>,
    ola_pos: usize,
    drained: bool,
}

impl<S: Source<Item = f32>> PitchTempo<S> {
    pub fn new(inner: S, params: Arc<PitchParams>) -> Self {
        let channels = inner.channels();
        let sample_rate = inner.sample_rate();
        let resampler = FftFixedIn::<f32>::new(
            sample_rate as usize,
            sample_rate as usize,
            CHUNK,
            2,
            channels as usize,
        )
        .expect("fixed chunk size resampler configuration is always valid");

        let in_buf = vec![Vec::with_capacity(CHUNK); channels as usize];
        let out_buf = resampler.output_buffer_allocate(true);

        PitchTempo {
            inner,
            params,
            channels,
            sample_rate,
            resampler,
            in_buf,
            out_buf,
            ola: Vec::new(),
            ola_pos: 0,
            drained: false,
        }
    }

    fn refill(&mut self) -> bool {
        self.in_buf.iter_mut().for_each(Vec::clear);

        let mut filled = 0;
        'outer: while filled < CHUNK {
            for ch in 0..self.channels as usize {
                match self.inner.next() {
                    Some(sample) => self.in_buf[ch].push(sample),
                    None => break 'outer,
                }
            }
            filled += 1;
        }

        if filled == 0 {
            return false;
        }
        for ch in self.in_buf.iter_mut() {
            ch.resize(CHUNK, 0.0);
        }

        let pitch = self.params.pitch().clamp(0.1, 10.0);
        self.resampler
            .set_resample_ratio(pitch as f64, true)
            .ok();

        let (_, out_frames) = self
            .resampler
            .process_into_buffer(&self.in_buf, &mut self.out_buf, None)
            .unwrap_or((0, 0));

        let speed = self.params.speed().clamp(0.1, 40.0);
        let tempo_ratio = (speed / pitch).clamp(0.025, 400.0);
        self.ola = overlap_add_stretch(&self.out_buf, out_frames, self.channels as usize, tempo_ratio);
        self.ola_pos = 0;

        filled >= CHUNK
    }
}

/// Resamples `frames` of interleaved-by-channel `buf` to roughly
/// `frames * ratio` frames using a Hann-windowed overlap-add, changing
/// duration without touching pitch (already fixed by the resampler
/// stage above).
fn overlap_add_stretch(buf: &[Vec<f32>], frames: usize, channels: usize, ratio: f32) -> Vec<f32> {
    if frames == 0 || ratio <= 0.0 {
        return Vec::new();
    }

    let hop_out = (WINDOW as f32 / 2.0).max(1.0) as usize;
    let hop_in = ((hop_out as f32) / ratio).max(1.0) as usize;
    let out_frames = ((frames as f32) * ratio) as usize;

    let mut out = vec![0.0f32; out_frames.max(1) * channels];
    let mut weight = vec![0.0f32; out_frames.max(1)];

    let mut in_pos = 0usize;
    let mut out_pos = 0usize;
    while in_pos < frames && out_pos < out_frames {
        let len = WINDOW.min(frames - in_pos);
        for i in 0..len {
            if out_pos + i >= out_frames {
                break;
            }
            let w = 0.5 - 0.5 * (std::f32::consts::TAU * i as f32 / WINDOW as f32).cos();
            for ch in 0..channels {
                out[(out_pos + i) * channels + ch] += buf[ch][in_pos + i] * w;
            }
            weight[out_pos + i] += w;
        }
        in_pos += hop_in;
        out_pos += hop_out;
    }

    for (frame_idx, w) in weight.iter().enumerate() {
        if *w > 1e-6 {
            for ch in 0..channels {
                out[frame_idx * channels + ch] /= w;
            }
        }
    }

    out
}

impl<S: Source<Item = f32>> Iterator for PitchTempo<S> {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        loop {
            if self.ola_pos < self.ola.len() {
                let sample = self.ola[self.ola_pos];
                self.ola_pos += 1;
                return Some(sample);
            }
            if self.drained {
                return None;
            }
            if !self.refill() {
                self.drained = true;
                if self.ola_pos < self.ola.len() {
                    continue;
                }
                return None;
            }
        }
    }
}

impl<S: Source<Item = f32>> Source for PitchTempo<S> {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<std::time::Duration> {
        None
    }
}
