//! Frequency-domain analyser tap so the meter reflects live capture energy.
//!
//! The capture callback pushes samples into a fixed ring; the UI tick pulls a
//! magnitude snapshot and projects it onto a fixed bar set. Best-effort and
//! lossy on purpose: dropped frames are harmless, most recent window wins.

use std::sync::{Arc, Mutex};

use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Analysis window length. Must be a power of two for the FFT plan.
pub const FFT_SIZE: usize = 256;

/// Magnitude bins per snapshot (half the window, DC upward).
pub const BIN_COUNT: usize = FFT_SIZE / 2;

/// Bars the meter projects each snapshot onto.
pub const BAR_COUNT: usize = 20;

/// Minimum bar height in meter units, so idle bars stay visible.
pub const BAR_FLOOR: u8 = 3;

// Byte magnitudes span this dB window, quiet to loud.
const MIN_DB: f32 = -100.0;
const MAX_DB: f32 = -30.0;

struct TapState {
    ring: [f32; FFT_SIZE],
    pos: usize,
    closed: bool,
}

struct Shared {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    state: Mutex<TapState>,
}

/// Shared handle between the capture callback (producer) and the UI tick
/// (consumer). `close()` latches the tap shut before the device stream is
/// torn down, so a late tick observes `None` instead of a released stream.
#[derive(Clone)]
pub struct SpectrumAnalyser {
    shared: Arc<Shared>,
}

impl SpectrumAnalyser {
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);
        let window = (0..FFT_SIZE)
            .map(|i| {
                0.5 * (1.0
                    - (2.0 * std::f32::consts::PI * i as f32 / (FFT_SIZE - 1) as f32).cos())
            })
            .collect();
        Self {
            shared: Arc::new(Shared {
                fft,
                window,
                state: Mutex::new(TapState {
                    ring: [0.0; FFT_SIZE],
                    pos: 0,
                    closed: false,
                }),
            }),
        }
    }

    /// Feed mono samples from the capture callback. No-op once closed.
    pub fn push_samples(&self, samples: &[f32]) {
        let Ok(mut state) = self.shared.state.lock() else {
            return;
        };
        if state.closed {
            return;
        }
        for &sample in samples {
            let pos = state.pos;
            state.ring[pos] = sample;
            state.pos = (pos + 1) % FFT_SIZE;
        }
    }

    /// Latch the tap shut. Called before the capture stream is released.
    pub fn close(&self) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.closed = true;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared
            .state
            .lock()
            .map(|state| state.closed)
            .unwrap_or(true)
    }

    /// Current frequency-domain snapshot as magnitude bytes, oldest-first
    /// window. `None` once the tap is closed.
    pub fn snapshot(&self) -> Option<[u8; BIN_COUNT]> {
        let mut buffer = [0.0f32; FFT_SIZE];
        {
            let state = self.shared.state.lock().ok()?;
            if state.closed {
                return None;
            }
            // ring[pos..] holds the oldest samples, ring[..pos] the newest.
            let (newer, older) = state.ring.split_at(state.pos);
            buffer[..older.len()].copy_from_slice(older);
            buffer[older.len()..].copy_from_slice(newer);
        }

        let mut spectrum: Vec<Complex<f32>> = buffer
            .iter()
            .zip(&self.shared.window)
            .map(|(&sample, &w)| Complex::new(sample * w, 0.0))
            .collect();
        self.shared.fft.process(&mut spectrum);

        let mut bins = [0u8; BIN_COUNT];
        let scale = 2.0 / FFT_SIZE as f32;
        for (bin, value) in bins.iter_mut().zip(&spectrum[..BIN_COUNT]) {
            let magnitude = value.norm() * scale;
            let db = 20.0 * magnitude.max(1e-12).log10();
            let normalized = ((db - MIN_DB) / (MAX_DB - MIN_DB)).clamp(0.0, 1.0);
            *bin = (normalized * 255.0) as u8;
        }
        Some(bins)
    }
}

impl Default for SpectrumAnalyser {
    fn default() -> Self {
        Self::new()
    }
}

/// Project a magnitude snapshot onto exactly [`BAR_COUNT`] bar heights by
/// fixed-stride downsampling, clamped to the visibility floor.
pub fn bar_heights(snapshot: &[u8; BIN_COUNT]) -> [u8; BAR_COUNT] {
    let stride = BIN_COUNT / BAR_COUNT;
    let mut bars = [BAR_FLOOR; BAR_COUNT];
    for (i, bar) in bars.iter_mut().enumerate() {
        *bar = (snapshot[i * stride] / 6).max(BAR_FLOOR);
    }
    bars
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_sine(analyser: &SpectrumAnalyser, bin: usize, amplitude: f32) {
        let samples: Vec<f32> = (0..FFT_SIZE)
            .map(|i| {
                let angle = 2.0 * std::f32::consts::PI * bin as f32 * i as f32 / FFT_SIZE as f32;
                amplitude * angle.sin()
            })
            .collect();
        analyser.push_samples(&samples);
    }

    #[test]
    fn snapshot_has_fixed_bin_count() {
        let analyser = SpectrumAnalyser::new();
        let snapshot = analyser.snapshot().expect("open tap");
        assert_eq!(snapshot.len(), BIN_COUNT);
    }

    #[test]
    fn closed_tap_returns_no_snapshot() {
        let analyser = SpectrumAnalyser::new();
        analyser.close();
        assert!(analyser.snapshot().is_none());
        assert!(analyser.is_closed());
    }

    #[test]
    fn close_is_visible_through_clones() {
        let analyser = SpectrumAnalyser::new();
        let handle = analyser.clone();
        analyser.close();
        assert!(handle.snapshot().is_none());
    }

    #[test]
    fn push_after_close_is_a_no_op() {
        let analyser = SpectrumAnalyser::new();
        analyser.close();
        analyser.push_samples(&[1.0; 64]);
        assert!(analyser.snapshot().is_none());
    }

    #[test]
    fn tone_concentrates_energy_in_its_bin() {
        let analyser = SpectrumAnalyser::new();
        feed_sine(&analyser, 10, 0.8);
        let snapshot = analyser.snapshot().expect("open tap");
        assert!(snapshot[10] > snapshot[40]);
        assert!(snapshot[10] > snapshot[70]);
    }

    #[test]
    fn silence_projects_floor_bars() {
        let analyser = SpectrumAnalyser::new();
        let snapshot = analyser.snapshot().expect("open tap");
        let bars = bar_heights(&snapshot);
        assert!(bars.iter().all(|&b| b == BAR_FLOOR));
    }

    #[test]
    fn loud_tone_lifts_the_matching_bar() {
        let analyser = SpectrumAnalyser::new();
        feed_sine(&analyser, 12, 0.9);
        let snapshot = analyser.snapshot().expect("open tap");
        let bars = bar_heights(&snapshot);
        // Bin 12 lands in bar 2 with a stride of BIN_COUNT / BAR_COUNT = 6.
        assert!(bars[2] > BAR_FLOOR);
    }

    #[test]
    fn bar_projection_is_fixed_width() {
        let snapshot = [255u8; BIN_COUNT];
        let bars = bar_heights(&snapshot);
        assert_eq!(bars.len(), BAR_COUNT);
        assert!(bars.iter().all(|&b| b == 255 / 6));
    }

    #[test]
    fn ring_keeps_most_recent_window() {
        let analyser = SpectrumAnalyser::new();
        // Flood with a loud tone, then overwrite the whole window with silence.
        feed_sine(&analyser, 10, 0.9);
        analyser.push_samples(&[0.0; FFT_SIZE]);
        let snapshot = analyser.snapshot().expect("open tap");
        assert!(bar_heights(&snapshot).iter().all(|&b| b == BAR_FLOOR));
    }
}
