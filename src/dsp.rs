/*
 *  Copyright (C) 2025 Michael Bachmann
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU Affero General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU Affero General Public License for more details.
 *
 *  You should have received a copy of the GNU Affero General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Frequency-domain peak picking (C4). Windows the PCM, FFTs it with
//! `rustfft`, and keeps a magnitude-keyed ordered map of frequency per
//! channel, dropping magnitude collisions with `try_insert` semantics
//! (loser discarded rather than overwriting).

use ordered_float::OrderedFloat;
use rustfft::{FftPlanner, num_complex::Complex32};
use std::collections::BTreeMap;

pub const CHANNELS: usize = 2;

/// Default magnitude floor/ceiling and floor-widening factor for
/// [`Peaks::interpolate`]'s brightness curve.
const PEAK_FLOOR: f32 = 36_400.0;
const PEAK_CEILING: f32 = 2_100_000.0;
const PEAK_FACTOR: f32 = 2.41;

/// Log10 magnitude scale, floored at 1.0 so quiet-but-nonzero magnitudes
/// don't go negative.
fn scale_val(m: f32) -> f32 {
    m.max(1.0).log10()
}

/// Magnitude → frequency (Hz), one map per channel. `BTreeMap` gives
/// ordered iteration by magnitude; insertion uses `try_insert` semantics
/// so a magnitude collision keeps whichever frequency claimed the key
/// first.
#[derive(Debug, Clone, Default)]
pub struct Peaks {
    pub channels: [BTreeMap<OrderedFloat<f32>, f32>; CHANNELS],
}

impl Peaks {
    pub fn empty() -> Self {
        Peaks::default()
    }

    fn emplace(&mut self, channel: usize, magnitude: f32, frequency: f32) {
        self.channels[channel]
            .entry(OrderedFloat(magnitude))
            .or_insert(frequency);
    }

    /// The loudest peak across both channels, if any survived filtering.
    pub fn major_peak(&self) -> Option<(f32, f32)> {
        self.channels
            .iter()
            .filter_map(|m| m.iter().next_back())
            .max_by(|a, b| a.0.cmp(b.0))
            .map(|(mag, freq)| (mag.0, *freq))
    }

    pub fn is_silent(&self) -> bool {
        self.channels.iter().all(|m| m.is_empty())
    }

    /// Maps a raw FFT magnitude to a brightness fraction in `[0, 1]`,
    /// log-scaled between a floor widened by `PEAK_FACTOR` and the raw
    /// ceiling.
    pub fn interpolate(magnitude: f32) -> f32 {
        let floor = scale_val(PEAK_FLOOR * PEAK_FACTOR);
        let ceiling = scale_val(PEAK_CEILING);
        ((scale_val(magnitude) - floor) / (ceiling - floor)).clamp(0.0, 1.0)
    }
}

/// Smallest power of two ≥ `n`.
fn next_pow2(n: usize) -> usize {
    n.next_power_of_two()
}

/// Runs an FFT-based peak pick over interleaved S16LE stereo PCM,
/// keeping only peaks whose magnitude falls in `[floor, ceiling]`.
pub fn analyze(pcm_s16le: &[u8], sample_rate: u32, floor: f32, ceiling: f32) -> Peaks {
    let samples_per_channel = pcm_s16le.len() / 2 / CHANNELS;
    let fft_len = next_pow2(samples_per_channel.max(1));

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(fft_len);

    let mut peaks = Peaks::empty();

    for (ch, peaks_for_channel) in (0..CHANNELS).zip(peaks.channels.iter_mut()) {
        let mut buf: Vec<Complex32> = (0..fft_len)
            .map(|i| {
                if i >= samples_per_channel {
                    return Complex32::new(0.0, 0.0);
                }
                let sample_index = i * CHANNELS + ch;
                let byte_index = sample_index * 2;
                let raw =
                    i16::from_le_bytes([pcm_s16le[byte_index], pcm_s16le[byte_index + 1]]) as f32;
                // Hann window.
                let w = 0.5
                    - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / (fft_len - 1).max(1) as f32).cos();
                Complex32::new(raw * w / i16::MAX as f32, 0.0)
            })
            .collect();

        fft.process(&mut buf);

        let bin_hz = sample_rate as f32 / fft_len as f32;
        for (bin, value) in buf.iter().take(fft_len / 2).enumerate() {
            let magnitude = value.norm();
            if magnitude < floor || magnitude > ceiling {
                continue;
            }
            let frequency = bin as f32 * bin_hz;
            peaks_for_channel
                .entry(OrderedFloat(magnitude))
                .or_insert(frequency);
        }
    }

    peaks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_pcm(freq: f32, sample_rate: u32, n_frames: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(n_frames * CHANNELS * 2);
        for i in 0..n_frames {
            let t = i as f32 / sample_rate as f32;
            let sample = (std::f32::consts::TAU * freq * t).sin() * 10000.0;
            let s = sample as i16;
            for _ in 0..CHANNELS {
                out.extend_from_slice(&s.to_le_bytes());
            }
        }
        out
    }

    #[test]
    fn silence_yields_no_peaks_above_floor() {
        let pcm = vec![0u8; 352 * CHANNELS * 2];
        let peaks = analyze(&pcm, 44_100, 2.1, 32.0);
        assert!(peaks.is_silent());
    }

    #[test]
    fn peaks_outside_range_are_filtered_out() {
        let pcm = sine_pcm(1000.0, 44_100, 512);
        // A ceiling of 0 admits nothing.
        let peaks = analyze(&pcm, 44_100, 0.0, 0.0);
        assert!(peaks.is_silent());
    }

    #[test]
    fn emplace_drops_magnitude_collisions() {
        let mut peaks = Peaks::empty();
        peaks.emplace(0, 5.0, 100.0);
        peaks.emplace(0, 5.0, 200.0);
        assert_eq!(peaks.channels[0].get(&OrderedFloat(5.0)), Some(&100.0));
    }

    #[test]
    fn interpolate_clamps_outside_the_scaled_range() {
        assert_eq!(Peaks::interpolate(1.0), 0.0);
        assert_eq!(Peaks::interpolate(PEAK_CEILING * 10.0), 1.0);
    }

    #[test]
    fn interpolate_is_monotonic_in_magnitude() {
        let low = Peaks::interpolate(100_000.0);
        let high = Peaks::interpolate(1_000_000.0);
        assert!(high > low);
    }

    #[test]
    fn major_peak_picks_loudest_across_channels() {
        let mut peaks = Peaks::empty();
        peaks.emplace(0, 3.0, 50.0);
        peaks.emplace(1, 9.0, 440.0);
        assert_eq!(peaks.major_peak(), Some((9.0, 440.0)));
    }
}
