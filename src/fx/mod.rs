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

//! FX + Units (C11). An active FX is one of `{MajorPeak, Leave,
//! Silence, AllStop}`; each owns zero or more [`fader::Fader`]s and
//! writes per-unit state that [`units::Units`] then serializes into a
//! [`units::DataMsg`].

pub mod fader;

use crate::{
    dsp::Peaks,
    units::{Color, Units},
};
use fader::{Easing, Fader};
use std::time::{Duration, Instant};
use tracing::info;

/// The active light-effect strategy, as a tagged enum rather than a
/// class hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FxKind {
    MajorPeak,
    Leave,
    Silence,
    AllStop,
}

/// Drives fixture state for the current tick and owns the transition
/// timers between FX kinds.
pub struct FxEngine {
    kind: FxKind,
    last_peak_at: Instant,
    entered_at: Instant,
    leave_fader: Option<Fader>,
    started: bool,
}

impl FxEngine {
    pub fn new() -> Self {
        let now = Instant::now();
        FxEngine {
            kind: FxKind::MajorPeak,
            last_peak_at: now,
            entered_at: now,
            leave_fader: None,
            started: false,
        }
    }

    pub fn kind(&self) -> FxKind {
        self.kind
    }

    fn transition(&mut self, kind: FxKind, now: Instant) {
        if self.kind != kind {
            info!(from = ?self.kind, to = ?kind, "FX transition");
            self.kind = kind;
            self.entered_at = now;
            if kind == FxKind::Leave {
                self.leave_fader = Some(Fader::new(Easing::OutSine, 1.0, 0.0, Duration::from_secs(3)));
            }
        }
    }

    /// Advances the FX state machine and renders `units` for this tick.
    /// `silence_timeout` gates both the Silence-to-Leave and the
    /// Leave-to-Silence transitions: silence for `silence_timeout` moves
    /// to Leave, a further timeout moves to Silence.
    pub fn tick(&mut self, peaks: &Peaks, units: &mut Units, silence_timeout: Duration, now: Instant) {
        if !self.started {
            self.started = true;
            self.transition(FxKind::MajorPeak, now);
        }

        if !peaks.is_silent() {
            self.last_peak_at = now;
            if self.kind != FxKind::MajorPeak {
                self.transition(FxKind::MajorPeak, now);
            }
        } else {
            let silent_for = now.saturating_duration_since(self.last_peak_at);
            match self.kind {
                FxKind::MajorPeak if silent_for > silence_timeout => {
                    self.transition(FxKind::Leave, now);
                }
                FxKind::Leave => {
                    let since_leave = now.saturating_duration_since(self.entered_at);
                    if since_leave > silence_timeout {
                        self.transition(FxKind::Silence, now);
                    }
                }
                _ => {}
            }
        }

        self.execute(peaks, units, now);
    }

    /// Session end (TEARDOWN): forces `AllStop`, which never renders.
    pub fn stop(&mut self, units: &mut Units, now: Instant) {
        self.transition(FxKind::AllStop, now);
        units.all_dark();
    }

    fn execute(&mut self, peaks: &Peaks, units: &mut Units, now: Instant) {
        match self.kind {
            FxKind::MajorPeak => self.execute_major_peak(peaks, units),
            FxKind::Leave => self.execute_leave(units, now),
            FxKind::Silence => units.all_dark(),
            FxKind::AllStop => {}
        }
    }

    fn execute_major_peak(&self, peaks: &Peaks, units: &mut Units) {
        let Some((magnitude, frequency)) = peaks.major_peak() else {
            units.all_dark();
            return;
        };
        let brightness = (Peaks::interpolate(magnitude) * 255.0) as u8;
        let hue = (frequency % 360.0).abs();
        let color = hsv_to_rgb(hue, 1.0, brightness as f32 / 255.0);
        units.main_pinspot.color = color;
        units.main_pinspot.level = brightness;
        units.fill_pinspot.color = color;
        units.fill_pinspot.level = brightness;
        units.disco_ball.level = brightness;
    }

    fn execute_leave(&mut self, units: &mut Units, now: Instant) {
        if let Some(fader) = self.leave_fader.as_mut() {
            fader.travel(now);
            let level = (fader.value(now).clamp(0.0, 1.0) * 255.0) as u8;
            units.main_pinspot.level = level;
            units.fill_pinspot.level = level;
        }
    }
}

impl Default for FxEngine {
    fn default() -> Self {
        FxEngine::new()
    }
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Color {
    let c = v * s;
    let h_prime = h / 60.0;
    let x = c * (1.0 - (h_prime % 2.0 - 1.0).abs());
    let (r1, g1, b1) = match h_prime as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let m = v - c;
    Color {
        red: ((r1 + m) * 255.0) as u8,
        green: ((g1 + m) * 255.0) as u8,
        blue: ((b1 + m) * 255.0) as u8,
        white: 0,
        brightness: (v * 255.0) as u8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UnitsConfig;

    #[test]
    fn first_tick_enters_major_peak() {
        let mut engine = FxEngine::new();
        let mut units = Units::from_config(&UnitsConfig::default());
        let mut peaks = Peaks::empty();
        peaks.channels[0].insert(ordered_float::OrderedFloat(5.0), 440.0);

        engine.tick(&peaks, &mut units, Duration::from_secs(10), Instant::now());
        assert_eq!(engine.kind(), FxKind::MajorPeak);
        assert!(units.main_pinspot.level > 0);
    }

    #[test]
    fn prolonged_silence_transitions_to_leave_then_silence() {
        let mut engine = FxEngine::new();
        let mut units = Units::from_config(&UnitsConfig::default());
        let silent = Peaks::empty();

        let t0 = Instant::now();
        engine.tick(&silent, &mut units, Duration::from_millis(10), t0);
        assert_eq!(engine.kind(), FxKind::MajorPeak);

        let t1 = t0 + Duration::from_millis(50);
        engine.tick(&silent, &mut units, Duration::from_millis(10), t1);
        assert_eq!(engine.kind(), FxKind::Leave);

        let t2 = t1 + Duration::from_millis(50);
        engine.tick(&silent, &mut units, Duration::from_millis(10), t2);
        assert_eq!(engine.kind(), FxKind::Silence);
    }

    #[test]
    fn stop_forces_all_stop_and_darkens_units() {
        let mut engine = FxEngine::new();
        let mut units = Units::from_config(&UnitsConfig::default());
        units.main_pinspot.level = 200;
        engine.stop(&mut units, Instant::now());
        assert_eq!(engine.kind(), FxKind::AllStop);
        assert_eq!(units.main_pinspot.level, 0);
    }
}
