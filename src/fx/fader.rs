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

//! Time-parameterized easings and the fader that rides them. Each FX
//! owns zero or more faders; `travel()` advances one tick and returns
//! `false` once the fader has finished.

use std::time::{Duration, Instant};

/// The four easing curves a fader can ride, as a tagged enum rather
/// than a deep inheritance hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Easing {
    OutCirc,
    OutExponent,
    OutQuint,
    OutSine,
}

impl Easing {
    /// `progress` in `[0.0, 1.0]`; returns the eased output in the same
    /// range.
    pub fn calc(self, progress: f32) -> f32 {
        let progress = progress.clamp(0.0, 1.0);
        match self {
            Easing::OutCirc => (1.0 - (progress - 1.0).powi(2)).sqrt(),
            Easing::OutExponent => {
                if progress >= 1.0 {
                    1.0
                } else {
                    1.0 - 2f32.powf(-10.0 * progress)
                }
            }
            Easing::OutQuint => 1.0 - (1.0 - progress).powi(5),
            Easing::OutSine => (progress * std::f32::consts::FRAC_PI_2).sin(),
        }
    }
}

/// Drives one value from `start` to `end` over `duration`, through an
/// [`Easing`] curve.
#[derive(Debug, Clone)]
pub struct Fader {
    easing: Easing,
    start: f32,
    end: f32,
    started_at: Instant,
    duration: Duration,
    finished: bool,
}

impl Fader {
    pub fn new(easing: Easing, start: f32, end: f32, duration: Duration) -> Self {
        Fader {
            easing,
            start,
            end,
            started_at: Instant::now(),
            duration,
            finished: false,
        }
    }

    pub fn active(&self) -> bool {
        !self.finished
    }

    pub fn finished(&self) -> bool {
        self.finished
    }

    fn progress_at(&self, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started_at).as_secs_f32();
        (elapsed / self.duration.as_secs_f32()).clamp(0.0, 1.0)
    }

    /// Current interpolated value without advancing state.
    pub fn value(&self, now: Instant) -> f32 {
        let eased = self.easing.calc(self.progress_at(now));
        self.start + (self.end - self.start) * eased
    }

    /// Advances the fader to `now`, returning `false` once it has
    /// reached its end.
    pub fn travel(&mut self, now: Instant) -> bool {
        if self.progress_at(now) >= 1.0 {
            self.finished = true;
        }
        self.active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_sine_starts_at_zero_ends_at_one() {
        assert!((Easing::OutSine.calc(0.0) - 0.0).abs() < 1e-6);
        assert!((Easing::OutSine.calc(1.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn out_exponent_reaches_one_at_progress_one() {
        assert_eq!(Easing::OutExponent.calc(1.0), 1.0);
    }

    #[test]
    fn fader_travel_finishes_after_duration_elapses() {
        let mut fader = Fader::new(Easing::OutQuint, 0.0, 1.0, Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(!fader.travel(Instant::now()));
        assert!(fader.finished());
        assert_eq!(fader.value(Instant::now()), 1.0);
    }

    #[test]
    fn fader_stays_active_before_duration_elapses() {
        let mut fader = Fader::new(Easing::OutCirc, 0.0, 1.0, Duration::from_secs(60));
        assert!(fader.travel(Instant::now()));
        assert!(fader.active());
    }
}
