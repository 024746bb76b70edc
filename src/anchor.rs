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

//! Maps an RTP timestamp to a local monotonic render deadline (C6).
//! `AnchorData` arrives over RTSP `ANCHOR` messages and the control
//! channel; `AnchorLast` is the localized, ready-to-use derivative the
//! scheduler actually reads each tick.

use crate::time::ClockInfo;
use std::{
    sync::{Arc, RwLock},
    time::{Duration, Instant},
};
use tracing::info;

/// Sender-supplied timing anchor, as received over RTSP.
#[derive(Debug, Clone, Copy)]
pub struct AnchorData {
    pub clock_id: u64,
    pub anchor_rtp_time: u32,
    /// Nanoseconds since the epoch of the sender's clock.
    pub anchor_net_time: u64,
    pub valid_until: Duration,
}

/// The localized derivative of [`AnchorData`] the scheduler reads every
/// tick. `localized` is in local monotonic nanoseconds so the deadline
/// math (`deadline_local_ns`) never has to touch wall-clock time again.
#[derive(Debug, Clone, Copy)]
pub struct AnchorLast {
    pub rtp_time: u32,
    pub anchor_time: u64,
    pub localized: i64,
    pub master_at: Instant,
    pub clock_id: u64,
    since_update: Instant,
}

impl AnchorLast {
    /// AnchorLast is only meaningful once a real clock master has been
    /// seen; `clock_id == 0` is the "nothing published yet" sentinel.
    pub fn is_ready(&self) -> bool {
        self.clock_id != 0
    }

    pub fn since_update(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.since_update)
    }

    fn from_data(data: AnchorData, clock: ClockInfo, now: Instant) -> Self {
        let localized = data.anchor_net_time as i64 - clock.raw_offset;
        AnchorLast {
            rtp_time: data.anchor_rtp_time,
            anchor_time: data.anchor_net_time,
            localized,
            master_at: now,
            clock_id: data.clock_id,
            since_update: now,
        }
    }
}

impl Default for AnchorLast {
    fn default() -> Self {
        AnchorLast {
            rtp_time: 0,
            anchor_time: 0,
            localized: 0,
            master_at: Instant::now(),
            clock_id: 0,
            since_update: Instant::now(),
        }
    }
}

/// Given an anchor rtp time `anchor_rtp_time`, its localized deadline
/// `localized` (ns), a `sample_rate`, and a frame's RTP timestamp `t`,
/// returns the local monotonic deadline in nanoseconds. RTP timestamps
/// wrap at u32; the subtraction is done in i64 after widening so any
/// delta in `[-2^31, 2^31)` is handled exactly.
pub fn deadline_local_ns(localized: i64, anchor_rtp_time: u32, t: u32, sample_rate: u32) -> i64 {
    let delta_rtp = t.wrapping_sub(anchor_rtp_time) as i32 as i64;
    localized + delta_rtp * 1_000_000_000 / sample_rate as i64
}

/// Outcome of comparing a frame's deadline against the current tick
/// window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineVerdict {
    /// Deadline falls inside `[now - outdated_slack, now + future_slack]`.
    InWindow,
    Outdated,
    Future,
}

pub fn classify_deadline(
    deadline_local_ns: i64,
    now_local_ns: i64,
    outdated_slack: Duration,
    future_slack: Duration,
) -> DeadlineVerdict {
    let delta = deadline_local_ns - now_local_ns;
    if delta < -(outdated_slack.as_nanos() as i64) {
        DeadlineVerdict::Outdated
    } else if delta > future_slack.as_nanos() as i64 {
        DeadlineVerdict::Future
    } else {
        DeadlineVerdict::InWindow
    }
}

/// Process-wide singleton holding the latest [`AnchorLast`], published
/// by the RTSP context and read atomically (copy-on-read) by the
/// scheduler, following a publish-latest discipline.
#[derive(Clone, Default)]
pub struct AnchorHandle(Arc<RwLock<AnchorLast>>);

impl AnchorHandle {
    pub fn current(&self) -> AnchorLast {
        *self.0.read().expect("anchor lock poisoned")
    }

    /// Publishes a fresh `AnchorData`, localizing it against `clock`.
    /// Logs the `frame_adj` timing-change metric.
    pub fn update(&self, data: AnchorData, clock: ClockInfo, now: Instant, sample_rate: u32) {
        let new_last = AnchorLast::from_data(data, clock, now);
        let mut guard = self.0.write().expect("anchor lock poisoned");
        let old = *guard;
        if old.is_ready() {
            let delta_rtp = new_last.rtp_time.wrapping_sub(old.rtp_time) as i32 as i64;
            let delta_anchor_ns = new_last.anchor_time as i64 - old.anchor_time as i64;
            let frame_adj = delta_rtp - delta_anchor_ns * sample_rate as i64 / 1_000_000_000;
            info!(frame_adj, "anchor updated");
        }
        *guard = new_last;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_matches_exact_formula_across_wrap_range() {
        let localized = 1_000_000_000_i64;
        let anchor_rtp_time = 100_000_u32;
        let sample_rate = 44_100_u32;

        for delta in [
            0_i64,
            1,
            -1,
            352,
            -352,
            (1_i64 << 31) - 1,
            -(1_i64 << 31),
            1_000_000,
        ] {
            let t = anchor_rtp_time.wrapping_add(delta as i32 as u32);
            let got = deadline_local_ns(localized, anchor_rtp_time, t, sample_rate);
            let want = localized + delta * 1_000_000_000 / sample_rate as i64;
            assert_eq!(got, want, "mismatch at delta={delta}");
        }
    }

    #[test]
    fn classify_in_window() {
        let verdict = classify_deadline(
            1_000_000_000,
            1_000_000_000,
            Duration::from_millis(5),
            Duration::from_millis(5),
        );
        assert_eq!(verdict, DeadlineVerdict::InWindow);
    }

    #[test]
    fn classify_outdated_and_future() {
        let outdated = classify_deadline(
            0,
            1_000_000_000,
            Duration::from_millis(5),
            Duration::from_millis(5),
        );
        assert_eq!(outdated, DeadlineVerdict::Outdated);

        let future = classify_deadline(
            2_000_000_000,
            1_000_000_000,
            Duration::from_millis(5),
            Duration::from_millis(5),
        );
        assert_eq!(future, DeadlineVerdict::Future);
    }

    #[test]
    fn anchor_not_ready_until_first_update() {
        let handle = AnchorHandle::default();
        assert!(!handle.current().is_ready());

        let clock = ClockInfo {
            clock_id: 9,
            mastership_start_time: 0,
            raw_offset: 0,
            sample_time: Instant::now(),
        };
        handle.update(
            AnchorData {
                clock_id: 9,
                anchor_rtp_time: 100,
                anchor_net_time: 5_000_000_000,
                valid_until: Duration::from_secs(10),
            },
            clock,
            Instant::now(),
            44_100,
        );
        assert!(handle.current().is_ready());
    }
}
