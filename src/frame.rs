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

//! The unit of work that flows through the pipeline: one packet's worth
//! of audio, carried through its lifecycle states until it is rendered
//! or discarded. `RtpTimestamp` and `SeqNum` wrap the raw wire integers
//! so every comparison goes through modular arithmetic instead
//! of a naive integer compare, per the Data Model's wrap invariants.

use crate::{dsp::Peaks, utils::wrapping_distance, utils::U16_WRAP, utils::U32_WRAP};
use std::{cmp::Ordering, time::Instant};

/// A u32 RTP timestamp that wraps. `Ord`/`PartialOrd` compare by
/// wrapping distance, not raw value, so `Reel`'s keyed container stays
/// correctly ordered across a wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RtpTimestamp(pub u32);

impl RtpTimestamp {
    pub fn wrapping_add(self, samples: u32) -> Self {
        RtpTimestamp(self.0.wrapping_add(samples))
    }

    pub fn distance_from(self, other: RtpTimestamp) -> i64 {
        wrapping_distance(self.0 as u64, other.0 as u64, U32_WRAP)
    }
}

impl PartialOrd for RtpTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RtpTimestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance_from(*other).cmp(&0)
    }
}

/// A u16 sequence number that wraps, same modular-comparison treatment
/// as [`RtpTimestamp`] but over the smaller 16-bit space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeqNum(pub u16);

impl SeqNum {
    pub fn distance_from(self, other: SeqNum) -> i64 {
        wrapping_distance(self.0 as u64, other.0 as u64, U16_WRAP as u64)
    }
}

impl PartialOrd for SeqNum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SeqNum {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance_from(*other).cmp(&0)
    }
}

/// Lifecycle states: `Empty → HeaderParsed → Deciphered → Decoded →
/// Ready → {Rendered, Outdated, Flushed, Invalid}`. A frame only
/// becomes `Ready` once Anchor is known and a deadline computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Empty,
    HeaderParsed,
    Deciphered,
    Decoded,
    Ready,
    Rendered,
    Outdated,
    Flushed,
    Invalid,
}

impl FrameState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FrameState::Rendered | FrameState::Outdated | FrameState::Flushed | FrameState::Invalid
        )
    }
}

/// One packet's worth of decoded audio, carried through the pipeline.
#[derive(Debug, Clone)]
pub struct Frame {
    pub rtp_time: RtpTimestamp,
    pub seq: SeqNum,
    pub state: FrameState,
    pub arrival: Instant,
    /// Local monotonic render deadline; filled once Anchor is known.
    pub deadline_local_ns: Option<i64>,
    pub pcm: Option<Vec<u8>>,
    pub peaks: Option<Peaks>,
}

impl Frame {
    pub fn new(rtp_time: RtpTimestamp, seq: SeqNum, arrival: Instant) -> Self {
        Frame {
            rtp_time,
            seq,
            state: FrameState::Empty,
            arrival,
            deadline_local_ns: None,
            pcm: None,
            peaks: None,
        }
    }

    pub fn mark_header_parsed(&mut self) {
        self.state = FrameState::HeaderParsed;
    }

    pub fn mark_deciphered(&mut self) {
        self.state = FrameState::Deciphered;
    }

    pub fn mark_decoded(&mut self, pcm: Vec<u8>) {
        self.pcm = Some(pcm);
        self.state = FrameState::Decoded;
    }

    pub fn mark_ready(&mut self, deadline_local_ns: i64) {
        self.deadline_local_ns = Some(deadline_local_ns);
        self.state = FrameState::Ready;
    }

    pub fn mark_rendered(&mut self, peaks: Peaks) {
        self.peaks = Some(peaks);
        self.state = FrameState::Rendered;
    }

    pub fn mark_outdated(&mut self) {
        self.state = FrameState::Outdated;
    }

    pub fn mark_flushed(&mut self) {
        self.state = FrameState::Flushed;
    }

    pub fn mark_invalid(&mut self) {
        self.state = FrameState::Invalid;
    }

    /// `now − arrival > max_age`, computed with `saturating_duration_since`
    /// so it can never underflow into an always-false comparison.
    pub fn is_too_old(&self, now: Instant, max_age: std::time::Duration) -> bool {
        now.saturating_duration_since(self.arrival) > max_age
    }
}
