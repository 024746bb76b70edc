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

//! A Reel is an ordered chunk of Frames keyed by RTP timestamp.
//! `BTreeMap` gives the strictly-increasing, wrap-aware iteration order
//! the rest of the pipeline depends on for free.

use crate::{
    error::{RackError, RackResult},
    frame::{Frame, RtpTimestamp},
};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// `Audio` reels are populated by the audio-data receiver (C8);
/// `Silent` reels are synthesized by the scheduler when the clock is
/// stale or no anchor is ready, bounded to roughly 330 ms of silence
/// frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReelKind {
    Audio,
    Silent,
}

#[derive(Debug)]
pub struct Reel {
    pub kind: ReelKind,
    frames: BTreeMap<RtpTimestamp, Frame>,
    started_at: Instant,
}

impl Reel {
    pub fn new(kind: ReelKind) -> Self {
        Reel {
            kind,
            frames: BTreeMap::new(),
            started_at: Instant::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Inserts `frame` keyed by its RTP timestamp. A duplicate key is a
    /// `RackCollision`.
    pub fn insert(&mut self, frame: Frame) -> RackResult<()> {
        if self.frames.contains_key(&frame.rtp_time) {
            return Err(RackError::RackCollision);
        }
        self.frames.insert(frame.rtp_time, frame);
        Ok(())
    }

    /// Frames in strictly increasing RTP-timestamp order.
    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Frame> {
        self.frames.values_mut()
    }

    pub fn oldest(&self) -> Option<&Frame> {
        self.frames.values().next()
    }

    pub fn pop_oldest(&mut self) -> Option<Frame> {
        let key = *self.frames.keys().next()?;
        self.frames.remove(&key)
    }

    pub fn last_rtp_time(&self) -> Option<RtpTimestamp> {
        self.frames.keys().next_back().copied()
    }

    /// Whether this reel should be racked: it has accumulated
    /// `wip_max` frames, or its oldest frame has been waiting longer
    /// than `wip_timeout`.
    pub fn should_rack(&self, wip_max: usize, wip_timeout: Duration, now: Instant) -> bool {
        if self.frames.len() >= wip_max {
            return true;
        }
        self.oldest()
            .is_some_and(|f| now.saturating_duration_since(f.arrival) > wip_timeout)
    }

    /// Evicts all frames with `seq < until_seq` (modular) per a FLUSH,
    /// marking them `Flushed` on the way out.
    pub fn flush_before(&mut self, until_seq: crate::frame::SeqNum) -> Vec<Frame> {
        let keys: Vec<RtpTimestamp> = self
            .frames
            .iter()
            .filter(|(_, f)| f.seq < until_seq)
            .map(|(k, _)| *k)
            .collect();

        keys.into_iter()
            .filter_map(|k| {
                let mut f = self.frames.remove(&k)?;
                f.mark_flushed();
                Some(f)
            })
            .collect()
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::SeqNum;

    fn frame(rtp: u32, seq: u16) -> Frame {
        Frame::new(RtpTimestamp(rtp), SeqNum(seq), Instant::now())
    }

    #[test]
    fn insertion_in_arbitrary_order_yields_sorted_iteration() {
        let mut reel = Reel::new(ReelKind::Audio);
        reel.insert(frame(300, 3)).unwrap();
        reel.insert(frame(100, 1)).unwrap();
        reel.insert(frame(200, 2)).unwrap();

        let rtp_times: Vec<u32> = reel.iter().map(|f| f.rtp_time.0).collect();
        assert_eq!(rtp_times, vec![100, 200, 300]);
    }

    #[test]
    fn duplicate_key_is_a_collision() {
        let mut reel = Reel::new(ReelKind::Audio);
        reel.insert(frame(100, 1)).unwrap();
        assert!(matches!(
            reel.insert(frame(100, 2)),
            Err(RackError::RackCollision)
        ));
    }

    #[test]
    fn flush_removes_only_seqs_below_cutoff() {
        let mut reel = Reel::new(ReelKind::Audio);
        for seq in 1..=10u16 {
            reel.insert(frame(seq as u32 * 352, seq)).unwrap();
        }
        let flushed = reel.flush_before(SeqNum(8));
        assert_eq!(flushed.len(), 7);
        assert_eq!(reel.len(), 3);
        assert!(reel.iter().all(|f| f.seq >= SeqNum(8)));
    }

    #[test]
    fn should_rack_on_wip_max() {
        let mut reel = Reel::new(ReelKind::Audio);
        for seq in 0..4u16 {
            reel.insert(frame(seq as u32, seq)).unwrap();
        }
        assert!(reel.should_rack(4, Duration::from_secs(60), Instant::now()));
        assert!(!reel.should_rack(16, Duration::from_secs(60), Instant::now()));
    }

    #[test]
    fn should_rack_on_timeout() {
        let mut reel = Reel::new(ReelKind::Audio);
        reel.insert(frame(0, 0)).unwrap();
        let later = Instant::now() + Duration::from_millis(500);
        assert!(reel.should_rack(16, Duration::from_millis(250), later));
    }
}
