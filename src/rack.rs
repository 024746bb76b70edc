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

//! The Rack holds every racked [`Reel`] plus the one work-in-progress
//! reel frames land in as they arrive. At most one WIP reel
//! exists at a time; a reel is moved from WIP into the racked map only
//! once it is complete.

use crate::{
    error::{RackError, RackResult},
    frame::{Frame, RtpTimestamp, SeqNum},
    reel::{Reel, ReelKind},
};
use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

/// `FLUSH`/`FLUSHBUFFERED` request recorded by the RTSP context and
/// applied by the buffering layer on its next pass.
#[derive(Debug, Clone, Copy)]
pub struct FlushInfo {
    pub until_seq: SeqNum,
    pub until_rtp: RtpTimestamp,
}

pub struct Rack {
    reels: BTreeMap<RtpTimestamp, Reel>,
    wip: Reel,
    wip_started: Instant,
    wip_max: usize,
    wip_timeout: Duration,
}

impl Rack {
    pub fn new(wip_max: usize, wip_timeout: Duration) -> Self {
        Rack {
            reels: BTreeMap::new(),
            wip: Reel::new(ReelKind::Audio),
            wip_started: Instant::now(),
            wip_max,
            wip_timeout,
        }
    }

    /// Inserts a frame into the WIP reel, racking it first if it has
    /// already met the WIP policy's trigger.
    pub fn insert(&mut self, frame: Frame, now: Instant) -> RackResult<()> {
        if self.wip.should_rack(self.wip_max, self.wip_timeout, now) {
            self.rack_wip();
        }
        self.wip.insert(frame)
    }

    /// Forces the current WIP reel into the racked map, starting a
    /// fresh one. Used both by the periodic policy check and directly
    /// by callers that need a reel boundary (e.g. end of stream).
    pub fn rack_wip(&mut self) {
        let finished = std::mem::replace(&mut self.wip, Reel::new(ReelKind::Audio));
        self.wip_started = Instant::now();
        if let Some(key) = finished.oldest().map(|f| f.rtp_time) {
            self.reels.insert(key, finished);
        }
    }

    /// `RackWipTimeout` if the WIP reel has been open longer than
    /// `wip_timeout` without having reached `wip_max` (a stalled
    /// session: the sender stopped sending before filling the reel).
    pub fn check_wip_timeout(&self, now: Instant) -> RackResult<()> {
        if !self.wip.is_empty()
            && now.saturating_duration_since(self.wip_started) > self.wip_timeout
            && self.wip.len() < self.wip_max
        {
            return Err(RackError::RackWipTimeout);
        }
        Ok(())
    }

    pub fn reels(&self) -> impl Iterator<Item = &Reel> {
        self.reels.values()
    }

    pub fn reels_mut(&mut self) -> impl Iterator<Item = &mut Reel> {
        self.reels.values_mut()
    }

    pub fn wip(&self) -> &Reel {
        &self.wip
    }

    /// Applies a FLUSH: evicts frames with `seq < until_seq` from every
    /// reel (including WIP), and drops whole reels whose last RTP
    /// timestamp is `<= until_rtp`.
    pub fn flush(&mut self, info: FlushInfo) {
        self.wip.flush_before(info.until_seq);

        self.reels.retain(|_, reel| {
            reel.flush_before(info.until_seq);
            match reel.last_rtp_time() {
                Some(last) => last > info.until_rtp,
                None => false,
            }
        });
    }

    /// Pops the oldest `Frame` across all racked reels whose state is
    /// `Ready`, discarding any now-empty reels along the way. Used by
    /// the scheduler's render-tick pick.
    pub fn pop_oldest_ready(&mut self) -> Option<Frame> {
        let key = *self.reels.iter().find(|(_, r)| !r.is_empty())?.0;
        let reel = self.reels.get_mut(&key)?;
        let frame = reel.pop_oldest();
        if reel.is_empty() {
            self.reels.remove(&key);
        }
        frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(rtp: u32, seq: u16) -> Frame {
        Frame::new(RtpTimestamp(rtp), SeqNum(seq), Instant::now())
    }

    #[test]
    fn wip_racks_on_max_and_starts_fresh() {
        let mut rack = Rack::new(2, Duration::from_secs(60));
        rack.insert(frame(0, 0), Instant::now()).unwrap();
        rack.insert(frame(352, 1), Instant::now()).unwrap();
        assert_eq!(rack.wip().len(), 2);

        rack.insert(frame(704, 2), Instant::now()).unwrap();
        assert_eq!(rack.reels().count(), 1);
        assert_eq!(rack.wip().len(), 1);
    }

    #[test]
    fn flush_evicts_by_seq_and_drops_whole_reels() {
        let mut rack = Rack::new(100, Duration::from_secs(60));
        for seq in 0..5u16 {
            rack.insert(frame(seq as u32 * 352, seq), Instant::now()).unwrap();
        }
        rack.rack_wip();

        rack.flush(FlushInfo {
            until_seq: SeqNum(3),
            until_rtp: RtpTimestamp(4 * 352),
        });

        assert_eq!(rack.reels().count(), 0);
    }

    #[test]
    fn wip_timeout_reported_when_stalled_below_max() {
        let mut rack = Rack::new(16, Duration::from_millis(10));
        rack.insert(frame(0, 0), Instant::now()).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert!(rack.check_wip_timeout(Instant::now()).is_err());
    }
}
