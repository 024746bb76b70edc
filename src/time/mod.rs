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

//! The PTP master clock peer (C1). Pierre never runs the PTP protocol
//! itself — a real deployment slaves the host clock to a master via an
//! external daemon (ptp4l) or the optional `statime` backend — it only
//! needs to know who the current master is and whether that information
//! is still fresh enough to trust.
//!
//! `ClockInfo` is published by whichever context owns clock updates and
//! read by the scheduler and anchor mapping through a publish-latest
//! snapshot (`ClockHandle`), never behind a lock held across an await.

use std::{
    sync::{Arc, RwLock},
    time::{Duration, Instant},
};

/// A snapshot of the current PTP master, as reported by whatever clock
/// backend is active. `sample_time` is the local monotonic instant the
/// snapshot was taken, used for the staleness check in [`ClockInfo::is_fresh`].
#[derive(Debug, Clone, Copy)]
pub struct ClockInfo {
    pub clock_id: u64,
    pub mastership_start_time: u64,
    pub raw_offset: i64,
    pub sample_time: Instant,
}

impl ClockInfo {
    /// No master known yet; `clock_id == 0` is the sentinel the rest of
    /// the pipeline (notably `AnchorLast::is_ready`) checks for.
    pub fn unknown() -> Self {
        ClockInfo {
            clock_id: 0,
            mastership_start_time: 0,
            raw_offset: 0,
            sample_time: Instant::now(),
        }
    }

    /// `now − sample_time < max_age`.
    pub fn is_fresh(&self, now: Instant, max_age: Duration) -> bool {
        self.clock_id != 0 && now.saturating_duration_since(self.sample_time) < max_age
    }
}

impl Default for ClockInfo {
    fn default() -> Self {
        ClockInfo::unknown()
    }
}

/// Adapter a real PTP integration (ptp4l over a management socket, or
/// the `statime` backend) implements; Pierre itself only consumes
/// [`ClockInfo`] snapshots, never the wire protocol.
pub trait PtpPeer: Send + 'static {
    /// Blocks (async, cooperatively) until a new mastership sample is
    /// available and returns it. Returning `None` means the peer source
    /// closed and the clock context should exit.
    fn poll(&mut self) -> impl Future<Output = Option<ClockInfo>> + Send;
}

/// Process-wide, cheaply-clonable handle to the latest [`ClockInfo`].
/// The clock-peer context is the sole writer; every other context reads
/// via [`ClockHandle::current`], which copies the whole value out from
/// under the lock rather than holding a guard.
#[derive(Clone, Default)]
pub struct ClockHandle(Arc<RwLock<ClockInfo>>);

impl ClockHandle {
    pub fn current(&self) -> ClockInfo {
        *self.0.read().expect("clock lock poisoned")
    }

    pub fn publish(&self, info: ClockInfo) {
        *self.0.write().expect("clock lock poisoned") = info;
    }
}

/// Drives a [`PtpPeer`] to completion, publishing each sample to `handle`.
/// Runs as its own subsystem context, one per clock peer.
pub async fn run_clock_context<P: PtpPeer>(mut peer: P, handle: ClockHandle) {
    while let Some(info) = peer.poll().await {
        handle.publish(info);
    }
}

/// Placeholder peer for deployments with no PTP backend wired up yet:
/// closes immediately, so the clock context exits and `ClockHandle`
/// stays at `ClockInfo::unknown()` forever. A real adapter (ptp4l over
/// its management socket, or the `statime` backend) replaces this.
pub struct NullPtpPeer;

impl PtpPeer for NullPtpPeer {
    async fn poll(&mut self) -> Option<ClockInfo> {
        None
    }
}

/// Test/simulation peer: yields a fixed sequence of samples, one per
/// `poll()` call, then closes. Used by scheduler and anchor tests that
/// need deterministic clock behavior without a real PTP network.
#[cfg(test)]
pub struct SimPeer {
    samples: std::vec::IntoIter<ClockInfo>,
}

#[cfg(test)]
impl SimPeer {
    pub fn new(samples: Vec<ClockInfo>) -> Self {
        SimPeer {
            samples: samples.into_iter(),
        }
    }
}

#[cfg(test)]
impl PtpPeer for SimPeer {
    async fn poll(&mut self) -> Option<ClockInfo> {
        self.samples.next()
    }
}
