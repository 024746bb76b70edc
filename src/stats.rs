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

//! Process-wide counters: a cheap `Arc`-backed handle any subsystem can
//! clone, updates land in plain atomics so no lock is ever held across
//! an await point.
//! The real time-series sink (statsd/opentelemetry) is an external
//! collaborator this crate doesn't implement; `Stats` only needs to give
//! that sink something to read.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tracing::debug;

#[derive(Default)]
struct Counters {
    rtsp_audio_ciphered: AtomicU64,
    cipher_failures: AtomicU64,
    decode_failures: AtomicU64,
    rack_collisions: AtomicU64,
    rack_wip_timeouts: AtomicU64,
    frames_outdated: AtomicU64,
    frames_flushed: AtomicU64,
    frames_rendered: AtomicU64,
    sync_wait_nanos_last: AtomicU64,
    remote_elapsed_nanos_last: AtomicU64,
    remote_roundtrip_nanos_last: AtomicU64,
    remote_dmx_qok: AtomicU64,
    remote_dmx_qrf: AtomicU64,
    remote_dmx_qsf: AtomicU64,
}

#[derive(Clone, Default)]
pub struct Stats(Arc<Counters>);

macro_rules! counter_accessor {
    ($incr:ident, $get:ident, $field:ident) => {
        pub fn $incr(&self) {
            self.0.$field.fetch_add(1, Ordering::Relaxed);
        }

        pub fn $get(&self) -> u64 {
            self.0.$field.load(Ordering::Relaxed)
        }
    };
}

impl Stats {
    counter_accessor!(
        incr_rtsp_audio_ciphered,
        rtsp_audio_ciphered,
        rtsp_audio_ciphered
    );
    counter_accessor!(incr_cipher_failure, cipher_failures, cipher_failures);
    counter_accessor!(incr_decode_failure, decode_failures, decode_failures);
    counter_accessor!(incr_rack_collision, rack_collisions, rack_collisions);
    counter_accessor!(incr_rack_wip_timeout, rack_wip_timeouts, rack_wip_timeouts);
    counter_accessor!(incr_frame_outdated, frames_outdated, frames_outdated);
    counter_accessor!(incr_frame_flushed, frames_flushed, frames_flushed);
    counter_accessor!(incr_frame_rendered, frames_rendered, frames_rendered);
    counter_accessor!(incr_remote_dmx_qok, remote_dmx_qok, remote_dmx_qok);
    counter_accessor!(incr_remote_dmx_qrf, remote_dmx_qrf, remote_dmx_qrf);
    counter_accessor!(incr_remote_dmx_qsf, remote_dmx_qsf, remote_dmx_qsf);

    pub fn record_sync_wait(&self, wait: std::time::Duration) {
        self.0
            .sync_wait_nanos_last
            .store(wait.as_nanos() as u64, Ordering::Relaxed);
        debug!(sync_wait_ns = wait.as_nanos() as u64, "SYNC_WAIT");
    }

    pub fn sync_wait_nanos_last(&self) -> u64 {
        self.0.sync_wait_nanos_last.load(Ordering::Relaxed)
    }

    pub fn record_remote_elapsed(&self, elapsed: std::time::Duration) {
        self.0
            .remote_elapsed_nanos_last
            .store(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    pub fn record_remote_roundtrip(&self, rtt: std::time::Duration) {
        self.0
            .remote_roundtrip_nanos_last
            .store(rtt.as_nanos() as u64, Ordering::Relaxed);
    }
}

/// Throttles a repeating condition so it logs on the 1st, 2nd, 4th, 8th,
/// ... occurrence instead of every single one ("no console spam during
/// normal operation", per the error-handling design).
pub struct LogThrottle {
    count: AtomicU64,
}

impl Default for LogThrottle {
    fn default() -> Self {
        LogThrottle {
            count: AtomicU64::new(0),
        }
    }
}

impl LogThrottle {
    /// Returns `true` the calls this occurrence should actually be logged on.
    pub fn should_log(&self) -> bool {
        let n = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        n & (n - 1) == 0
    }
}
