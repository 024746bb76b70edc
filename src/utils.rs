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

use thread_priority::{
    RealtimeThreadSchedulePolicy, ThreadPriority, ThreadSchedulePolicy,
    set_thread_priority_and_policy, thread_native_id,
};
use tracing::{info, warn};

pub const U8_WRAP: u16 = 256;
pub const U16_WRAP: u32 = 65536;
pub const U32_WRAP: u64 = 4294967296;

/// Wrapping distance `a - b` for values that wrap modulo `m`, returned as
/// a signed i64 so callers can compare "is a ahead of or behind b" with
/// ordinary sign checks. Used by both sequence-number and RTP-timestamp
/// comparisons, which must never compare raw integers directly.
pub fn wrapping_distance(a: u64, b: u64, modulus: u64) -> i64 {
    let half = modulus / 2;
    let diff = a.wrapping_sub(b) % modulus;
    if diff > half {
        diff as i64 - modulus as i64
    } else {
        diff as i64
    }
}

/// Best-effort: raises the calling thread to realtime FIFO scheduling so
/// the render loop's sync-wait isn't at the mercy of normal scheduling
/// jitter. Not fatal if it fails (e.g. missing CAP_SYS_NICE).
pub fn set_realtime_priority() {
    let pid = thread_native_id();
    if let Err(e) = set_thread_priority_and_policy(
        pid,
        ThreadPriority::Max,
        ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
    ) {
        warn!("could not set thread priority: {e:?}");
    } else {
        info!("set real time priority for thread {pid:?}");
    }
}
