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

//! Holds the process-wide mutable state (`StatusFlags`, the render-enable
//! flag, config, the stats sink) as one small explicit context,
//! constructed once in `main` and cloned (cheaply, `Arc` inside) into
//! every subsystem at spawn time.

use crate::{config::Config, stats::Stats};
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU8, Ordering},
};

/// Named bits reported in the `GET /info` reply and RECORD state.
mod flag_bits {
    pub const AUDIO_LINK: u8 = 0b001;
    pub const REMOTE_CONTROL_RELAY: u8 = 0b010;
    pub const RECEIVER_SESSION_ACTIVE: u8 = 0b100;
}

/// Bitfield with named bits, backed by an atomic so readers never need a
/// lock. `ready()` sets only `AudioLink`; `playing()` sets all three.
#[derive(Clone)]
pub struct StatusFlags(Arc<AtomicU8>);

impl Default for StatusFlags {
    fn default() -> Self {
        StatusFlags(Arc::new(AtomicU8::new(0)))
    }
}

impl StatusFlags {
    pub fn ready(&self) {
        self.0.store(flag_bits::AUDIO_LINK, Ordering::Relaxed);
    }

    pub fn playing(&self) {
        self.0.store(
            flag_bits::AUDIO_LINK
                | flag_bits::REMOTE_CONTROL_RELAY
                | flag_bits::RECEIVER_SESSION_ACTIVE,
            Ordering::Relaxed,
        );
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }

    pub fn bits(&self) -> u8 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn audio_link(&self) -> bool {
        self.bits() & flag_bits::AUDIO_LINK != 0
    }

    pub fn receiver_session_active(&self) -> bool {
        self.bits() & flag_bits::RECEIVER_SESSION_ACTIVE != 0
    }
}

/// Process-wide render-enable flag. The scheduler polls `enabled()`
/// once per iteration, sleeping 20ms between checks while disabled;
/// RTSP flips it on `RECORD`/`TEARDOWN`.
#[derive(Clone, Default)]
pub struct RenderFlag(Arc<AtomicBool>);

impl RenderFlag {
    pub fn enable(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn disable(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn enabled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Clone)]
pub struct PierreContext {
    pub config: Arc<Config>,
    pub status: StatusFlags,
    pub render: RenderFlag,
    pub stats: Stats,
}

impl PierreContext {
    pub fn new(config: Config) -> Self {
        PierreContext {
            config: Arc::new(config),
            status: StatusFlags::default(),
            render: RenderFlag::default(),
            stats: Stats::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_sets_only_audio_link() {
        let flags = StatusFlags::default();
        flags.ready();
        assert!(flags.audio_link());
        assert!(!flags.receiver_session_active());
    }

    #[test]
    fn playing_sets_all_bits() {
        let flags = StatusFlags::default();
        flags.playing();
        assert!(flags.audio_link());
        assert!(flags.receiver_session_active());
    }

    #[test]
    fn reset_clears_all_bits() {
        let flags = StatusFlags::default();
        flags.playing();
        flags.reset();
        assert_eq!(flags.bits(), 0);
    }
}
