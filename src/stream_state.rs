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

//! Stream state negotiated over the RTSP connection (C7) but consumed by
//! the audio-data receiver (C8) on its own TCP connection: the session
//! key, the `fmtp` config, and the `RTP-Info` origin `RECORD` hands off.
//! A small `Arc<Mutex<_>>` handle, the same shape `RenderFlag` and
//! `StatusFlags` use in `context.rs`, rather than threading the whole
//! `Session` across the connection boundary.

use crate::{
    alac::FmtpConfig,
    cipher::SessionKey,
    frame::{RtpTimestamp, SeqNum},
    rack::FlushInfo,
};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Inner {
    session_key: Option<SessionKey>,
    fmtp: Option<FmtpConfig>,
    origin: Option<(SeqNum, RtpTimestamp)>,
    flush: Option<FlushInfo>,
}

#[derive(Clone, Default)]
pub struct StreamHandle(Arc<Mutex<Inner>>);

impl StreamHandle {
    pub fn set_key(&self, key: SessionKey) {
        self.0.lock().expect("stream lock poisoned").session_key = Some(key);
    }

    pub fn key(&self) -> Option<SessionKey> {
        self.0.lock().expect("stream lock poisoned").session_key.clone()
    }

    pub fn set_fmtp(&self, fmtp: FmtpConfig) {
        self.0.lock().expect("stream lock poisoned").fmtp = Some(fmtp);
    }

    pub fn fmtp(&self) -> Option<FmtpConfig> {
        self.0.lock().expect("stream lock poisoned").fmtp
    }

    /// The `RTP-Info` seq/rtptime pair `RECORD` hands off: the first
    /// packet's sequence number and RTP timestamp. Every later packet's
    /// RTP timestamp is derived from this origin by stride, since
    /// timestamps advance in fixed units of `frame_samples` per packet
    /// and the wire only carries a sequence number.
    pub fn set_origin(&self, seq: SeqNum, rtp_time: RtpTimestamp) {
        self.0.lock().expect("stream lock poisoned").origin = Some((seq, rtp_time));
    }

    pub fn origin(&self) -> Option<(SeqNum, RtpTimestamp)> {
        self.0.lock().expect("stream lock poisoned").origin
    }

    /// Records a `FLUSH`/`FLUSHBUFFERED` for the audio receiver to apply
    /// on its next pass over the rack.
    pub fn set_flush(&self, flush: FlushInfo) {
        self.0.lock().expect("stream lock poisoned").flush = Some(flush);
    }

    /// Takes and clears any pending flush, so it is applied exactly once.
    pub fn take_flush(&self) -> Option<FlushInfo> {
        self.0.lock().expect("stream lock poisoned").flush.take()
    }

    /// Clears all session-scoped state on `TEARDOWN`: a torn-down
    /// connection's key must not decipher a later session's packets.
    pub fn clear(&self) {
        let mut inner = self.0.lock().expect("stream lock poisoned");
        inner.session_key = None;
        inner.fmtp = None;
        inner.origin = None;
        inner.flush = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_resets_every_field() {
        let handle = StreamHandle::default();
        handle.set_key(SessionKey::new([1u8; 32]));
        handle.set_fmtp(FmtpConfig([0; 12]));
        handle.set_origin(SeqNum(1), RtpTimestamp(100_000));

        handle.clear();

        assert!(handle.key().is_none());
        assert!(handle.fmtp().is_none());
        assert!(handle.origin().is_none());
    }

    #[test]
    fn flush_is_taken_exactly_once() {
        let handle = StreamHandle::default();
        handle.set_flush(FlushInfo {
            until_seq: SeqNum(8),
            until_rtp: RtpTimestamp(100_000 + 7 * 352),
        });
        assert!(handle.take_flush().is_some());
        assert!(handle.take_flush().is_none());
    }

    #[test]
    fn origin_round_trips() {
        let handle = StreamHandle::default();
        handle.set_origin(SeqNum(7), RtpTimestamp(352 * 7));
        let (seq, rtp) = handle.origin().expect("origin set");
        assert_eq!(seq, SeqNum(7));
        assert_eq!(rtp, RtpTimestamp(352 * 7));
    }
}
