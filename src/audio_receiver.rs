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

//! The audio-data receiver (C8): one TCP connection, length-prefixed
//! frames, each one run through decipher (C2) and decode (C3) before
//! landing in the rack (C5). Packets are inserted in arrival order; the
//! rack's keyed reels sort them back into RTP-time order, so late
//! arrivals slot in correctly until a reel is racked and drained to the
//! scheduler.
//!
//! The wire only carries a sequence number; the AAD *is* the packet's
//! header. RTP timestamps advance in fixed units of `frame_samples` per
//! packet, so every packet's timestamp is
//! derived from the `RTP-Info` origin `RECORD` captured, by the packet's
//! distance from that origin's sequence number.

use crate::{
    alac::{AlacDecoder, FRAME_SAMPLES},
    cipher,
    control_receiver::RetransmitRequest,
    error::PierreResult,
    frame::{Frame, RtpTimestamp, SeqNum},
    rack::Rack,
    stats::{LogThrottle, Stats},
    stream_state::StreamHandle,
};
use std::time::{Duration, Instant};
use tokio::{io::AsyncReadExt, net::TcpStream, sync::mpsc, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct AudioReceiverConfig {
    pub wip_max: usize,
    pub wip_timeout: Duration,
    /// How long a gap in the RTP sequence is tolerated before a
    /// retransmit request is raised.
    pub retransmit_timeout: Duration,
}

/// A sequence number that arrived late (or not yet at all), tracked so a
/// retransmit request is raised only once the gap has gone unfilled
/// longer than `retransmit_timeout`.
struct PendingGap {
    seq: SeqNum,
    noticed_at: Instant,
}

/// Why a received packet never became a `Frame`, for logging. Every
/// reason maps to an existing [`Stats`] counter.
pub(crate) enum Rejected {
    NoSessionKey,
    NoFmtp,
    NoOrigin,
    TooShort,
    CipherFailure,
    DecodeFailure,
}

/// Runs the per-connection receive loop until `cancel` fires or the peer
/// closes the connection (the expected `TEARDOWN` outcome).
pub async fn run<D: AlacDecoder>(
    mut socket: TcpStream,
    stream: StreamHandle,
    mut decoder: D,
    frame_tx: mpsc::Sender<Frame>,
    mut recovered_rx: mpsc::Receiver<Frame>,
    request_tx: mpsc::Sender<RetransmitRequest>,
    stats: Stats,
    cfg: AudioReceiverConfig,
    cancel: CancellationToken,
) -> PierreResult<()> {
    let mut rack = Rack::new(cfg.wip_max, cfg.wip_timeout);
    let mut stall_check = tokio::time::interval(cfg.wip_timeout.max(Duration::from_millis(10)));
    stall_check.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let rejection_throttles = RejectionThrottles::default();

    let mut next_seq: Option<SeqNum> = None;
    let mut gaps: Vec<PendingGap> = Vec::new();

    loop {
        let mut len_buf = [0u8; 2];
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("audio receiver canceled");
                break;
            }
            _ = stall_check.tick() => {
                if rack.check_wip_timeout(Instant::now()).is_err() {
                    stats.incr_rack_wip_timeout();
                    warn!("work-in-progress reel stalled, racking incomplete");
                    rack.rack_wip();
                }
                raise_stale_gaps(&mut gaps, cfg.retransmit_timeout, &request_tx).await;
                drain_ready(&mut rack, &frame_tx).await;
            }
            recovered = recovered_rx.recv() => {
                let Some(frame) = recovered else { continue };
                gaps.retain(|g| g.seq != frame.seq);
                if rack.insert(frame, Instant::now()).is_err() {
                    stats.incr_rack_collision();
                }
                drain_ready(&mut rack, &frame_tx).await;
            }
            result = socket.read_exact(&mut len_buf) => {
                match result {
                    Ok(_) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                        info!("audio connection closed by peer");
                        break;
                    }
                    Err(e) => return Err(e.into()),
                }

                let len = u16::from_be_bytes(len_buf) as usize;
                let mut payload = vec![0u8; len];
                socket.read_exact(&mut payload).await?;
                let arrival = Instant::now();

                if let Some(flush) = stream.take_flush() {
                    debug!(until_seq = flush.until_seq.0, "applying FLUSH to rack");
                    rack.flush(flush);
                }

                match build_frame(&payload, &stream, &mut decoder, arrival, &stats) {
                    Ok(frame) => {
                        note_gaps(&mut next_seq, &mut gaps, frame.seq, arrival);
                        if rack.insert(frame, arrival).is_err() {
                            stats.incr_rack_collision();
                            warn!("duplicate RTP timestamp, dropping packet");
                        }
                    }
                    Err(reason) => log_rejection(reason, &rejection_throttles),
                }

                drain_ready(&mut rack, &frame_tx).await;
            }
        }
    }

    Ok(())
}

/// Records every sequence number skipped between the last seen packet
/// and `seq` as a pending gap, so a stalled retransmit can be raised
/// later if it never arrives.
fn note_gaps(next_seq: &mut Option<SeqNum>, gaps: &mut Vec<PendingGap>, seq: SeqNum, now: Instant) {
    if let Some(expected) = *next_seq {
        let mut missing = expected;
        while missing != seq && missing.distance_from(seq) < 0 {
            gaps.push(PendingGap { seq: missing, noticed_at: now });
            missing = SeqNum(missing.0.wrapping_add(1));
        }
    }
    *next_seq = Some(SeqNum(seq.0.wrapping_add(1)));
}

/// Sends a retransmit request for every gap that has gone unfilled
/// longer than `retransmit_timeout`, then forgets it: one request per
/// missing packet.
async fn raise_stale_gaps(gaps: &mut Vec<PendingGap>, retransmit_timeout: Duration, request_tx: &mpsc::Sender<RetransmitRequest>) {
    let now = Instant::now();
    let (stale, fresh): (Vec<_>, Vec<_>) = gaps
        .drain(..)
        .partition(|g| now.saturating_duration_since(g.noticed_at) > retransmit_timeout);
    *gaps = fresh;

    for gap in stale {
        let _ = request_tx
            .send(RetransmitRequest { missing_seq: gap.seq, count: 1 })
            .await;
    }
}

/// Pops every fully-racked frame in RTP order and hands it to the
/// scheduler. Returns early (silently) if the scheduler has gone away.
async fn drain_ready(rack: &mut Rack, frame_tx: &mpsc::Sender<Frame>) {
    while let Some(frame) = rack.pop_oldest_ready() {
        if frame_tx.send(frame).await.is_err() {
            return;
        }
    }
}

pub(crate) fn build_frame<D: AlacDecoder>(
    packet: &[u8],
    stream: &StreamHandle,
    decoder: &mut D,
    arrival: Instant,
    stats: &Stats,
) -> Result<Frame, Rejected> {
    if packet.len() < 2 {
        return Err(Rejected::TooShort);
    }
    let seq = SeqNum(u16::from_be_bytes([packet[0], packet[1]]));

    let key = stream.key().ok_or(Rejected::NoSessionKey)?;
    let fmtp = stream.fmtp().ok_or(Rejected::NoFmtp)?;
    let (origin_seq, origin_rtp) = stream.origin().ok_or(Rejected::NoOrigin)?;

    let plaintext = cipher::decipher(packet, &key).map_err(|_| {
        stats.incr_cipher_failure();
        Rejected::CipherFailure
    })?;
    stats.incr_rtsp_audio_ciphered();

    let pcm = decoder.decode(&plaintext, &fmtp).map_err(|_| {
        stats.incr_decode_failure();
        Rejected::DecodeFailure
    })?;

    let delta_samples = seq.distance_from(origin_seq) * FRAME_SAMPLES as i64;
    let rtp_time = RtpTimestamp((origin_rtp.0 as i64).wrapping_add(delta_samples) as u32);

    let mut frame = Frame::new(rtp_time, seq, arrival);
    frame.mark_header_parsed();
    frame.mark_deciphered();
    frame.mark_decoded(pcm);
    Ok(frame)
}

/// One [`LogThrottle`] per [`Rejected`] reason, so a sustained run of
/// e.g. cipher failures doesn't spam the log on every packet.
#[derive(Default)]
struct RejectionThrottles {
    no_session_key: LogThrottle,
    no_fmtp: LogThrottle,
    no_origin: LogThrottle,
    too_short: LogThrottle,
    cipher_failure: LogThrottle,
    decode_failure: LogThrottle,
}

fn log_rejection(reason: Rejected, throttles: &RejectionThrottles) {
    match reason {
        Rejected::NoSessionKey => {
            if throttles.no_session_key.should_log() {
                warn!("audio packet dropped: no shared session key");
            }
        }
        Rejected::NoFmtp => {
            if throttles.no_fmtp.should_log() {
                warn!("audio packet dropped: fmtp not yet negotiated");
            }
        }
        Rejected::NoOrigin => {
            if throttles.no_origin.should_log() {
                warn!("audio packet dropped: RTP-Info origin not yet established");
            }
        }
        Rejected::TooShort => {
            if throttles.too_short.should_log() {
                warn!("audio packet dropped: too short to carry a sequence number");
            }
        }
        Rejected::CipherFailure => {
            if throttles.cipher_failure.should_log() {
                warn!("audio packet dropped: AEAD tag mismatch");
            }
        }
        Rejected::DecodeFailure => {
            if throttles.decode_failure.should_log() {
                warn!("audio packet dropped: ALAC decode failure");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{alac::FmtpConfig, alac::PassthroughAlac, cipher::SessionKey};

    fn fmtp() -> FmtpConfig {
        FmtpConfig([0; 12])
    }

    #[test]
    fn derives_rtp_time_from_origin_by_stride() {
        let stream = StreamHandle::default();
        stream.set_key(SessionKey::new([0x42; 32]));
        stream.set_fmtp(fmtp());
        stream.set_origin(SeqNum(1), RtpTimestamp(100_000));

        let aad = [0u8, 8, 0, 0]; // seq = 8
        let plaintext = vec![0x11u8; crate::alac::OUTPUT_LEN];
        let packet = cipher::encipher(&aad, &plaintext, [0u8; 8], &stream.key().unwrap());

        let mut decoder = PassthroughAlac;
        let stats = Stats::default();
        let frame = build_frame(&packet, &stream, &mut decoder, Instant::now(), &stats).expect("frame built");

        assert_eq!(frame.seq, SeqNum(8));
        assert_eq!(frame.rtp_time, RtpTimestamp(100_000 + 7 * FRAME_SAMPLES as u32));
    }

    #[test]
    fn missing_session_key_is_rejected() {
        let stream = StreamHandle::default();
        let mut decoder = PassthroughAlac;
        let stats = Stats::default();
        let packet = vec![0u8; 32];
        assert!(build_frame(&packet, &stream, &mut decoder, Instant::now(), &stats).is_err());
    }

    #[test]
    fn cipher_failure_increments_stats_and_is_rejected() {
        let stream = StreamHandle::default();
        stream.set_key(SessionKey::new([0x42; 32]));
        stream.set_fmtp(fmtp());
        stream.set_origin(SeqNum(0), RtpTimestamp(0));

        let mut packet = vec![0u8; 4 + 16 + 8 + 10];
        packet[4] ^= 0xFF;
        let mut decoder = PassthroughAlac;
        let stats = Stats::default();
        assert!(build_frame(&packet, &stream, &mut decoder, Instant::now(), &stats).is_err());
        assert_eq!(stats.cipher_failures(), 1);
    }

    #[tokio::test]
    async fn out_of_order_arrival_drains_in_rtp_order() {
        let stream = StreamHandle::default();
        stream.set_key(SessionKey::new([0x07; 32]));
        stream.set_fmtp(fmtp());
        stream.set_origin(SeqNum(1), RtpTimestamp(0));

        let key = stream.key().unwrap();
        let mut rack = Rack::new(16, Duration::from_secs(60));
        let mut decoder = PassthroughAlac;
        let stats = Stats::default();

        for seq in [3u16, 1, 2] {
            let aad = seq.to_be_bytes();
            let aad = [aad[0], aad[1], 0, 0];
            let plaintext = vec![0x22u8; crate::alac::OUTPUT_LEN];
            let packet = cipher::encipher(&aad, &plaintext, [0u8; 8], &key);
            let frame = build_frame(&packet, &stream, &mut decoder, Instant::now(), &stats).expect("frame built");
            rack.insert(frame, Instant::now()).unwrap();
        }
        rack.rack_wip();

        let (tx, mut rx) = mpsc::channel(16);
        drain_ready(&mut rack, &tx).await;
        drop(tx);

        let mut rtp_times = Vec::new();
        while let Some(frame) = rx.recv().await {
            rtp_times.push(frame.rtp_time.0);
        }
        assert_eq!(rtp_times, vec![0, FRAME_SAMPLES as u32, 2 * FRAME_SAMPLES as u32]);
    }

    #[test]
    fn note_gaps_records_every_skipped_seq() {
        let mut next_seq = Some(SeqNum(1));
        let mut gaps = Vec::new();
        note_gaps(&mut next_seq, &mut gaps, SeqNum(4), Instant::now());
        let missing: Vec<u16> = gaps.iter().map(|g| g.seq.0).collect();
        assert_eq!(missing, vec![1, 2, 3]);
        assert_eq!(next_seq, Some(SeqNum(5)));
    }

    #[tokio::test]
    async fn stale_gaps_raise_one_request_each_and_are_forgotten() {
        let old = Instant::now() - Duration::from_millis(500);
        let mut gaps = vec![
            PendingGap { seq: SeqNum(5), noticed_at: old },
            PendingGap { seq: SeqNum(6), noticed_at: Instant::now() },
        ];
        let (tx, mut rx) = mpsc::channel(8);
        raise_stale_gaps(&mut gaps, Duration::from_millis(200), &tx).await;

        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].seq, SeqNum(6));
        let req = rx.try_recv().expect("one retransmit request raised");
        assert_eq!(req.missing_seq, SeqNum(5));
        assert!(rx.try_recv().is_err());
    }
}
