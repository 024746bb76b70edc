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

//! The control receiver (C9): a UDP socket allocated at `SETUP`
//! carrying RTCP-style control packets — retransmit responses, timing
//! pings — plus the outgoing half, retransmit requests, that C8 raises
//! when it notices a gap in the RTP sequence. Header is `vpm(1) type(1)
//! length(2 BE in 32-bit words)`; a retransmit response's payload
//! past that header is itself a regular audio-data wire packet, run
//! through the same decipher/decode pipeline as C8 and fed back into
//! the same reel.

use crate::{
    alac::AlacDecoder,
    audio_receiver::build_frame,
    error::PierreResult,
    frame::{Frame, SeqNum},
    stats::Stats,
    stream_state::StreamHandle,
};
use std::{net::SocketAddr, time::Instant};
use tokio::{net::UdpSocket, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

const HEADER_LEN: usize = 4;
/// Real-world RAOP control-channel type bytes (marker bit masked off).
const TYPE_TIMING_SYNC: u8 = 0x54;
const TYPE_RETRANSMIT_REQUEST: u8 = 0x55;
const TYPE_RETRANSMIT_RESPONSE: u8 = 0x56;

/// Raised by C8 when a gap in the RTP sequence has gone unfilled past
/// the retransmit threshold.
#[derive(Debug, Clone, Copy)]
pub struct RetransmitRequest {
    pub missing_seq: SeqNum,
    pub count: u16,
}

/// Runs the control-channel loop: forwards queued retransmit requests
/// out over UDP to the last-seen peer, and dispatches inbound datagrams
/// by control type until `cancel` fires.
pub async fn run<D: AlacDecoder>(
    socket: UdpSocket,
    stream: StreamHandle,
    mut decoder: D,
    recovered_tx: mpsc::Sender<Frame>,
    mut request_rx: mpsc::Receiver<RetransmitRequest>,
    stats: Stats,
    cancel: CancellationToken,
) -> PierreResult<()> {
    let mut peer: Option<SocketAddr> = None;
    let mut buf = vec![0u8; 2048];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            request = request_rx.recv() => {
                match request {
                    Some(req) => {
                        if let Some(addr) = peer {
                            let datagram = encode_retransmit_request(req);
                            if let Err(e) = socket.send_to(&datagram, addr).await {
                                warn!(error = %e, "failed to send retransmit request");
                            }
                        } else {
                            trace!("retransmit request dropped, no known peer yet");
                        }
                    }
                    None => break,
                }
            }
            result = socket.recv_from(&mut buf) => {
                let (len, addr) = result?;
                peer = Some(addr);
                dispatch(&buf[..len], &stream, &mut decoder, &recovered_tx, &stats).await;
            }
        }
    }

    Ok(())
}

async fn dispatch<D: AlacDecoder>(
    datagram: &[u8],
    stream: &StreamHandle,
    decoder: &mut D,
    recovered_tx: &mpsc::Sender<Frame>,
    stats: &Stats,
) {
    if datagram.len() < HEADER_LEN {
        warn!("control datagram too short for header");
        return;
    }
    let control_type = datagram[1] & 0x7f;
    let payload = &datagram[HEADER_LEN..];

    match control_type {
        TYPE_RETRANSMIT_RESPONSE => {
            match build_frame(payload, stream, decoder, Instant::now(), stats) {
                Ok(frame) => {
                    debug!(seq = frame.seq.0, "retransmit response recovered a frame");
                    let _ = recovered_tx.send(frame).await;
                }
                Err(_) => warn!("retransmit response failed decipher/decode"),
            }
        }
        TYPE_TIMING_SYNC => {
            trace!("timing sync packet received");
        }
        other => {
            trace!(control_type = other, "ignoring unrecognized control packet type");
        }
    }
}

fn encode_retransmit_request(req: RetransmitRequest) -> Vec<u8> {
    let payload_words = 1u16; // missing_seq(2) + count(2), in 32-bit words
    let mut datagram = Vec::with_capacity(HEADER_LEN + 4);
    datagram.push(0x80); // version 2, no padding, no marker
    datagram.push(TYPE_RETRANSMIT_REQUEST);
    datagram.extend_from_slice(&payload_words.to_be_bytes());
    datagram.extend_from_slice(&req.missing_seq.0.to_be_bytes());
    datagram.extend_from_slice(&req.count.to_be_bytes());
    datagram
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{alac::FmtpConfig, alac::PassthroughAlac, cipher, cipher::SessionKey, frame::RtpTimestamp};

    #[test]
    fn encodes_header_and_payload() {
        let datagram = encode_retransmit_request(RetransmitRequest {
            missing_seq: SeqNum(42),
            count: 3,
        });
        assert_eq!(datagram.len(), HEADER_LEN + 4);
        assert_eq!(datagram[1], TYPE_RETRANSMIT_REQUEST);
        assert_eq!(u16::from_be_bytes([datagram[4], datagram[5]]), 42);
        assert_eq!(u16::from_be_bytes([datagram[6], datagram[7]]), 3);
    }

    #[tokio::test]
    async fn retransmit_response_is_decoded_and_forwarded() {
        let stream = StreamHandle::default();
        let key = SessionKey::new([0x5A; 32]);
        stream.set_key(key.clone());
        stream.set_fmtp(FmtpConfig([0; 12]));
        stream.set_origin(SeqNum(1), RtpTimestamp(0));

        let aad = [0u8, 9, 0, 0]; // seq = 9
        let plaintext = vec![0x33u8; crate::alac::OUTPUT_LEN];
        let packet = cipher::encipher(&aad, &plaintext, [0u8; 8], &key);

        let mut datagram = vec![0x80, TYPE_RETRANSMIT_RESPONSE, 0, 0];
        datagram.extend_from_slice(&packet);

        let (tx, mut rx) = mpsc::channel(4);
        let stats = Stats::default();
        let mut decoder = PassthroughAlac;
        dispatch(&datagram, &stream, &mut decoder, &tx, &stats).await;

        let frame = rx.recv().await.expect("frame forwarded");
        assert_eq!(frame.seq, SeqNum(9));
    }

    #[tokio::test]
    async fn timing_sync_is_ignored_without_panicking() {
        let stream = StreamHandle::default();
        let (tx, mut rx) = mpsc::channel(4);
        let stats = Stats::default();
        let mut decoder = PassthroughAlac;
        let datagram = [0x80, TYPE_TIMING_SYNC, 0, 0];
        dispatch(&datagram, &stream, &mut decoder, &tx, &stats).await;
        assert!(rx.try_recv().is_err());
    }
}
