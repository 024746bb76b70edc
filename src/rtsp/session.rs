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

//! The RTSP session state machine (C7): `Unpaired → Pairing → Paired →
//! SetupComplete → Recording → Teardown`. One `Session` per TCP
//! connection, owned exclusively by that connection's context.

use super::{
    message::{Reply, RespCode, Request, content_type},
    oracle::PairingOracle,
};
use crate::{
    alac::FmtpConfig,
    anchor::{AnchorData, AnchorHandle},
    context::{RenderFlag, StatusFlags},
    frame::{RtpTimestamp, SeqNum},
    rack::FlushInfo,
    stats::Stats,
    stream_state::StreamHandle,
};
use plist::{Dictionary, Value};
use std::io::Cursor;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Unpaired,
    Pairing,
    Paired,
    SetupComplete,
    Recording,
    Teardown,
}

/// Ports allocated at `SETUP` and advertised back to the sender.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamPorts {
    pub audio_data: u16,
    pub control: u16,
}

pub struct Session<O: PairingOracle> {
    state: State,
    oracle: O,
    setup_round: u32,
    verify_round: u32,
    stream: StreamHandle,
    ports: StreamPorts,
    group_uuid: Option<String>,
    group_contains_leader: bool,
    anchor: AnchorHandle,
    render: RenderFlag,
    status: StatusFlags,
    stats: Stats,
    sample_rate: u32,
}

impl<O: PairingOracle> Session<O> {
    pub fn new(
        oracle: O,
        stream: StreamHandle,
        ports: StreamPorts,
        anchor: AnchorHandle,
        render: RenderFlag,
        status: StatusFlags,
        stats: Stats,
        sample_rate: u32,
    ) -> Self {
        Session {
            state: State::Unpaired,
            oracle,
            setup_round: 0,
            verify_round: 0,
            stream,
            ports,
            group_uuid: None,
            group_contains_leader: false,
            anchor,
            render,
            status,
            stats,
            sample_rate,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// A handle to the key/`fmtp`/origin/flush state this session
    /// negotiates, shared with the audio-data receiver (C8) that
    /// consumes it over its own TCP connection.
    pub fn stream(&self) -> &StreamHandle {
        &self.stream
    }

    pub fn session_key(&self) -> Option<crate::cipher::SessionKey> {
        self.stream.key()
    }

    pub fn fmtp(&self) -> Option<FmtpConfig> {
        self.stream.fmtp()
    }

    /// Takes and clears any `FLUSH`/`FLUSHBUFFERED` recorded since the
    /// last call, for the buffering layer to apply on its next pass.
    pub fn take_pending_flush(&mut self) -> Option<FlushInfo> {
        self.stream.take_flush()
    }

    pub fn handle(&mut self, req: &Request) -> Reply {
        let reply = match (req.method.as_str(), req.path.as_str()) {
            ("POST", "/pair-setup") => self.handle_pair_setup(req),
            ("POST", "/pair-verify") => self.handle_pair_verify(req),
            ("SETUP", _) => self.handle_setup(req),
            ("GET_PARAMETER", _) => Ok(Reply::empty(RespCode::Ok, req.cseq)),
            ("SET_PARAMETER", _) => Ok(Reply::empty(RespCode::Ok, req.cseq)),
            ("RECORD", _) => self.handle_record(req),
            ("FLUSH", _) | ("FLUSHBUFFERED", _) => self.handle_flush(req),
            ("TEARDOWN", _) => self.handle_teardown(req),
            ("POST", "/feedback") => Ok(Reply::empty(RespCode::Ok, req.cseq)),
            ("POST", "/command") => self.handle_command(req),
            ("SETPEERS", _) => Ok(Reply::empty(RespCode::Ok, req.cseq)),
            ("ANCHOR", _) => self.handle_anchor(req),
            ("GET", "/info") => Ok(self.handle_info(req)),
            (method, _) => Err((RespCode::NotImplemented, format!("unhandled method {method}"))),
        };

        reply.unwrap_or_else(|(code, reason)| {
            warn!(method = %req.method, path = %req.path, %reason, "RTSP request rejected");
            Reply::empty(code, req.cseq)
        })
    }

    fn handle_pair_setup(&mut self, req: &Request) -> Result<Reply, (RespCode, String)> {
        self.state = State::Pairing;
        self.setup_round += 1;
        let result = self.oracle.setup(self.setup_round, &req.body);
        if result.complete {
            self.state = State::Paired;
            info!("pairing complete");
        }
        Ok(Reply::with_body(
            RespCode::Ok,
            req.cseq,
            content_type::OCTET_STREAM,
            result.response,
        ))
    }

    fn handle_pair_verify(&mut self, req: &Request) -> Result<Reply, (RespCode, String)> {
        if self.state != State::Paired && self.state != State::Pairing {
            return Err((RespCode::AuthRequired, "pair-setup not complete".into()));
        }
        self.verify_round += 1;
        let (response, key) = self.oracle.verify(self.verify_round, &req.body);
        if let Some(key) = key {
            self.stream.set_key(key);
            self.state = State::Paired;
            info!("session key established");
        }
        Ok(Reply::with_body(
            RespCode::Ok,
            req.cseq,
            content_type::OCTET_STREAM,
            response,
        ))
    }

    fn handle_setup(&mut self, req: &Request) -> Result<Reply, (RespCode, String)> {
        if self.stream.key().is_none() {
            return Err((RespCode::AuthRequired, "no shared session key".into()));
        }

        let plist = parse_plist(&req.body)?;
        let dict = plist
            .as_dictionary()
            .ok_or_else(|| (RespCode::BadRequest, "SETUP body is not a dictionary".into()))?;

        let mut reply_dict = Dictionary::new();

        if let Some(Value::Array(streams)) = dict.get("streams") {
            if let Some(fmtp) = streams.first().and_then(|s| s.as_dictionary()).and_then(parse_fmtp) {
                self.stream.set_fmtp(fmtp);
            }
            reply_dict.insert(
                "streams".into(),
                Value::Array(vec![{
                    let mut stream = Dictionary::new();
                    stream.insert("dataPort".into(), Value::Integer((self.ports.audio_data as i64).into()));
                    stream.insert("controlPort".into(), Value::Integer((self.ports.control as i64).into()));
                    Value::Dictionary(stream)
                }]),
            );
        }

        let has_timing = dict.get("timingProtocol").is_some();
        if has_timing {
            if dict.get("timingProtocol").and_then(Value::as_string) != Some("PTP") {
                return Err((RespCode::BadRequest, "unsupported timing protocol".into()));
            }
            if let Some(uuid) = dict.get("groupUUID").and_then(Value::as_string) {
                self.group_uuid = Some(uuid.to_owned());
            }
            self.group_contains_leader = dict
                .get("groupContainsGroupLeader")
                .and_then(Value::as_boolean)
                .unwrap_or(false);
        }

        if dict.get("streams").is_some() || has_timing {
            self.state = State::SetupComplete;
        }

        let mut body = Vec::new();
        Value::Dictionary(reply_dict)
            .to_writer_binary(&mut body)
            .map_err(|e| (RespCode::InternalServerError, e.to_string()))?;

        Ok(Reply::with_body(RespCode::Ok, req.cseq, content_type::BINARY_PLIST, body))
    }

    fn handle_record(&mut self, req: &Request) -> Result<Reply, (RespCode, String)> {
        if self.state != State::SetupComplete {
            return Err((RespCode::AuthRequired, "SETUP not complete".into()));
        }
        if let Some((seq, rtp_time)) = req.header("RTP-Info").and_then(parse_rtpinfo) {
            self.stream.set_origin(SeqNum(seq), RtpTimestamp(rtp_time));
        }
        self.state = State::Recording;
        self.render.enable();
        self.status.playing();
        info!("session recording");
        Ok(Reply::empty(RespCode::Ok, req.cseq))
    }

    fn handle_flush(&mut self, req: &Request) -> Result<Reply, (RespCode, String)> {
        let (until_seq, until_rtp) = req
            .header("RTP-Info")
            .and_then(parse_rtpinfo)
            .unwrap_or((0, 0));
        self.stream.set_flush(FlushInfo {
            until_seq: SeqNum(until_seq),
            until_rtp: RtpTimestamp(until_rtp),
        });
        Ok(Reply::empty(RespCode::Ok, req.cseq))
    }

    fn handle_teardown(&mut self, req: &Request) -> Result<Reply, (RespCode, String)> {
        self.state = State::Teardown;
        self.stream.clear();
        self.render.disable();
        self.status.reset();
        self.state = State::Unpaired;
        info!("session torn down");
        Ok(Reply::empty(RespCode::Ok, req.cseq))
    }

    fn handle_command(&mut self, req: &Request) -> Result<Reply, (RespCode, String)> {
        let plist = parse_plist(&req.body)?;
        let is_unsupported_mr_command = plist
            .as_dictionary()
            .and_then(|d| d.get("type"))
            .and_then(Value::as_string)
            == Some("updateMRSupportedCommands");

        if is_unsupported_mr_command {
            return Ok(Reply::empty(RespCode::BadRequest, req.cseq));
        }
        Ok(Reply::empty(RespCode::Ok, req.cseq))
    }

    fn handle_anchor(&mut self, req: &Request) -> Result<Reply, (RespCode, String)> {
        let plist = parse_plist(&req.body)?;
        let dict = plist
            .as_dictionary()
            .ok_or_else(|| (RespCode::BadRequest, "ANCHOR body is not a dictionary".into()))?;

        let clock_id = as_u64(dict.get("clockID")).unwrap_or(0);
        let rtp_time = as_u64(dict.get("rtpTime")).unwrap_or(0) as u32;
        let net_time = as_u64(dict.get("networkTime")).unwrap_or(0);

        self.anchor.update(
            AnchorData {
                clock_id,
                anchor_rtp_time: rtp_time,
                anchor_net_time: net_time,
                valid_until: std::time::Duration::from_secs(60),
            },
            crate::time::ClockInfo {
                clock_id,
                mastership_start_time: 0,
                raw_offset: 0,
                sample_time: std::time::Instant::now(),
            },
            std::time::Instant::now(),
            self.sample_rate,
        );

        Ok(Reply::empty(RespCode::Ok, req.cseq))
    }

    fn handle_info(&self, req: &Request) -> Reply {
        let mut dict = Dictionary::new();
        dict.insert("statusFlags".into(), Value::Integer((self.status.bits() as i64).into()));
        let mut body = Vec::new();
        if Value::Dictionary(dict).to_writer_binary(&mut body).is_err() {
            return Reply::empty(RespCode::InternalServerError, req.cseq);
        }
        Reply::with_body(RespCode::Ok, req.cseq, content_type::BINARY_PLIST, body)
    }
}

fn as_u64(value: Option<&Value>) -> Option<u64> {
    value.and_then(Value::as_integer).and_then(|i| i.as_unsigned())
}

fn parse_plist(body: &[u8]) -> Result<Value, (RespCode, String)> {
    if body.is_empty() {
        return Ok(Value::Dictionary(Dictionary::new()));
    }
    Value::from_reader(Cursor::new(body)).map_err(|e| (RespCode::BadRequest, e.to_string()))
}

/// `RTP-Info: seq=1234;rtptime=5678` — the pair `RECORD` uses to seed the
/// stream origin and `FLUSH` uses as the eviction cutoff.
fn parse_rtpinfo(header: &str) -> Option<(u16, u32)> {
    let mut seq = None;
    let mut rtptime = None;
    for field in header.split(';') {
        let field = field.trim();
        if let Some(v) = field.strip_prefix("seq=") {
            seq = v.parse().ok();
        } else if let Some(v) = field.strip_prefix("rtptime=") {
            rtptime = v.parse().ok();
        }
    }
    Some((seq?, rtptime.unwrap_or(0)))
}

/// `fmtp` is carried as a 12-element integer array on the first stream
/// dictionary (the classic RAOP `a=fmtp` SDP attribute, reused here as a
/// plist array since this transport has no SDP).
fn parse_fmtp(stream: &Dictionary) -> Option<FmtpConfig> {
    let values = stream.get("fmtp")?.as_array()?;
    if values.len() != 12 {
        return None;
    }
    let mut out = [0i64; 12];
    for (slot, v) in out.iter_mut().zip(values) {
        *slot = v.as_integer()?.as_signed()?;
    }
    Some(FmtpConfig(out))
}
