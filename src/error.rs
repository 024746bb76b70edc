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

//! Error taxonomy, one enum per subsystem, mirroring the layering the rest
//! of the crate uses: per-frame failures are recoverable and are folded
//! into [`frame::FrameState`](crate::frame::FrameState), session-fatal
//! failures propagate out of the owning context and reset the session.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("invalid IP address: {0}")]
    InvalidIp(#[from] std::net::AddrParseError),
    #[error("receiver not configured")]
    MissingReceiverConfig,
}

#[derive(Error, Debug)]
pub enum ClockError {
    #[error("PTP peer unavailable: {0}")]
    PeerUnavailable(String),
    #[error("clock is stale: last sample {age_ms} ms old, max age {max_age_ms} ms")]
    Stale { age_ms: u64, max_age_ms: u64 },
}

pub type ClockResult<T> = Result<T, ClockError>;

#[derive(Error, Debug)]
pub enum CipherError {
    #[error("deciphering failed: AEAD tag mismatch")]
    DecipherFailure,
    #[error("packet too short to contain a header, tag and nonce")]
    PacketTooShort,
    #[error("no shared session key established")]
    NoSharedKey,
}

pub type CipherResult<T> = Result<T, CipherError>;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("ALAC decode failure: {0}")]
    DecodeFailure(String),
}

pub type DecodeResult<T> = Result<T, DecodeError>;

#[derive(Error, Debug)]
pub enum RackError {
    #[error("rack collision: an entry already exists for this key")]
    RackCollision,
    #[error("work-in-progress reel exceeded its allotted window")]
    RackWipTimeout,
    #[error("work-in-progress reel was racked incomplete")]
    RackWipIncomplete,
}

pub type RackResult<T> = Result<T, RackError>;

/// Terminal, non-fatal dispositions a [`frame::Frame`](crate::frame::Frame)
/// can land in. Kept as a distinct error type (rather than folded into
/// `RackError`) because these are routine per-tick outcomes, not faults.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame deadline has already passed")]
    Outdated,
    #[error("frame deadline is further out than the scheduling window")]
    Future,
    #[error("frame was discarded by a FLUSH")]
    Flushed,
    #[error("frame is malformed or was never fully assembled")]
    Invalid,
}

pub type FrameResult<T> = Result<T, FrameError>;

#[derive(Error, Debug)]
pub enum RtspError {
    #[error("failed to parse RTSP request: {0}")]
    ParseFailure(String),
    #[error("authentication required")]
    AuthRequired,
    #[error("no shared session key established")]
    NoSharedKey,
    #[error("method not implemented: {0}")]
    NotImplemented(String),
    #[error("FairPlay oracle rejected the request")]
    Unauthorized,
    #[error("malformed property list body: {0}")]
    InvalidPlist(#[from] plist::Error),
}

pub type RtspResult<T> = Result<T, RtspError>;

#[derive(Error, Debug)]
pub enum DmxError {
    #[error("no connection to the remote light controller")]
    NoConn,
    #[error("I/O operation canceled")]
    IoCanceled,
    #[error("I/O error: {0}")]
    IoOther(#[from] io::Error),
    #[error("failed to encode DataMsg: {0}")]
    EncodeFailure(#[from] rmp_serde::encode::Error),
}

pub type DmxResult<T> = Result<T, DmxError>;

/// Crate-wide union, used only at the few seams (e.g. `main`) that need to
/// report a single error type across subsystems. Each variant boxes its
/// payload to keep this enum small.
#[derive(Error, Debug)]
pub enum PierreError {
    #[error("configuration error: {0}")]
    Config(#[from] Box<ConfigError>),
    #[error("clock error: {0}")]
    Clock(#[from] Box<ClockError>),
    #[error("cipher error: {0}")]
    Cipher(#[from] Box<CipherError>),
    #[error("decode error: {0}")]
    Decode(#[from] Box<DecodeError>),
    #[error("rack error: {0}")]
    Rack(#[from] Box<RackError>),
    #[error("RTSP error: {0}")]
    Rtsp(#[from] Box<RtspError>),
    #[error("DMX link error: {0}")]
    Dmx(#[from] Box<DmxError>),
    #[error("I/O error: {0}")]
    Io(#[from] Box<io::Error>),
}

impl From<ConfigError> for PierreError {
    fn from(value: ConfigError) -> Self {
        PierreError::Config(Box::new(value))
    }
}

impl From<ClockError> for PierreError {
    fn from(value: ClockError) -> Self {
        PierreError::Clock(Box::new(value))
    }
}

impl From<RtspError> for PierreError {
    fn from(value: RtspError) -> Self {
        PierreError::Rtsp(Box::new(value))
    }
}

impl From<DmxError> for PierreError {
    fn from(value: DmxError) -> Self {
        PierreError::Dmx(Box::new(value))
    }
}

impl From<io::Error> for PierreError {
    fn from(value: io::Error) -> Self {
        PierreError::Io(Box::new(value))
    }
}

pub type PierreResult<T> = Result<T, PierreError>;
