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

//! Pierre is an AirPlay 2 audio receiver that renders a synchronized DMX
//! light show from the decoded audio stream.
//!
//! The crate is organized around the pipeline stages described in the
//! design notes: an RTSP session establishes keys and timing, audio
//! packets are deciphered and decoded into [`frame::Frame`]s, frames are
//! ordered in a [`reel`]/[`rack`], the [`scheduler`] picks the next frame
//! against the [`anchor`]-mapped deadline, [`dsp`] extracts peaks and
//! [`fx`]/[`units`] turn them into a [`dmx`] message.

pub mod alac;
pub mod anchor;
pub mod app;
pub mod cipher;
pub mod config;
pub mod context;
pub mod dmx;
pub mod dsp;
pub mod error;
pub mod frame;
pub mod fx;
pub mod mdns;
pub mod rack;
pub mod reel;
pub mod rtsp;
pub mod scheduler;
pub mod socket;
pub mod stats;
pub mod stream_state;
pub mod time;
pub mod units;
pub mod utils;

pub mod audio_receiver;
pub mod control_receiver;
