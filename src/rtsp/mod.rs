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

//! The RTSP session context (C7): parser, message types, the FairPlay
//! pairing oracle seam, and the session state machine that ties them
//! together.

pub mod message;
pub mod oracle;
pub mod parser;
pub mod session;

pub use message::{Reply, RespCode, Request};
pub use oracle::{DeterministicOracle, PairingOracle};
pub use session::{Session, State, StreamPorts};
