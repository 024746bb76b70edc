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

//! FairPlay pairing, modeled as an opaque oracle — the FairPlay
//! bitstream itself is out of scope. `pair-setup` may take several
//! rounds before it signals completion; `pair-verify` yields the
//! session key on its final round.

use crate::cipher::SessionKey;

/// What a `pair-setup`/`pair-verify` round produces: bytes to send
/// back to the sender, and whether this round completed the exchange.
pub struct OracleReply {
    pub response: Vec<u8>,
    pub complete: bool,
}

pub trait PairingOracle: Send {
    /// One `pair-setup` round. `round` is this call's 1-based index
    /// into the two-round exchange.
    fn setup(&mut self, round: u32, body: &[u8]) -> OracleReply;

    /// One `pair-verify` round. Returns the negotiated session key once
    /// the exchange completes; `None` while more rounds are needed.
    fn verify(&mut self, round: u32, body: &[u8]) -> (Vec<u8>, Option<SessionKey>);
}

/// Deterministic stand-in sufficient to drive the state machine and
/// tests end-to-end: two-round setup, single-round verify that derives
/// a session key from the request body so tests can assert on it.
#[derive(Debug, Default)]
pub struct DeterministicOracle;

impl PairingOracle for DeterministicOracle {
    fn setup(&mut self, round: u32, _body: &[u8]) -> OracleReply {
        OracleReply {
            response: vec![round as u8],
            complete: round >= 2,
        }
    }

    fn verify(&mut self, _round: u32, body: &[u8]) -> (Vec<u8>, Option<SessionKey>) {
        let mut key_bytes = [0u8; 32];
        for (i, b) in body.iter().take(32).enumerate() {
            key_bytes[i] = *b;
        }
        (vec![0u8; 4], Some(SessionKey::new(key_bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_completes_on_second_round() {
        let mut oracle = DeterministicOracle;
        assert!(!oracle.setup(1, b"").complete);
        assert!(oracle.setup(2, b"").complete);
    }

    #[test]
    fn verify_yields_a_session_key_immediately() {
        let mut oracle = DeterministicOracle;
        let (_resp, key) = oracle.verify(1, &[7u8; 32]);
        assert!(key.is_some());
    }
}
