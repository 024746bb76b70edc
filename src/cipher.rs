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

//! ChaCha20-Poly1305 deciphering of audio-data packets (C2). Wire layout
//! per packet: `AAD(4) ‖ ciphertext ‖ tag(16) ‖ nonce8(8)`. The session
//! key is set once at `pair-verify` and zeroed on `TEARDOWN`.

use crate::error::{CipherError, CipherResult};
use chacha20poly1305::{
    AeadCore, ChaCha20Poly1305, KeyInit,
    aead::{Aead, Payload},
};

pub const SESSION_KEY_LEN: usize = 32;
const TAG_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const AAD_LEN: usize = 4;
const NONCE_TAIL_LEN: usize = 8;

/// A 32-byte session key, cleared on drop so a `TEARDOWN`'d session
/// doesn't leave key material sitting in a moved-from struct.
#[derive(Clone)]
pub struct SessionKey([u8; SESSION_KEY_LEN]);

impl SessionKey {
    pub fn new(bytes: [u8; SESSION_KEY_LEN]) -> Self {
        SessionKey(bytes)
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(&self.0))
    }
}

impl Drop for SessionKey {
    fn drop(&mut self) {
        self.0.fill(0);
    }
}

/// Deciphers one audio-data packet. `packet` must be at least
/// `AAD + tag + nonce8` (28 bytes) long; the ciphertext is whatever
/// remains between the AAD and the tag.
///
/// Nonce: the 12-byte ChaCha20-Poly1305 nonce is assembled as 4 zero
/// bytes followed by the 8-byte tail of the packet.
pub fn decipher(packet: &[u8], key: &SessionKey) -> CipherResult<Vec<u8>> {
    if packet.len() < AAD_LEN + TAG_LEN + NONCE_TAIL_LEN {
        return Err(CipherError::PacketTooShort);
    }

    let aad = &packet[..AAD_LEN];
    let nonce_tail = &packet[packet.len() - NONCE_TAIL_LEN..];
    let ciphertext_and_tag = &packet[AAD_LEN..packet.len() - NONCE_TAIL_LEN];

    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes[NONCE_LEN - NONCE_TAIL_LEN..].copy_from_slice(nonce_tail);
    let nonce = chacha20poly1305::Nonce::from_slice(&nonce_bytes);

    key.cipher()
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext_and_tag,
                aad,
            },
        )
        .map_err(|_| CipherError::DecipherFailure)
}

/// Enciphers `plaintext` into the same wire layout `decipher` expects,
/// given an explicit nonce tail. Used by tests and by anything that
/// needs to round-trip-build a packet (e.g. end-to-end fixtures).
pub fn encipher(aad: &[u8; AAD_LEN], plaintext: &[u8], nonce_tail: [u8; 8], key: &SessionKey) -> Vec<u8> {
    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes[NONCE_LEN - NONCE_TAIL_LEN..].copy_from_slice(&nonce_tail);
    let nonce = chacha20poly1305::Nonce::from_slice(&nonce_bytes);

    let ciphertext_and_tag = key
        .cipher()
        .encrypt(nonce, Payload { msg: plaintext, aad })
        .expect("encryption over a valid key never fails");

    let mut packet = Vec::with_capacity(AAD_LEN + ciphertext_and_tag.len() + NONCE_TAIL_LEN);
    packet.extend_from_slice(aad);
    packet.extend_from_slice(&ciphertext_and_tag);
    packet.extend_from_slice(&nonce_tail);
    packet
}

/// Generates a random nonce tail for senders that need one; unused by
/// the receive path but kept alongside `encipher` for test fixtures.
pub fn random_nonce_tail() -> [u8; 8] {
    let full = ChaCha20Poly1305::generate_nonce(&mut rand::rngs::OsRng);
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&full[NONCE_LEN - 8..]);
    tail
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> SessionKey {
        SessionKey::new([0x42; SESSION_KEY_LEN])
    }

    #[test]
    fn round_trip_recovers_plaintext() {
        let key = test_key();
        let aad = [0xAA, 0xBB, 0xCC, 0xDD];
        let plaintext = vec![1u8; 1408];
        let nonce_tail = [1, 2, 3, 4, 5, 6, 7, 8];

        let packet = encipher(&aad, &plaintext, nonce_tail, &key);
        let out = decipher(&packet, &key).expect("decipher");
        assert_eq!(out, plaintext);
    }

    #[test]
    fn corrupted_tag_fails() {
        let key = test_key();
        let aad = [0xAA, 0xBB, 0xCC, 0xDD];
        let plaintext = vec![2u8; 16];
        let nonce_tail = [9, 9, 9, 9, 9, 9, 9, 9];

        let mut packet = encipher(&aad, &plaintext, nonce_tail, &key);
        let tag_start = packet.len() - 8 - 16;
        packet[tag_start] ^= 0x01;

        assert!(decipher(&packet, &key).is_err());
    }

    #[test]
    fn corrupted_aad_fails() {
        let key = test_key();
        let aad = [0xAA, 0xBB, 0xCC, 0xDD];
        let plaintext = vec![3u8; 16];
        let nonce_tail = [0, 0, 0, 0, 0, 0, 0, 1];

        let mut packet = encipher(&aad, &plaintext, nonce_tail, &key);
        packet[0] ^= 0x01;

        assert!(decipher(&packet, &key).is_err());
    }

    #[test]
    fn corrupted_ciphertext_fails() {
        let key = test_key();
        let aad = [0xAA, 0xBB, 0xCC, 0xDD];
        let plaintext = vec![4u8; 16];
        let nonce_tail = [0, 0, 0, 0, 0, 0, 0, 2];

        let mut packet = encipher(&aad, &plaintext, nonce_tail, &key);
        packet[4] ^= 0x01;

        assert!(decipher(&packet, &key).is_err());
    }

    #[test]
    fn corrupted_nonce_fails() {
        let key = test_key();
        let aad = [0xAA, 0xBB, 0xCC, 0xDD];
        let plaintext = vec![5u8; 16];
        let nonce_tail = [0, 0, 0, 0, 0, 0, 0, 3];

        let mut packet = encipher(&aad, &plaintext, nonce_tail, &key);
        let last = packet.len() - 1;
        packet[last] ^= 0x01;

        assert!(decipher(&packet, &key).is_err());
    }

    #[test]
    fn too_short_packet_is_rejected() {
        let key = test_key();
        assert!(matches!(
            decipher(&[0u8; 10], &key),
            Err(CipherError::PacketTooShort)
        ));
    }
}
