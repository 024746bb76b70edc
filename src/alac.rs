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

//! ALAC decoder adapter (C3). Real ALAC decoding is out of scope, the
//! same boundary that keeps this crate from reimplementing FairPlay or
//! Apple's codecs from scratch — `AlacDecoder` is
//! the seam a real binding would sit behind. `PassthroughAlac` is a
//! deterministic stand-in sufficient to drive the pipeline and its
//! tests end-to-end without a real codec dependency.

use crate::error::{DecodeError, DecodeResult};

pub const FRAME_SAMPLES: usize = 352;
pub const CHANNELS: usize = 2;
pub const BYTES_PER_SAMPLE: usize = 2;
pub const OUTPUT_LEN: usize = FRAME_SAMPLES * CHANNELS * BYTES_PER_SAMPLE;

/// The 12 `fmtp` integers captured at `SETUP`, describing the ALAC
/// stream's frame length, bit depth, and compression parameters.
#[derive(Debug, Clone, Copy)]
pub struct FmtpConfig(pub [i64; 12]);

/// One-shot decode: deciphered ALAC payload in, exactly
/// `frame_samples = 352` interleaved S16LE stereo samples out.
pub trait AlacDecoder: Send {
    fn decode(&mut self, payload: &[u8], fmtp: &FmtpConfig) -> DecodeResult<Vec<u8>>;
}

/// Stand-in decoder: treats the deciphered payload as already being
/// S16LE PCM (so the pipeline has real, spectrally interesting audio
/// to push through DSP/FX in tests), truncating or zero-padding to the
/// fixed 1408-byte output the real decoder must also produce.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughAlac;

impl AlacDecoder for PassthroughAlac {
    fn decode(&mut self, payload: &[u8], _fmtp: &FmtpConfig) -> DecodeResult<Vec<u8>> {
        if payload.is_empty() {
            return Err(DecodeError::DecodeFailure("empty ALAC payload".to_owned()));
        }

        let mut out = vec![0u8; OUTPUT_LEN];
        let n = payload.len().min(OUTPUT_LEN);
        out[..n].copy_from_slice(&payload[..n]);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmtp() -> FmtpConfig {
        FmtpConfig([0; 12])
    }

    #[test]
    fn decode_produces_exact_frame_size() {
        let mut dec = PassthroughAlac;
        let payload = vec![0x7F; OUTPUT_LEN];
        let out = dec.decode(&payload, &fmtp()).expect("decode");
        assert_eq!(out.len(), OUTPUT_LEN);
    }

    #[test]
    fn short_payload_is_zero_padded_not_rejected() {
        let mut dec = PassthroughAlac;
        let payload = vec![0x11; 10];
        let out = dec.decode(&payload, &fmtp()).expect("decode");
        assert_eq!(out.len(), OUTPUT_LEN);
        assert_eq!(&out[..10], &payload[..]);
        assert!(out[10..].iter().all(|&b| b == 0));
    }

    #[test]
    fn empty_payload_fails() {
        let mut dec = PassthroughAlac;
        assert!(dec.decode(&[], &fmtp()).is_err());
    }
}
