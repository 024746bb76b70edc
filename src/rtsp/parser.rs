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

//! Hand-rolled RTSP/1.0 request parser. No HTTP crate: the framing is a
//! strict subset (request line, headers, `Content-Length` body), simple
//! enough to model directly rather than reaching for a full protocol
//! stack.

use super::message::Request;
use crate::error::{RtspError, RtspResult};

/// Parses one request out of the front of `buf`. Returns `Ok(None)` if
/// `buf` doesn't yet hold a complete request (caller should read more
/// and retry) and `Ok(Some((request, consumed)))` otherwise.
pub fn parse_request(buf: &[u8]) -> RtspResult<Option<(Request, usize)>> {
    let Some(header_end) = find_double_crlf(buf) else {
        return Ok(None);
    };

    let header_block =
        std::str::from_utf8(&buf[..header_end]).map_err(|e| RtspError::ParseFailure(e.to_string()))?;
    let mut lines = header_block.split("\r\n");

    let request_line = lines
        .next()
        .ok_or_else(|| RtspError::ParseFailure("empty request".into()))?;
    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| RtspError::ParseFailure("missing method".into()))?
        .to_owned();
    let path = parts
        .next()
        .ok_or_else(|| RtspError::ParseFailure("missing path".into()))?
        .to_owned();

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| RtspError::ParseFailure(format!("malformed header: {line}")))?;
        headers.push((name.trim().to_owned(), value.trim().to_owned()));
    }

    let cseq = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("CSeq"))
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or(0);

    let content_length: usize = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("Content-Length"))
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or(0);

    let body_start = header_end + 4;
    if buf.len() < body_start + content_length {
        return Ok(None);
    }

    let body = buf[body_start..body_start + content_length].to_vec();
    let consumed = body_start + content_length;

    Ok(Some((
        Request {
            method,
            path,
            cseq,
            headers,
            body,
        },
        consumed,
    )))
}

fn find_double_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_line_headers_and_cseq() {
        let raw = b"SETUP rtsp://10.0.0.1/ RTSP/1.0\r\nCSeq: 3\r\nContent-Length: 0\r\n\r\n";
        let (req, consumed) = parse_request(raw).unwrap().unwrap();
        assert_eq!(req.method, "SETUP");
        assert_eq!(req.cseq, 3);
        assert_eq!(consumed, raw.len());
    }

    #[test]
    fn waits_for_full_body_before_returning() {
        let raw = b"POST /pair-setup RTSP/1.0\r\nContent-Length: 10\r\n\r\n12345";
        assert!(parse_request(raw).unwrap().is_none());
    }

    #[test]
    fn extracts_body_once_fully_buffered() {
        let raw = b"POST /pair-setup RTSP/1.0\r\nCSeq: 1\r\nContent-Length: 5\r\n\r\nhello";
        let (req, consumed) = parse_request(raw).unwrap().unwrap();
        assert_eq!(req.body, b"hello");
        assert_eq!(consumed, raw.len());
    }

    #[test]
    fn malformed_header_is_rejected() {
        let raw = b"SETUP / RTSP/1.0\r\nnotaheader\r\n\r\n";
        assert!(parse_request(raw).is_err());
    }
}
