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

//! RTSP/1.0-style request and reply types. Framing is a strict
//! subset of HTTP/1.1: a request line, an optional header block, a
//! blank line, and a `Content-Length`-delimited body.

/// Status codes this receiver ever emits, with RTSP's standard numeric
/// values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespCode {
    Ok = 200,
    BadRequest = 400,
    Unauthorized = 403,
    Unavailable = 451,
    AuthRequired = 470,
    InternalServerError = 500,
    NotImplemented = 501,
}

impl RespCode {
    pub fn reason(self) -> &'static str {
        match self {
            RespCode::Ok => "OK",
            RespCode::BadRequest => "Bad Request",
            RespCode::Unauthorized => "Unauthorized",
            RespCode::Unavailable => "Unavailable",
            RespCode::AuthRequired => "Connection Authorization Required",
            RespCode::InternalServerError => "Internal Server Error",
            RespCode::NotImplemented => "Not Implemented",
        }
    }

    pub fn code(self) -> u16 {
        self as u16
    }
}

pub mod content_type {
    pub const OCTET_STREAM: &str = "application/octet-stream";
    pub const BINARY_PLIST: &str = "application/x-apple-binary-plist";
    pub const PARAMETERS: &str = "text/parameters";
}

/// A parsed request: request line plus headers plus body. `method` and
/// `path` are split from the request line (`SETUP rtsp://.../ RTSP/1.0`
/// for most methods; `POST /pair-setup` etc. for the `POST`-style
/// handlers).
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub cseq: u32,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A reply ready to serialize: status line, the handful of headers an
/// RTSP reply requires (`CSeq`, `Server`, optional `Content-Type` /
/// `Content-Length`), then the body.
#[derive(Debug, Clone)]
pub struct Reply {
    pub code: RespCode,
    pub cseq: u32,
    pub content_type: Option<&'static str>,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn empty(code: RespCode, cseq: u32) -> Self {
        Reply {
            code,
            cseq,
            content_type: None,
            body: Vec::new(),
        }
    }

    pub fn with_body(code: RespCode, cseq: u32, content_type: &'static str, body: Vec<u8>) -> Self {
        Reply {
            code,
            cseq,
            content_type: Some(content_type),
            body,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!(
            "RTSP/1.0 {} {}\r\nCSeq: {}\r\nServer: pierre\r\n",
            self.code.code(),
            self.code.reason(),
            self.cseq
        )
        .into_bytes();

        if let Some(ct) = self.content_type {
            out.extend_from_slice(format!("Content-Type: {ct}\r\n").as_bytes());
        }
        out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", self.body.len()).as_bytes());
        out.extend_from_slice(&self.body);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_serializes_status_line_and_headers() {
        let reply = Reply::empty(RespCode::Ok, 7);
        let bytes = reply.to_bytes();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("RTSP/1.0 200 OK\r\n"));
        assert!(text.contains("CSeq: 7\r\n"));
        assert!(text.ends_with("Content-Length: 0\r\n\r\n"));
    }

    #[test]
    fn reply_with_body_includes_content_type_and_length() {
        let reply = Reply::with_body(RespCode::Ok, 1, content_type::OCTET_STREAM, vec![1, 2, 3]);
        let text = String::from_utf8(reply.to_bytes()).unwrap();
        assert!(text.contains("Content-Type: application/octet-stream\r\n"));
        assert!(text.contains("Content-Length: 3\r\n"));
        assert!(text.ends_with("\x01\x02\x03"));
    }
}
