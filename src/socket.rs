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

//! TCP listener setup shared by the RTSP session context (C7) and the
//! per-session audio-data receiver (C8): reuse-address, keepalive and
//! a user timeout configured from [`SocketConfig`], nodelay on since
//! every payload here is latency-sensitive.

use crate::config::SocketConfig;
use miette::{IntoDiagnostic, Result};
use socket2::{Domain, Protocol as SockProto, SockAddr, Socket, TcpKeepalive, Type};
use std::net::{IpAddr, SocketAddr, TcpListener};
use tracing::instrument;

#[instrument(skip(config))]
pub fn init_tcp_socket(bind_addr: IpAddr, port: u16, config: SocketConfig) -> Result<TcpListener> {
    let addr = SocketAddr::new(bind_addr, port);

    let mut tcp_keepalive = TcpKeepalive::new();
    if let Some(keepalive) = config.keepalive_time {
        tcp_keepalive = tcp_keepalive.with_time(keepalive);
    }
    if let Some(keepalive) = config.keepalive_interval {
        tcp_keepalive = tcp_keepalive.with_interval(keepalive);
    }
    if let Some(retries) = config.keepalive_retries {
        tcp_keepalive = tcp_keepalive.with_retries(retries);
    }
    let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
    let socket = Socket::new(domain, Type::STREAM, Some(SockProto::TCP)).into_diagnostic()?;

    socket.set_reuse_address(true).into_diagnostic()?;
    socket.set_nonblocking(true).into_diagnostic()?;
    socket.set_keepalive(true).into_diagnostic()?;
    socket.set_tcp_keepalive(&tcp_keepalive).into_diagnostic()?;
    socket
        .set_tcp_user_timeout(config.user_timeout)
        .into_diagnostic()?;
    socket.set_tcp_nodelay(true).into_diagnostic()?;
    socket.bind(&SockAddr::from(addr)).into_diagnostic()?;
    socket.listen(1024).into_diagnostic()?;
    let listener = socket.into();

    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn binds_to_an_ephemeral_port() {
        let listener = init_tcp_socket(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            0,
            SocketConfig::default(),
        )
        .expect("socket binds");
        assert!(listener.local_addr().unwrap().port() > 0);
    }
}
