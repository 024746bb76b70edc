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

//! Remote DMX link (C12): a persistent TCP connection to the light
//! controller, one message in flight at a time, with exponential
//! backoff (capped at 1 s) on write failure.

use crate::{
    config::DmxConfig,
    error::{DmxError, DmxResult},
    stats::Stats,
    units::DataMsg,
};
use std::time::Duration;
use tokio::{
    io::AsyncWriteExt,
    net::TcpStream,
    sync::mpsc,
    time::Instant,
};
use tracing::{info, warn};

const BACKOFF_CAP: Duration = Duration::from_secs(1);
const BACKOFF_START: Duration = Duration::from_millis(50);

/// Handle the render loop sends `DataMsg`s to. The actual socket lives
/// on the link's own context; this side only ever enqueues.
#[derive(Clone)]
pub struct DmxHandle {
    tx: mpsc::Sender<(Instant, DataMsg)>,
    stats: Stats,
}

impl DmxHandle {
    /// Enqueues `msg`. Non-blocking: a full queue means the link is
    /// falling behind and the oldest pending message is implicitly
    /// dropped, since only a single message may be in flight.
    pub fn send(&self, msg: DataMsg) {
        // try_send rather than send().await: the scheduler must never
        // block on the DMX link's pace.
        if self.tx.try_send((Instant::now(), msg)).is_err() {
            warn!("DMX send queue full, dropping frame's DataMsg");
            self.stats.incr_remote_dmx_qsf();
        }
    }
}

/// Runs the DMX link context to completion: connect, drain the queue
/// one message at a time, reconnect with backoff on failure. Exits
/// when `rx` closes (i.e. the handle side is dropped at TEARDOWN).
pub async fn run_dmx_context(cfg: DmxConfig, stats: Stats, mut rx: mpsc::Receiver<(Instant, DataMsg)>) {
    let mut backoff = BACKOFF_START;

    'reconnect: loop {
        let addr = format!("{}:{}", cfg.host, cfg.port);
        let mut stream = match TcpStream::connect(&addr).await {
            Ok(s) => {
                info!("connected to remote DMX controller at {addr}");
                backoff = BACKOFF_START;
                s
            }
            Err(e) => {
                warn!("failed to connect to remote DMX controller: {e}");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(BACKOFF_CAP);
                continue 'reconnect;
            }
        };

        while let Some((enqueued_at, msg)) = rx.recv().await {
            let start = Instant::now();
            match send_one(&mut stream, &msg).await {
                Ok(()) => {
                    stats.incr_remote_dmx_qok();
                    stats.record_remote_elapsed(start.elapsed());
                    stats.record_remote_roundtrip(start.saturating_duration_since(enqueued_at));
                }
                Err(e) => {
                    warn!("DMX write failed, reconnecting: {e}");
                    stats.incr_remote_dmx_qrf();
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(BACKOFF_CAP);
                    continue 'reconnect;
                }
            }
        }

        return;
    }
}

async fn send_one(stream: &mut TcpStream, msg: &DataMsg) -> DmxResult<()> {
    let encoded = rmp_serde::to_vec(msg)?;
    let len: u16 = encoded
        .len()
        .try_into()
        .map_err(|_| DmxError::IoOther(std::io::Error::other("DataMsg too large to encode")))?;

    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(&encoded).await?;
    stream.flush().await?;
    Ok(())
}

/// Creates the channel pair: the scheduler keeps the [`DmxHandle`], the
/// link context owns the receiver passed to [`run_dmx_context`].
pub fn channel(stats: Stats) -> (DmxHandle, mpsc::Receiver<(Instant, DataMsg)>) {
    let (tx, rx) = mpsc::channel(1);
    (DmxHandle { tx, stats }, rx)
}
