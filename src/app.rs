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

//! Spawns the fixed set of cooperative contexts (RTSP session, audio-data
//! receiver, control receiver, scheduler, DMX link, clock peer) inside a
//! single [`tokio_graceful_shutdown::Toplevel`], one subsystem per
//! context, per the concurrency model: no component gets its own OS
//! thread or runtime, they all cooperate on one event loop.

use std::error::Error;
use tokio::sync::mpsc;
use tokio_graceful_shutdown::{AsyncSubsysFn, SubsystemBuilder, SubsystemHandle, Toplevel};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub enum AppState {
    Started,
    TerminatedNormally,
    Crashed(Box<dyn Error + Send + Sync>),
}

/// Registers `subsystem` under `name` on the shared `toplevel`. Every
/// context here shares the caller's runtime rather than getting its own
/// thread and runtime; isolation comes from the subsystem boundary and
/// cancellation token, not a thread.
pub fn spawn_subsystem<Err, Subsys>(
    top: &mut SubsystemHandle,
    name: impl Into<String>,
    subsystem: Subsys,
) -> mpsc::Receiver<AppState>
where
    Subsys: 'static + for<'b> AsyncSubsysFn<&'b mut SubsystemHandle, Result<(), Err>>,
    Err: std::error::Error + Send + Sync + 'static,
{
    let name = name.into();
    let (state_tx, state_rx) = mpsc::channel(1);

    let started_name = name.clone();
    top.start(SubsystemBuilder::new(name, async move |s: &mut SubsystemHandle| {
        info!("subsystem '{}' starting …", started_name);
        state_tx.send(AppState::Started).await.ok();
        let res = subsystem(s).await;
        match &res {
            Ok(()) => {
                info!("subsystem '{}' stopped.", started_name);
                state_tx.send(AppState::TerminatedNormally).await.ok();
            }
            Err(e) => {
                error!("subsystem '{}' crashed: {e}", started_name);
                state_tx
                    .send(AppState::Crashed(Box::new(std::io::Error::other(
                        e.to_string(),
                    ))))
                    .await
                    .ok();
            }
        }
        res
    }));

    state_rx
}

pub async fn wait_for_start(name: &str, state: &mut mpsc::Receiver<AppState>) -> bool {
    match state.recv().await {
        Some(AppState::Started) => true,
        _ => {
            error!("subsystem '{name}' terminated before it finished starting");
            false
        }
    }
}

/// Runs every registered subsystem to completion, driven by
/// `shutdown_token`. `register` is async so it can `wait_for_start` one
/// subsystem before spawning the next, giving callers an ordering
/// guarantee between subsystems that depend on each other.
pub async fn run_toplevel(
    shutdown_token: CancellationToken,
    register: impl AsyncFnOnce(&mut SubsystemHandle) + Send + 'static,
) -> Result<(), tokio_graceful_shutdown::errors::GracefulShutdownError> {
    Toplevel::new_with_shutdown_token(
        async move |s: &mut SubsystemHandle| {
            register(s).await;
        },
        shutdown_token,
    )
    .handle_shutdown_requests(std::time::Duration::from_secs(1))
    .await
}
