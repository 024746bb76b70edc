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

//! Process entry point: CLI parsing, config load, PID file, then the
//! fixed set of cooperative contexts spawned as subsystems under one
//! `Toplevel` (C1 clock peer, C7 RTSP accept loop, C10 scheduler,
//! C12 DMX link). Each RTSP connection spawns its own C8/C9 pair for
//! the lifetime of that session.

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use pierre::{
    alac::PassthroughAlac,
    anchor::AnchorHandle,
    app,
    audio_receiver::{self, AudioReceiverConfig},
    config::{Config, DmxConfig},
    context::PierreContext,
    control_receiver,
    dmx::{self, DmxHandle},
    error::PierreError,
    frame::Frame,
    mdns,
    rtsp::{self, DeterministicOracle, Session, StreamPorts},
    scheduler::{Scheduler, SchedulerConfig},
    socket,
    stats::Stats,
    stream_state::StreamHandle,
    time::{self, ClockHandle, NullPtpPeer},
    units::{DataMsg, Units},
};
use std::{collections::BTreeMap, net::IpAddr, path::PathBuf};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream, UdpSocket},
    sync::mpsc,
};
use tokio_graceful_shutdown::SubsystemHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "pierre", about = "AirPlay 2 audio receiver driving a synchronized DMX light show")]
struct Cli {
    /// TOML configuration file. Falls back to factory defaults if omitted.
    #[arg(long = "cfg-file")]
    cfg_file: Option<PathBuf>,

    /// Where to write the process id. Defaults to `pierre.pid` under `pierre.working_dir`.
    #[arg(long = "pid-file")]
    pid_file: Option<PathBuf>,

    /// Suppress the interactive startup banner (no fork: this process still
    /// owns its controlling terminal, it just behaves like it doesn't).
    #[arg(long)]
    daemon: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match &cli.cfg_file {
        Some(path) => Config::load(path).into_diagnostic()?,
        None => Config::default(),
    };

    if !cli.daemon {
        println!("pierre — starting on host {}", hostname());
    }

    let pid_path = cli
        .pid_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.pierre.working_dir).join("pierre.pid"));
    write_pid_file(&pid_path).into_diagnostic()?;

    let result = run(config).await;

    if let Err(e) = std::fs::remove_file(&pid_path) {
        warn!(error = %e, path = ?pid_path, "failed to remove PID file");
    }

    result
}

fn hostname() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

fn write_pid_file(path: &PathBuf) -> std::io::Result<()> {
    std::fs::write(path, std::process::id().to_string())
}

async fn run(config: Config) -> Result<()> {
    let ctx = PierreContext::new(config);
    let clock = ClockHandle::default();
    let anchor = AnchorHandle::default();
    let (dmx_handle, dmx_rx) = dmx::channel(ctx.stats.clone());
    let (frame_tx, frame_rx) = mpsc::channel::<Frame>(256);
    let units = Units::from_config(&ctx.config.units);

    log_advertisement(&ctx);

    let shutdown_token = CancellationToken::new();
    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            signal_token.cancel();
        }
    });

    let result = app::run_toplevel(shutdown_token.clone(), async move |s: &mut SubsystemHandle| {
        let mut clock_state = spawn_clock_subsystem(s, clock.clone());
        if !app::wait_for_start("clock", &mut clock_state).await {
            return;
        }

        let mut dmx_state = spawn_dmx_subsystem(s, ctx.config.dmx.clone(), ctx.stats.clone(), dmx_rx);
        if !app::wait_for_start("dmx-link", &mut dmx_state).await {
            return;
        }

        let mut scheduler_state =
            spawn_scheduler_subsystem(s, &ctx, clock, anchor.clone(), dmx_handle, units, frame_rx);
        if !app::wait_for_start("scheduler", &mut scheduler_state).await {
            return;
        }

        let mut rtsp_state = spawn_rtsp_subsystem(s, ctx, anchor, frame_tx);
        app::wait_for_start("rtsp", &mut rtsp_state).await;
    })
    .await;

    result.map_err(|e| miette::miette!("{e}"))
}

fn log_advertisement(ctx: &PierreContext) {
    let mut values = BTreeMap::new();
    values.insert(mdns::TxtKey::ApModel, "Pierre".to_owned());
    values.insert(mdns::TxtKey::ApDeviceId, hostname());
    values.insert(
        mdns::TxtKey::ApAirPlayVsn,
        format!("{}", ctx.config.clock.max_age.as_millis()),
    );
    let record = mdns::build_txt_record(&values);
    info!(?record, "would advertise {} / {}", mdns::SERVICE_AIRPLAY, mdns::SERVICE_RAOP);
}

fn spawn_clock_subsystem(
    top: &mut SubsystemHandle,
    clock: ClockHandle,
) -> mpsc::Receiver<app::AppState> {
    app::spawn_subsystem(top, "clock", async move |_s: &mut SubsystemHandle| {
        time::run_clock_context(NullPtpPeer, clock).await;
        Ok::<(), PierreError>(())
    })
}

fn spawn_dmx_subsystem(
    top: &mut SubsystemHandle,
    cfg: DmxConfig,
    stats: Stats,
    rx: mpsc::Receiver<(tokio::time::Instant, DataMsg)>,
) -> mpsc::Receiver<app::AppState> {
    app::spawn_subsystem(top, "dmx-link", async move |_s: &mut SubsystemHandle| {
        dmx::run_dmx_context(cfg, stats, rx).await;
        Ok::<(), PierreError>(())
    })
}

#[allow(clippy::too_many_arguments)]
fn spawn_scheduler_subsystem(
    top: &mut SubsystemHandle,
    ctx: &PierreContext,
    clock: ClockHandle,
    anchor: AnchorHandle,
    dmx: DmxHandle,
    units: Units,
    frame_rx: mpsc::Receiver<Frame>,
) -> mpsc::Receiver<app::AppState> {
    let cfg = SchedulerConfig {
        sample_rate: 44_100,
        frame_samples: ctx.config.frame.samples,
        max_clock_age: ctx.config.clock.max_age,
        outdated_slack: std::time::Duration::from_millis(50),
        future_slack: std::time::Duration::from_millis(500),
        render_slack: std::time::Duration::from_millis(1),
        silence_timeout: ctx.config.fx.majorpeak.silence_timeout,
        peak_floor: ctx.config.frame.peaks.magnitudes.floor,
        peak_ceiling: ctx.config.frame.peaks.magnitudes.ceiling,
    };
    let render = ctx.render.clone();
    let stats = ctx.stats.clone();

    app::spawn_subsystem(top, "scheduler", async move |s: &mut SubsystemHandle| {
        pierre::utils::set_realtime_priority();
        let scheduler = Scheduler::new(clock, anchor, frame_rx, dmx, stats, render, units, cfg);
        scheduler.run(s.create_cancellation_token()).await;
        Ok::<(), PierreError>(())
    })
}

/// Accepts RTSP connections one at a time: Pierre serves a single
/// sender, returning to `Unpaired` and waiting for the next SETUP once
/// a session tears down.
fn spawn_rtsp_subsystem(
    top: &mut SubsystemHandle,
    ctx: PierreContext,
    anchor: AnchorHandle,
    frame_tx: mpsc::Sender<Frame>,
) -> mpsc::Receiver<app::AppState> {
    app::spawn_subsystem(top, "rtsp", async move |s: &mut SubsystemHandle| {
        let listener = socket::init_tcp_socket(
            ctx.config.socket.bind_address,
            ctx.config.socket.port,
            ctx.config.socket.clone(),
        )
        .map_err(|e| std::io::Error::other(e.to_string()))?;
        let listener = TcpListener::from_std(listener)?;
        info!(addr = %listener.local_addr()?, "RTSP listener bound");

        loop {
            tokio::select! {
                _ = s.on_shutdown_requested() => break,
                accepted = listener.accept() => {
                    let (socket, peer) = accepted?;
                    info!(%peer, "RTSP connection accepted");
                    if let Err(e) = handle_rtsp_connection(socket, &ctx, anchor.clone(), frame_tx.clone()).await {
                        warn!(error = %e, "RTSP session ended with an error");
                    }
                }
            }
        }
        Ok::<(), PierreError>(())
    })
}

async fn handle_rtsp_connection(
    mut socket: TcpStream,
    ctx: &PierreContext,
    anchor: AnchorHandle,
    frame_tx: mpsc::Sender<Frame>,
) -> Result<(), PierreError> {
    let stream = StreamHandle::default();
    let bind_addr: IpAddr = ctx.config.socket.bind_address;

    let audio_std = socket::init_tcp_socket(bind_addr, 0, ctx.config.socket.clone())
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    let audio_listener = TcpListener::from_std(audio_std)?;
    let audio_port = audio_listener.local_addr()?.port();

    let control_socket = UdpSocket::bind((bind_addr, 0)).await?;
    let control_port = control_socket.local_addr()?.port();

    let mut session = Session::new(
        DeterministicOracle,
        stream.clone(),
        StreamPorts { audio_data: audio_port, control: control_port },
        anchor,
        ctx.render.clone(),
        ctx.status.clone(),
        ctx.stats.clone(),
        44_100,
    );

    let session_cancel = CancellationToken::new();
    let (recovered_tx, recovered_rx) = mpsc::channel(64);
    let (request_tx, request_rx) = mpsc::channel(64);

    let audio_receiver_cfg = AudioReceiverConfig {
        wip_max: ctx.config.rtsp.wip_max,
        wip_timeout: ctx.config.rtsp.wip_timeout,
        retransmit_timeout: ctx.config.rtsp.retransmit_timeout,
    };

    let data_plane = tokio::spawn(run_data_plane(
        audio_listener,
        control_socket,
        stream.clone(),
        frame_tx,
        recovered_tx,
        recovered_rx,
        request_tx,
        request_rx,
        ctx.stats.clone(),
        audio_receiver_cfg,
        session_cancel.clone(),
    ));

    let mut buf = Vec::with_capacity(4096);
    let mut read_buf = [0u8; 4096];

    let outcome = 'conn: loop {
        let n = match socket.read(&mut read_buf).await {
            Ok(0) => break Ok(()),
            Ok(n) => n,
            Err(e) => break Err(e.into()),
        };
        buf.extend_from_slice(&read_buf[..n]);

        loop {
            match rtsp::parser::parse_request(&buf) {
                Ok(Some((req, consumed))) => {
                    let reply = session.handle(&req);
                    if let Err(e) = socket.write_all(&reply.to_bytes()).await {
                        warn!(error = %e, "failed to write RTSP reply, closing connection");
                        break;
                    }
                    buf.drain(..consumed);
                    if session.state() == rtsp::State::Teardown {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "malformed RTSP request, closing connection");
                    let reply = rtsp::Reply::empty(rtsp::RespCode::BadRequest, 0);
                    let _ = socket.write_all(&reply.to_bytes()).await;
                    break 'conn Ok(());
                }
            }
        }

        if session.state() == rtsp::State::Teardown {
            break Ok(());
        }
    };

    session_cancel.cancel();
    let _ = data_plane.await;
    outcome
}

#[allow(clippy::too_many_arguments)]
async fn run_data_plane(
    audio_listener: TcpListener,
    control_socket: UdpSocket,
    stream: StreamHandle,
    frame_tx: mpsc::Sender<Frame>,
    recovered_tx: mpsc::Sender<Frame>,
    recovered_rx: mpsc::Receiver<Frame>,
    request_tx: mpsc::Sender<control_receiver::RetransmitRequest>,
    request_rx: mpsc::Receiver<control_receiver::RetransmitRequest>,
    stats: Stats,
    audio_cfg: AudioReceiverConfig,
    cancel: CancellationToken,
) {
    let control_handle = {
        let stream = stream.clone();
        let stats = stats.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = control_receiver::run(
                control_socket,
                stream,
                PassthroughAlac,
                recovered_tx,
                request_rx,
                stats,
                cancel,
            )
            .await
            {
                error!(error = %e, "control receiver exited with an error");
            }
        })
    };

    tokio::select! {
        _ = cancel.cancelled() => {}
        accepted = audio_listener.accept() => {
            match accepted {
                Ok((socket, peer)) => {
                    info!(%peer, "audio-data connection accepted");
                    if let Err(e) = audio_receiver::run(
                        socket,
                        stream,
                        PassthroughAlac,
                        frame_tx,
                        recovered_rx,
                        request_tx,
                        stats,
                        audio_cfg,
                        cancel.clone(),
                    )
                    .await
                    {
                        error!(error = %e, "audio receiver exited with an error");
                    }
                }
                Err(e) => warn!(error = %e, "audio-data listener failed to accept"),
            }
        }
    }

    cancel.cancel();
    let _ = control_handle.await;
}
