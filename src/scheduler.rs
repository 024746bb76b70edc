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

//! The render loop (C10). A single cooperative context: pick the next
//! `Ready` frame, sleep until its anchor-derived deadline, run DSP and
//! FX, hand the result to the DMX link. The rack itself is owned by
//! the audio-data context; frames arrive here already popped, through a
//! bounded handoff queue.

use crate::{
    anchor::{self, AnchorLast, AnchorHandle, DeadlineVerdict},
    context::RenderFlag,
    dmx::DmxHandle,
    dsp,
    frame::{Frame, RtpTimestamp},
    fx::FxEngine,
    stats::Stats,
    time::ClockHandle,
    units::Units,
};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct SchedulerConfig {
    pub sample_rate: u32,
    pub frame_samples: u32,
    pub max_clock_age: Duration,
    pub outdated_slack: Duration,
    pub future_slack: Duration,
    pub render_slack: Duration,
    pub silence_timeout: Duration,
    pub peak_floor: f32,
    pub peak_ceiling: f32,
}

pub struct Scheduler {
    clock: ClockHandle,
    anchor: AnchorHandle,
    frame_rx: mpsc::Receiver<Frame>,
    dmx: DmxHandle,
    stats: Stats,
    render: RenderFlag,
    units: Units,
    fx: FxEngine,
    cfg: SchedulerConfig,
    last_rendered_rtp: Option<RtpTimestamp>,
}

impl Scheduler {
    pub fn new(
        clock: ClockHandle,
        anchor: AnchorHandle,
        frame_rx: mpsc::Receiver<Frame>,
        dmx: DmxHandle,
        stats: Stats,
        render: RenderFlag,
        units: Units,
        cfg: SchedulerConfig,
    ) -> Self {
        Scheduler {
            clock,
            anchor,
            frame_rx,
            dmx,
            stats,
            render,
            units,
            fx: FxEngine::new(),
            cfg,
            last_rendered_rtp: None,
        }
    }

    /// Runs the render loop to completion, cooperating with `cancel`
    /// for TEARDOWN: on exit, emits AllStop before returning.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            if !self.render.enabled() {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(Duration::from_millis(20)) => continue,
                }
            }

            let now = Instant::now();
            let clock_info = self.clock.current();
            let anchor_last = self.anchor.current();

            if !clock_info.is_fresh(now, self.cfg.max_clock_age) || !anchor_last.is_ready() {
                self.render_silent(now);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.tick_interval()) => continue,
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                frame = self.frame_rx.recv() => {
                    match frame {
                        Some(frame) => self.handle_frame(frame, anchor_last).await,
                        None => break,
                    }
                }
                _ = tokio::time::sleep(self.tick_interval()) => {
                    self.render_silent(now);
                }
            }
        }

        self.fx.stop(&mut self.units, Instant::now());
        self.dmx.send(self.units.to_data_msg());
        info!("render loop exiting");
    }

    fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(self.cfg.frame_samples as f64 / self.cfg.sample_rate as f64)
    }

    /// Converts a local-deadline nanosecond value (same frame as
    /// `anchor.localized`) into a real `Instant`, anchored off the
    /// moment the anchor snapshot was taken.
    fn instant_for_local_ns(anchor: &AnchorLast, target_ns: i64) -> Instant {
        let delta = target_ns - anchor.localized;
        if delta >= 0 {
            anchor.master_at + Duration::from_nanos(delta as u64)
        } else {
            anchor
                .master_at
                .checked_sub(Duration::from_nanos((-delta) as u64))
                .unwrap_or(anchor.master_at)
        }
    }

    async fn handle_frame(&mut self, mut frame: Frame, anchor_last: AnchorLast) {
        let deadline_ns = anchor::deadline_local_ns(
            anchor_last.localized,
            anchor_last.rtp_time,
            frame.rtp_time.0,
            self.cfg.sample_rate,
        );
        frame.mark_ready(deadline_ns);

        let now_local_ns = anchor_last.localized
            + Instant::now().saturating_duration_since(anchor_last.master_at).as_nanos() as i64;
        let verdict = anchor::classify_deadline(
            deadline_ns,
            now_local_ns,
            self.cfg.outdated_slack,
            self.cfg.future_slack,
        );

        // Ordering guarantee: a frame older than the last one rendered
        // is marked Outdated rather than reordered.
        if let Some(last) = self.last_rendered_rtp
            && frame.rtp_time <= last
        {
            frame.mark_outdated();
            self.stats.incr_frame_outdated();
            return;
        }

        if verdict == DeadlineVerdict::Outdated {
            frame.mark_outdated();
            self.stats.incr_frame_outdated();
            return;
        }

        let target = Self::instant_for_local_ns(&anchor_last, deadline_ns)
            .checked_sub(self.cfg.render_slack)
            .unwrap_or_else(Instant::now);
        let wait_start = Instant::now();
        tokio::time::sleep_until(tokio::time::Instant::from_std(target)).await;
        self.stats.record_sync_wait(wait_start.elapsed());

        let Some(pcm) = frame.pcm.take() else {
            frame.mark_invalid();
            return;
        };

        let peaks = dsp::analyze(&pcm, self.cfg.sample_rate, self.cfg.peak_floor, self.cfg.peak_ceiling);
        self.fx.tick(&peaks, &mut self.units, self.cfg.silence_timeout, Instant::now());
        self.dmx.send(self.units.to_data_msg());

        self.last_rendered_rtp = Some(frame.rtp_time);
        frame.mark_rendered(peaks);
        self.stats.incr_frame_rendered();
        debug!(rtp = frame.rtp_time.0, "frame rendered");
    }

    fn render_silent(&mut self, now: Instant) {
        let silent = dsp::Peaks::empty();
        self.fx.tick(&silent, &mut self.units, self.cfg.silence_timeout, now);
        self.dmx.send(self.units.to_data_msg());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{anchor::AnchorData, config::UnitsConfig, frame::SeqNum, time::ClockInfo};

    fn test_config() -> SchedulerConfig {
        SchedulerConfig {
            sample_rate: 44_100,
            frame_samples: 352,
            max_clock_age: Duration::from_millis(100),
            outdated_slack: Duration::from_millis(50),
            future_slack: Duration::from_millis(500),
            render_slack: Duration::from_millis(1),
            silence_timeout: Duration::from_secs(10),
            peak_floor: 2.1,
            peak_ceiling: 32.0,
        }
    }

    #[tokio::test]
    async fn stale_clock_renders_silence_and_does_not_consume_frames() {
        let clock = ClockHandle::default();
        let anchor = AnchorHandle::default();
        let (dmx, mut dmx_rx) = crate::dmx::channel(Stats::default());
        let (_frame_tx, frame_rx) = mpsc::channel(4);
        let units = Units::from_config(&UnitsConfig::default());

        let scheduler = Scheduler::new(
            clock,
            anchor,
            frame_rx,
            dmx,
            Stats::default(),
            RenderFlag::default(),
            units,
            test_config(),
        );
        scheduler.render.enable();

        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        let handle = tokio::spawn(scheduler.run(cancel_clone));

        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert!(dmx_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn frames_render_in_strictly_increasing_rtp_order() {
        let clock = ClockHandle::default();
        clock.publish(ClockInfo {
            clock_id: 1,
            mastership_start_time: 0,
            raw_offset: 0,
            sample_time: Instant::now(),
        });

        let anchor = AnchorHandle::default();
        anchor.update(
            AnchorData {
                clock_id: 1,
                anchor_rtp_time: 0,
                anchor_net_time: 0,
                valid_until: Duration::from_secs(60),
            },
            clock.current(),
            Instant::now(),
            44_100,
        );

        let (dmx, mut dmx_rx) = crate::dmx::channel(Stats::default());
        let (frame_tx, frame_rx) = mpsc::channel(4);
        let units = Units::from_config(&UnitsConfig::default());
        let stats = Stats::default();

        let scheduler = Scheduler::new(
            clock,
            anchor,
            frame_rx,
            dmx,
            stats.clone(),
            RenderFlag::default(),
            units,
            test_config(),
        );
        scheduler.render.enable();

        for seq in 0..3u16 {
            let mut f = Frame::new(RtpTimestamp(seq as u32 * 352), SeqNum(seq), Instant::now());
            f.mark_header_parsed();
            f.mark_deciphered();
            f.mark_decoded(vec![0u8; 1408]);
            frame_tx.send(f).await.unwrap();
        }
        drop(frame_tx);

        let cancel = CancellationToken::new();
        scheduler.run(cancel).await;

        assert_eq!(stats.frames_rendered(), 3);
        while dmx_rx.try_recv().is_ok() {}
    }
}
