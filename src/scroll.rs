//! # Auto-Scroll Timing
//!
//! Scroll velocity follows the tempo: one display line holds four bars.
//!
//! ```text
//! beats_per_line    = beats_per_bar × 4
//! seconds_per_line  = (60 / tempo) × beats_per_line
//! pixels_per_second = (line_height_px × multiplier) / seconds_per_line
//! pixels_per_tick   = pixels_per_second × tick_seconds        (tick = 50 ms)
//! ```
//!
//! At 120 bpm in 4/4 with a 160 px line and multiplier 1.0 a line takes 8 s,
//! the view moves 20 px/s, and each tick advances 1 px.
//!
//! [`AutoScroller`] runs the ticks as a tokio task and publishes the
//! accumulated offset on a `watch` channel. The task is keyed by tempo,
//! multiplier, song and target; any change to the key tears the task down
//! before a new one starts, so two tickers never run at once.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use crate::model::{clamp_scroll_speed, TimeSignature};

/// Default line height that the multiplier scales.
pub const BASELINE_LINE_HEIGHT_PX: f64 = 160.0;
/// Default tick interval.
pub const TICK: Duration = Duration::from_millis(50);

/// Bars shown per display line.
const BARS_PER_LINE: u32 = 4;

pub fn beats_per_line(time_signature: &TimeSignature) -> u32 {
    u32::from(time_signature.beats) * BARS_PER_LINE
}

/// Seconds one display line lasts. Infinite for a zero tempo.
pub fn seconds_per_line(tempo: u32, time_signature: &TimeSignature) -> f64 {
    if tempo == 0 {
        return f64::INFINITY;
    }
    (60.0 / f64::from(tempo)) * f64::from(beats_per_line(time_signature))
}

pub fn pixels_per_second(
    tempo: u32,
    time_signature: &TimeSignature,
    multiplier: f32,
    line_height_px: f64,
) -> f64 {
    let seconds = seconds_per_line(tempo, time_signature);
    if !seconds.is_finite() {
        return 0.0;
    }
    (line_height_px * f64::from(clamp_scroll_speed(multiplier))) / seconds
}

/// Everything that determines scroll speed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollParams {
    pub tempo: u32,
    pub time_signature: TimeSignature,
    pub multiplier: f32,
    pub line_height_px: f64,
    pub tick: Duration,
}

impl ScrollParams {
    pub fn new(tempo: u32, time_signature: TimeSignature, multiplier: f32) -> Self {
        Self {
            tempo,
            time_signature,
            multiplier,
            line_height_px: BASELINE_LINE_HEIGHT_PX,
            tick: TICK,
        }
    }

    pub fn pixels_per_second(&self) -> f64 {
        pixels_per_second(self.tempo, &self.time_signature, self.multiplier, self.line_height_px)
    }

    pub fn pixels_per_tick(&self) -> f64 {
        self.pixels_per_second() * self.tick.as_secs_f64()
    }

    /// Offset after `ticks` ticks; zero while scrolling is off.
    pub fn offset_after(&self, ticks: u64, enabled: bool) -> f64 {
        if !enabled {
            return 0.0;
        }
        self.pixels_per_tick() * ticks as f64
    }
}

/// Where the scrolled content is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScrollTarget {
    #[default]
    Inline,
    Fullscreen,
}

/// Inputs the scroller reacts to.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollState {
    pub enabled: bool,
    pub tempo: u32,
    pub time_signature: TimeSignature,
    pub multiplier: f32,
    pub song_id: Option<String>,
    pub target: ScrollTarget,
}

/// Identity of a running ticker. Multiplier is compared by bit pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScrollKey {
    tempo: u32,
    time_signature: TimeSignature,
    multiplier_bits: u32,
    song_id: Option<String>,
    target: ScrollTarget,
}

impl ScrollKey {
    fn of(state: &ScrollState) -> Self {
        Self {
            tempo: state.tempo,
            time_signature: state.time_signature,
            multiplier_bits: clamp_scroll_speed(state.multiplier).to_bits(),
            song_id: state.song_id.clone(),
            target: state.target,
        }
    }
}

struct Running {
    key: ScrollKey,
    handle: JoinHandle<()>,
}

/// Tempo-driven scroll ticker.
///
/// Must be driven from inside a tokio runtime.
pub struct AutoScroller {
    line_height_px: f64,
    tick: Duration,
    offset_tx: watch::Sender<f64>,
    running: Option<Running>,
    last_song: Option<String>,
}

impl Default for AutoScroller {
    fn default() -> Self {
        Self::new(BASELINE_LINE_HEIGHT_PX, TICK)
    }
}

impl AutoScroller {
    pub fn new(line_height_px: f64, tick: Duration) -> Self {
        let (offset_tx, _) = watch::channel(0.0);
        Self {
            line_height_px,
            tick,
            offset_tx,
            running: None,
            last_song: None,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<f64> {
        self.offset_tx.subscribe()
    }

    /// Accumulated offset in pixels.
    pub fn offset(&self) -> f64 {
        *self.offset_tx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn reset_offset(&self) {
        self.offset_tx.send_replace(0.0);
    }

    /// Bring the ticker in line with `state`.
    ///
    /// Calling this again with an unchanged state leaves the running task
    /// alone.
    pub fn sync(&mut self, state: &ScrollState) {
        if state.song_id != self.last_song {
            self.reset_offset();
            self.last_song = state.song_id.clone();
        }

        if !state.enabled {
            self.stop();
            return;
        }

        let key = ScrollKey::of(state);
        if self.running.as_ref().is_some_and(|r| r.key == key) {
            return;
        }
        self.stop();

        let params = ScrollParams {
            tempo: state.tempo,
            time_signature: state.time_signature,
            multiplier: state.multiplier,
            line_height_px: self.line_height_px,
            tick: self.tick,
        };
        let step = params.pixels_per_tick();
        let tick = self.tick;
        let tx = self.offset_tx.clone();
        debug!("Auto-scroll started at {:.3} px/tick ({} bpm)", step, state.tempo);

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + tick, tick);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                tx.send_modify(|offset| *offset += step);
            }
        });
        self.running = Some(Running { key, handle });
    }

    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.handle.abort();
            debug!("Auto-scroll stopped");
        }
    }
}

impl Drop for AutoScroller {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn four_four() -> TimeSignature {
        TimeSignature::default()
    }

    fn state(enabled: bool, tempo: u32, multiplier: f32) -> ScrollState {
        ScrollState {
            enabled,
            tempo,
            time_signature: four_four(),
            multiplier,
            song_id: Some("song-1".to_string()),
            target: ScrollTarget::Inline,
        }
    }

    #[test]
    fn test_scenario_d() {
        let params = ScrollParams::new(120, four_four(), 1.0);
        assert_eq!(beats_per_line(&four_four()), 16);
        assert_relative_eq!(seconds_per_line(120, &four_four()), 8.0);
        assert_relative_eq!(params.pixels_per_second(), 20.0);
        assert_relative_eq!(params.pixels_per_tick(), 1.0);
    }

    #[test]
    fn test_three_four_and_multiplier() {
        let ts = TimeSignature { beats: 3, beat_type: 4 };
        assert_relative_eq!(seconds_per_line(90, &ts), 8.0);
        assert_relative_eq!(pixels_per_second(90, &ts, 2.0, 160.0), 40.0);
        // multiplier outside the allowed range is clamped
        assert_relative_eq!(pixels_per_second(90, &ts, 10.0, 160.0), 60.0);
    }

    #[test]
    fn test_zero_when_disabled_or_no_tempo() {
        let params = ScrollParams::new(120, four_four(), 1.0);
        assert_eq!(params.offset_after(100, false), 0.0);
        assert_eq!(pixels_per_second(0, &four_four(), 1.0, 160.0), 0.0);
    }

    #[test]
    fn test_monotonic() {
        let params = ScrollParams::new(96, four_four(), 0.7);
        let mut last = 0.0;
        for ticks in 0..200 {
            let offset = params.offset_after(ticks, true);
            assert!(offset >= last);
            last = offset;
        }
        assert!(
            ScrollParams::new(140, four_four(), 1.0).pixels_per_second()
                > ScrollParams::new(100, four_four(), 1.0).pixels_per_second()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_scroller_ticks() {
        let mut scroller = AutoScroller::default();
        scroller.sync(&state(true, 120, 1.0));
        assert!(scroller.is_running());

        tokio::time::sleep(Duration::from_millis(525)).await;
        tokio::task::yield_now().await;
        assert_relative_eq!(scroller.offset(), 10.0);

        scroller.sync(&state(false, 120, 1.0));
        assert!(!scroller.is_running());
        let stopped_at = scroller.offset();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_relative_eq!(scroller.offset(), stopped_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_idempotent_and_rekeyed() {
        let mut scroller = AutoScroller::default();
        scroller.sync(&state(true, 120, 1.0));
        tokio::time::sleep(Duration::from_millis(125)).await;

        // same state: ticker keeps running without restart
        scroller.sync(&state(true, 120, 1.0));
        tokio::time::sleep(Duration::from_millis(100)).await;
        tokio::task::yield_now().await;
        assert_relative_eq!(scroller.offset(), 4.0);

        // doubled tempo: torn down and restarted at 2 px/tick
        scroller.sync(&state(true, 240, 1.0));
        tokio::time::sleep(Duration::from_millis(110)).await;
        tokio::task::yield_now().await;
        assert_relative_eq!(scroller.offset(), 8.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_song_change_resets_offset() {
        let mut scroller = AutoScroller::default();
        scroller.sync(&state(true, 120, 1.0));
        tokio::time::sleep(Duration::from_millis(225)).await;
        tokio::task::yield_now().await;
        assert!(scroller.offset() > 0.0);

        let mut next = state(false, 120, 1.0);
        next.song_id = Some("song-2".to_string());
        scroller.sync(&next);
        assert_eq!(scroller.offset(), 0.0);
        assert!(!scroller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_offset_published() {
        let mut scroller = AutoScroller::default();
        let mut rx = scroller.subscribe();
        scroller.sync(&state(true, 120, 1.0));
        rx.changed().await.unwrap();
        assert_relative_eq!(*rx.borrow(), 1.0);
    }
}
