//! Spectator stream: one JSON object per processed tick.

use std::io::Write;
use std::time::Duration;

use battle_core::events::{BattleEvent, TickObserver, TickRecord};
use battle_core::unit::Unit;
use serde::Serialize;

/// One line of the spectator stream.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TickFrame<'a> {
    /// Tick number.
    pub tick: u64,
    /// Every unit after the tick, roster order.
    pub units: &'a [Unit],
    /// What happened during the tick.
    pub events: &'a [BattleEvent],
}

impl<'a> TickFrame<'a> {
    /// Frame for a completed tick.
    #[must_use]
    pub fn new(record: &'a TickRecord, units: &'a [Unit]) -> Self {
        Self {
            tick: record.tick,
            units,
            events: &record.events,
        }
    }
}

/// Writes each tick as a JSON line, optionally sleeping between ticks.
///
/// The engine cannot be told to stop from inside an observer, so the first
/// write error is kept and later ticks are dropped.
#[derive(Debug)]
pub struct JsonLinesObserver<W: Write> {
    writer: W,
    delay: Option<Duration>,
    frames: u64,
    error: Option<std::io::Error>,
}

impl<W: Write> JsonLinesObserver<W> {
    /// Stream into `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            delay: None,
            frames: 0,
            error: None,
        }
    }

    /// Sleep this long after each frame.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = (!delay.is_zero()).then_some(delay);
        self
    }

    /// Frames written so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Flush and hand back the writer, or the first error hit while
    /// streaming.
    pub fn finish(mut self) -> std::io::Result<W> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn write_frame(&mut self, frame: &TickFrame<'_>) -> std::io::Result<()> {
        serde_json::to_writer(&mut self.writer, frame)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}

impl<W: Write> TickObserver for JsonLinesObserver<W> {
    fn on_tick(&mut self, record: &TickRecord, units: &[Unit]) {
        if self.error.is_some() {
            return;
        }
        match self.write_frame(&TickFrame::new(record, units)) {
            Ok(()) => self.frames += 1,
            Err(err) => {
                tracing::warn!(error = %err, tick = record.tick, "spectator stream stopped");
                self.error = Some(err);
                return;
            }
        }
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
    }
}
