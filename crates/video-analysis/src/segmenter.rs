//! Temporal event segmentation
//!
//! Merges runs of consecutive eyes-closed or yawning frames into bounded
//! events. At most one event is open at a time; it is closed (and its
//! duration frozen) before another one opens.

use dms::{DrowsinessLevel, FrameMetrics};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{round_dp, MetricsConsumer};

/// Detected condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    EyesClosed,
    Yawning,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::EyesClosed => "eyes_closed",
            EventType::Yawning => "yawning",
        }
    }
}

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Severity of an eyes-closed event opening at `level`
    fn eyes_closed(level: DrowsinessLevel) -> Self {
        if level >= DrowsinessLevel::High {
            Severity::Critical
        } else if level >= DrowsinessLevel::Medium {
            Severity::High
        } else {
            Severity::Medium
        }
    }

    /// Severity of a yawning event opening at `level`
    fn yawning(level: DrowsinessLevel) -> Self {
        if level >= DrowsinessLevel::High {
            Severity::High
        } else if level >= DrowsinessLevel::Medium {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

/// A contiguous run of frames sharing one condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrowsinessEvent {
    /// Start time in seconds (2 dp)
    pub timestamp: f64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Seconds; rounded to 2 dp once the event is closed
    pub duration: f64,
    pub severity: Severity,
    /// Average EAR at the start of an eyes-closed event (4 dp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ear: Option<f64>,
    /// MAR at the start of a yawning event (4 dp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mar: Option<f64>,
    pub frame_number: u64,
}

/// Stateful reducer over per-frame metrics in timestamp order
#[derive(Debug, Clone)]
pub struct EventSegmenter {
    /// Seconds covered by one sampled frame
    sample_period: f64,
    open: Option<DrowsinessEvent>,
    closed: Vec<DrowsinessEvent>,
}

impl EventSegmenter {
    pub fn new(sample_period: f64) -> Self {
        Self {
            sample_period,
            open: None,
            closed: Vec::new(),
        }
    }

    /// Feed the next analysed frame.
    ///
    /// Eyes-closed wins over yawning when a frame shows both; no separate
    /// yawn event is recorded for such frames.
    pub fn push(&mut self, frame: &FrameMetrics) {
        let condition = if frame.eyes_closed {
            EventType::EyesClosed
        } else if frame.yawning {
            EventType::Yawning
        } else {
            self.close();
            return;
        };

        match &mut self.open {
            Some(event) if event.event_type == condition => {
                event.duration += self.sample_period;
            }
            _ => {
                self.close();
                self.open(condition, frame);
            }
        }
    }

    fn open(&mut self, event_type: EventType, frame: &FrameMetrics) {
        let level = frame.drowsiness_level;
        let (severity, ear, mar) = match event_type {
            EventType::EyesClosed => (Severity::eyes_closed(level), Some(round_dp(frame.ear.average, 4)), None),
            EventType::Yawning => (Severity::yawning(level), None, Some(round_dp(frame.mar.ratio, 4))),
        };

        self.open = Some(DrowsinessEvent {
            timestamp: round_dp(frame.timestamp, 2),
            event_type,
            duration: self.sample_period,
            severity,
            ear,
            mar,
            frame_number: frame.frame_number,
        });
    }

    fn close(&mut self) {
        if let Some(mut event) = self.open.take() {
            event.duration = round_dp(event.duration, 2);
            debug!(
                "Closed {} event at {:.2}s lasting {:.2}s",
                event.event_type.as_str(),
                event.timestamp,
                event.duration
            );
            counter!("analysis_events_total", "type" => event.event_type.as_str()).increment(1);
            self.closed.push(event);
        }
    }

    /// Event currently being extended, if any
    pub fn open_event(&self) -> Option<&DrowsinessEvent> {
        self.open.as_ref()
    }

    /// Events closed so far, in start order
    pub fn events(&self) -> &[DrowsinessEvent] {
        &self.closed
    }

    /// Close any open event and return every event
    pub fn finish(mut self) -> Vec<DrowsinessEvent> {
        self.close();
        self.closed
    }
}

impl MetricsConsumer for EventSegmenter {
    fn consume(&mut self, frame: &FrameMetrics) {
        self.push(frame);
    }
}
