//! Per-frame drowsiness classification

use serde::{Deserialize, Serialize};

/// EAR below this counts as high drowsiness even with eyes "open"
const EAR_HIGH: f64 = 0.20;
/// EAR below this counts as low drowsiness
const EAR_LOW: f64 = 0.25;
/// MAR above this counts as medium drowsiness even without a yawn
const MAR_MEDIUM: f64 = 0.6;
/// MAR above this counts as low drowsiness
const MAR_LOW: f64 = 0.5;

/// Drowsiness level for a single frame, serialized as 0-4
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum DrowsinessLevel {
    #[default]
    None = 0,
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl DrowsinessLevel {
    /// Classify one frame. First matching rule wins, most severe first.
    pub fn classify(ear: f64, mar: f64, eyes_closed: bool, yawning: bool) -> Self {
        if eyes_closed && yawning {
            DrowsinessLevel::Critical
        } else if eyes_closed || ear < EAR_HIGH {
            DrowsinessLevel::High
        } else if yawning || mar > MAR_MEDIUM {
            DrowsinessLevel::Medium
        } else if ear < EAR_LOW || mar > MAR_LOW {
            DrowsinessLevel::Low
        } else {
            DrowsinessLevel::None
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<DrowsinessLevel> for u8 {
    fn from(level: DrowsinessLevel) -> Self {
        level.as_u8()
    }
}

impl TryFrom<u8> for DrowsinessLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DrowsinessLevel::None),
            1 => Ok(DrowsinessLevel::Low),
            2 => Ok(DrowsinessLevel::Medium),
            3 => Ok(DrowsinessLevel::High),
            4 => Ok(DrowsinessLevel::Critical),
            other => Err(format!("drowsiness level out of range: {}", other)),
        }
    }
}
