// Mood presets.
//
// A mood never changes the algorithm, only its numbers: how many nodes exist,
// how hard they are shaken, how fast they orbit and how dense the field is.
// The table is built once with the rest of the configuration and only read
// afterwards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::BlobError;

// ============================================================================
// MOOD
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mood {
    #[default]
    Idle,
    Listening,
    Thinking,
    Talking,
}

impl Mood {
    pub const ALL: [Mood; 4] = [Mood::Idle, Mood::Listening, Mood::Thinking, Mood::Talking];

    pub fn name(self) -> &'static str {
        match self {
            Mood::Idle => "idle",
            Mood::Listening => "listening",
            Mood::Thinking => "thinking",
            Mood::Talking => "talking",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Mood {
    type Err = BlobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mood::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| BlobError::InvalidConfig(format!("unknown mood '{s}'")))
    }
}

// ============================================================================
// MODULATION TABLE
// ============================================================================

/// Per-mood tuning. Values are cosmetic and free to recalibrate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModulationParams {
    /// Total nodes including the core.
    pub node_count: u32,
    /// Scales the random kick each frame and the energy re-injected on a bounce.
    pub turbulence: f32,
    /// Breathing rate (rad/s before the x2) used by the talking force.
    pub pulse_frequency: f32,
    /// Multiplier on every node's field contribution.
    pub field_strength: f32,
    /// Multiplier on the base isolation threshold. Above 1 shrinks the blob.
    pub field_threshold: f32,
    /// Orbit gain multiplier and angular rate of the thinking swirl.
    pub rotation_speed: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModulationTable {
    pub idle: ModulationParams,
    pub listening: ModulationParams,
    pub thinking: ModulationParams,
    pub talking: ModulationParams,
}

impl Default for ModulationTable {
    fn default() -> Self {
        Self {
            idle: ModulationParams {
                node_count: 9,
                turbulence: 0.55,
                pulse_frequency: 0.8,
                field_strength: 0.95,
                field_threshold: 1.0,
                rotation_speed: 0.25,
            },
            listening: ModulationParams {
                node_count: 12,
                turbulence: 0.8,
                pulse_frequency: 1.6,
                field_strength: 1.0,
                field_threshold: 0.95,
                rotation_speed: 0.45,
            },
            thinking: ModulationParams {
                node_count: 10,
                turbulence: 0.7,
                pulse_frequency: 1.1,
                field_strength: 1.0,
                field_threshold: 1.05,
                rotation_speed: 0.9,
            },
            talking: ModulationParams {
                node_count: 14,
                turbulence: 0.95,
                pulse_frequency: 3.2,
                field_strength: 1.1,
                field_threshold: 0.9,
                rotation_speed: 0.6,
            },
        }
    }
}

impl ModulationTable {
    pub fn params_for(&self, mood: Mood) -> ModulationParams {
        match mood {
            Mood::Idle => self.idle,
            Mood::Listening => self.listening,
            Mood::Thinking => self.thinking,
            Mood::Talking => self.talking,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), BlobError> {
        for mood in Mood::ALL {
            let p = self.params_for(mood);
            let finite = [
                p.turbulence,
                p.pulse_frequency,
                p.field_strength,
                p.field_threshold,
                p.rotation_speed,
            ]
            .iter()
            .all(|v| v.is_finite());
            if !finite {
                return Err(BlobError::InvalidConfig(format!(
                    "modulation for {mood} has a non-finite value"
                )));
            }
            if p.turbulence < 0.0 || p.field_strength < 0.0 || p.field_threshold < 0.0 {
                return Err(BlobError::InvalidConfig(format!(
                    "modulation for {mood} has a negative turbulence, strength or threshold"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// PALETTE
// ============================================================================

/// Linear RGB node colors per mood. Nodes cycle through their mood's list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoodPalette {
    pub idle: Vec<[f32; 3]>,
    pub listening: Vec<[f32; 3]>,
    pub thinking: Vec<[f32; 3]>,
    pub talking: Vec<[f32; 3]>,
}

impl Default for MoodPalette {
    fn default() -> Self {
        Self {
            idle: vec![[0.35, 0.55, 1.0], [0.45, 0.4, 0.95], [0.3, 0.75, 0.9]],
            listening: vec![[0.2, 0.85, 0.65], [0.3, 0.95, 0.45], [0.15, 0.7, 0.8]],
            thinking: vec![[0.75, 0.4, 1.0], [0.95, 0.45, 0.8], [0.55, 0.35, 0.95]],
            talking: vec![[1.0, 0.55, 0.25], [1.0, 0.35, 0.4], [0.95, 0.75, 0.3]],
        }
    }
}

impl MoodPalette {
    pub fn colors_for(&self, mood: Mood) -> &[[f32; 3]] {
        match mood {
            Mood::Idle => &self.idle,
            Mood::Listening => &self.listening,
            Mood::Thinking => &self.thinking,
            Mood::Talking => &self.talking,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), BlobError> {
        for mood in Mood::ALL {
            let colors = self.colors_for(mood);
            if colors.is_empty() {
                return Err(BlobError::InvalidConfig(format!("palette for {mood} is empty")));
            }
            if colors.iter().flatten().any(|c| !c.is_finite() || *c < 0.0) {
                return Err(BlobError::InvalidConfig(format!(
                    "palette for {mood} has a negative or non-finite channel"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_mood_has_its_own_entry() {
        let table = ModulationTable::default();
        assert_eq!(table.params_for(Mood::Idle), table.idle);
        assert_eq!(table.params_for(Mood::Listening), table.listening);
        assert_eq!(table.params_for(Mood::Thinking), table.thinking);
        assert_eq!(table.params_for(Mood::Talking), table.talking);
        assert_ne!(table.idle.node_count, table.talking.node_count);
    }

    #[test]
    fn default_table_and_palette_validate() {
        assert!(ModulationTable::default().validate().is_ok());
        assert!(MoodPalette::default().validate().is_ok());
    }

    #[test]
    fn negative_threshold_is_rejected() {
        let mut table = ModulationTable::default();
        table.thinking.field_threshold = -0.1;
        assert!(matches!(table.validate(), Err(BlobError::InvalidConfig(_))));
    }

    #[test]
    fn empty_palette_is_rejected() {
        let mut palette = MoodPalette::default();
        palette.talking.clear();
        assert!(palette.validate().is_err());
    }

    #[test]
    fn moods_parse_from_names() {
        assert_eq!("talking".parse::<Mood>().unwrap(), Mood::Talking);
        assert_eq!(" Idle ".parse::<Mood>().unwrap(), Mood::Idle);
        assert!("sleeping".parse::<Mood>().is_err());
        for mood in Mood::ALL {
            assert_eq!(mood.to_string().parse::<Mood>().unwrap(), mood);
        }
    }
}
