// Engine configuration.
//
// Everything here is fixed once a BlobEngine is built. Defaults describe a
// blob roughly one world unit across sitting in a 28^3 lattice.

use serde::{Deserialize, Serialize};

use super::error::{BlobError, BlobResult};
use super::mood::{ModulationTable, MoodPalette};

/// Upper bound on lattice samples per axis. 256^3 floats is already 64 MiB.
pub const MAX_RESOLUTION: usize = 256;

/// Upper bound on `FieldConfig::dither`.
pub const MAX_DITHER: f32 = 1.0;

// ============================================================================
// GRID
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Lattice samples per axis.
    pub resolution: usize,
    /// Half-extent of the lattice cube in world units, centered on the origin.
    pub scale: f32,
    /// Keep the parallel color lattice and emit per-vertex colors.
    pub with_colors: bool,
    /// Emit planar XZ texture coordinates.
    pub generate_uvs: bool,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            resolution: 28,
            scale: 1.2,
            with_colors: true,
            generate_uvs: false,
        }
    }
}

impl GridConfig {
    pub fn validate(&self) -> BlobResult<()> {
        if self.resolution < 2 || self.resolution > MAX_RESOLUTION {
            return Err(BlobError::InvalidConfig(format!(
                "grid resolution must be in 2..={MAX_RESOLUTION}, got {}",
                self.resolution
            )));
        }
        positive("grid scale", self.scale)
    }
}

// ============================================================================
// SIMULATION
// ============================================================================

/// Gains of the individual forces in the node integrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForceGains {
    /// Pull toward the origin, multiplied by the node's distance.
    pub center_attraction: f32,
    /// Swirl around the world up axis, multiplied by the mood's rotation speed.
    pub orbit: f32,
    /// Pull toward the projected pointer.
    pub pointer: f32,
    /// Nodes farther than this from the pointer point ignore it.
    pub pointer_radius: f32,
    pub idle_swirl: f32,
    pub listening_jitter: f32,
    pub thinking_swirl: f32,
    pub talking_pulse: f32,
}

impl Default for ForceGains {
    fn default() -> Self {
        Self {
            center_attraction: 1.6,
            orbit: 0.35,
            pointer: 0.25,
            pointer_radius: 0.9,
            idle_swirl: 0.3,
            listening_jitter: 0.9,
            thinking_swirl: 0.8,
            talking_pulse: 1.4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Radius of the Fibonacci sphere satellites spawn on.
    pub base_radius: f32,
    /// Satellites reflecting off this sphere are pushed back to 0.9x of it.
    pub bounce_radius: f32,
    /// Velocity multiplier applied after every integration step.
    pub damping: f32,
    /// Longest frame the integrator accepts, in seconds.
    pub max_dt: f32,
    /// Speed ceiling in world units per second.
    pub max_speed: f32,
    /// Magnitude bound of the radial velocity satellites spawn with.
    pub initial_speed: f32,
    /// Spawn a core node at the origin.
    pub core_enabled: bool,
    /// Amplitude of the core's Lissajous wobble.
    pub core_wobble: f32,
    /// Field strength of a single node before modulation.
    pub node_strength: f32,
    pub gains: ForceGains,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            base_radius: 0.45,
            bounce_radius: 0.85,
            damping: 0.96,
            max_dt: 1.0 / 15.0,
            max_speed: 1.5,
            initial_speed: 0.05,
            core_enabled: true,
            core_wobble: 0.06,
            node_strength: 1.0,
            gains: ForceGains::default(),
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> BlobResult<()> {
        positive("base radius", self.base_radius)?;
        positive("bounce radius", self.bounce_radius)?;
        positive("max dt", self.max_dt)?;
        positive("max speed", self.max_speed)?;
        positive("node strength", self.node_strength)?;
        if !(self.damping > 0.0 && self.damping <= 1.0) {
            return Err(BlobError::InvalidConfig(format!(
                "damping must be in (0, 1], got {}",
                self.damping
            )));
        }
        non_negative("initial speed", self.initial_speed)?;
        non_negative("core wobble", self.core_wobble)?;
        let g = &self.gains;
        for (name, v) in [
            ("center attraction gain", g.center_attraction),
            ("orbit gain", g.orbit),
            ("pointer gain", g.pointer),
            ("pointer radius", g.pointer_radius),
            ("idle swirl gain", g.idle_swirl),
            ("listening jitter gain", g.listening_jitter),
            ("thinking swirl gain", g.thinking_swirl),
            ("talking pulse gain", g.talking_pulse),
        ] {
            non_negative(name, v)?;
        }
        Ok(())
    }
}

// ============================================================================
// FIELD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    /// `k` in `S / (1 + k * d^2)`. Larger is a tighter ball.
    pub falloff: f32,
    /// Subtracted from every contribution; cells where the result is not
    /// positive are skipped entirely.
    pub cutoff: f32,
    /// Strength multiplier of the core node.
    pub core_boost: f32,
    /// Base isosurface threshold before the mood's threshold multiplier.
    pub isolation: f32,
    /// Relative amplitude of the per-cell hash dither. 0 disables it.
    pub dither: f32,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            falloff: 28.0,
            cutoff: 0.05,
            core_boost: 1.6,
            isolation: 0.6,
            dither: 0.0,
        }
    }
}

impl FieldConfig {
    pub fn validate(&self) -> BlobResult<()> {
        positive("falloff", self.falloff)?;
        non_negative("cutoff", self.cutoff)?;
        non_negative("core boost", self.core_boost)?;
        non_negative("isolation", self.isolation)?;
        non_negative("dither", self.dither)?;
        // The dither factor is 1 + dither·(h − 0.5) with h in [0, 1); above 1
        // it could flip or zero out a sample.
        if self.dither > MAX_DITHER {
            return Err(BlobError::InvalidConfig(format!(
                "dither must be at most {MAX_DITHER}, got {}",
                self.dither
            )));
        }
        Ok(())
    }
}

// ============================================================================
// TOP LEVEL
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobConfig {
    /// Seed for node layout, initial velocities, colors and turbulence.
    pub seed: u64,
    pub grid: GridConfig,
    pub sim: SimConfig,
    pub field: FieldConfig,
    pub modulation: ModulationTable,
    pub palette: MoodPalette,
}

impl BlobConfig {
    pub fn validate(&self) -> BlobResult<()> {
        self.grid.validate()?;
        self.sim.validate()?;
        self.field.validate()?;
        self.modulation.validate()?;
        self.palette.validate()
    }

    /// Parse a (possibly partial) JSON document; missing fields keep their
    /// defaults. The result is validated.
    pub fn from_json_str(json: &str) -> BlobResult<Self> {
        let config: BlobConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

fn positive(name: &str, v: f32) -> BlobResult<()> {
    if v.is_finite() && v > 0.0 {
        Ok(())
    } else {
        Err(BlobError::InvalidConfig(format!("{name} must be positive and finite, got {v}")))
    }
}

fn non_negative(name: &str, v: f32) -> BlobResult<()> {
    if v.is_finite() && v >= 0.0 {
        Ok(())
    } else {
        Err(BlobError::InvalidConfig(format!("{name} must be non-negative and finite, got {v}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(BlobConfig::default().validate().is_ok());
    }

    #[test]
    fn degenerate_grid_is_rejected() {
        let mut config = BlobConfig::default();
        config.grid.resolution = 1;
        assert!(config.validate().is_err());
        config.grid.resolution = 0;
        assert!(config.validate().is_err());
        config.grid.resolution = 16;
        config.grid.scale = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn damping_must_be_a_fraction() {
        let mut config = BlobConfig::default();
        config.sim.damping = 1.2;
        assert!(config.validate().is_err());
        config.sim.damping = 0.0;
        assert!(config.validate().is_err());
        config.sim.damping = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn nan_values_are_rejected() {
        let mut config = BlobConfig::default();
        config.field.isolation = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = BlobConfig::from_json_str(r#"{ "seed": 42, "grid": { "resolution": 40 } }"#)
            .expect("valid json");
        assert_eq!(config.seed, 42);
        assert_eq!(config.grid.resolution, 40);
        assert_eq!(config.grid.scale, GridConfig::default().scale);
        assert_eq!(config.sim, SimConfig::default());
    }

    #[test]
    fn json_with_bad_values_fails_validation() {
        let err = BlobConfig::from_json_str(r#"{ "grid": { "resolution": 1 } }"#).unwrap_err();
        assert!(matches!(err, BlobError::InvalidConfig(_)));
        let err = BlobConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, BlobError::ConfigParse(_)));
    }

    #[test]
    fn dither_is_bounded() {
        let err = BlobConfig::from_json_str(r#"{"field":{"dither":4.0}}"#).unwrap_err();
        assert!(matches!(err, BlobError::InvalidConfig(_)));

        let mut config = BlobConfig::default();
        config.field.dither = MAX_DITHER;
        assert!(config.validate().is_ok());
        config.field.dither = MAX_DITHER + 0.01;
        assert!(config.validate().is_err());
    }
}
