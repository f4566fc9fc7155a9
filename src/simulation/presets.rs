//! Acoustic environment presets.
//!
//! A [`DampingPreset`] is an immutable pair of air-damping and wall-reflection
//! coefficients with a descriptive tag. Applying one to the solver changes
//! only those two parameters; pressure state is untouched.

use crate::error::{Result, WaveError};

/// Tolerance for value-wise preset equality.
const EQ_TOLERANCE: f32 = 1e-6;

/// The acoustic environment a preset models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetKind {
    /// Real-world room acoustics: noticeable air absorption, walls lose
    /// 15% of the energy per reflection.
    Realistic,
    /// Minimal damping so interference patterns stay visible for a long time.
    Visualization,
    /// Anechoic chamber: walls absorb everything.
    Anechoic,
    /// User-chosen coefficients built with [`DampingPreset::custom`].
    Custom,
}

/// Immutable acoustic environment description.
#[derive(Debug, Clone)]
pub struct DampingPreset {
    kind: PresetKind,
    damping: f32,
    wall_reflection: f32,
    name: String,
    description: String,
}

impl DampingPreset {
    fn validated(
        kind: PresetKind,
        damping: f32,
        wall_reflection: f32,
        name: &str,
        description: &str,
    ) -> Result<Self> {
        if damping <= 0.0 || damping > 1.0 {
            return Err(WaveError::invalid_preset(format!(
                "damping must be in (0, 1], got {damping}"
            )));
        }
        if !(0.0..=1.0).contains(&wall_reflection) {
            return Err(WaveError::invalid_preset(format!(
                "wall reflection must be in [0, 1], got {wall_reflection}"
            )));
        }
        Ok(Self {
            kind,
            damping,
            wall_reflection,
            name: name.to_owned(),
            description: description.to_owned(),
        })
    }

    /// Canonical preset for a given kind.
    ///
    /// `Custom` carries no canonical coefficients and falls back to the
    /// realistic pair; use [`DampingPreset::custom`] to pick values.
    pub fn from_kind(kind: PresetKind) -> Self {
        let preset = match kind {
            PresetKind::Realistic => Self::validated(
                kind,
                0.997,
                0.85,
                "Realistic",
                "Real-world room acoustics with air absorption and wall reflections",
            ),
            PresetKind::Visualization => Self::validated(
                kind,
                0.9998,
                0.98,
                "Visualization",
                "Minimal damping for clear demonstration of interference patterns",
            ),
            PresetKind::Anechoic => Self::validated(
                kind,
                0.998,
                0.0,
                "Anechoic",
                "Anechoic chamber: no wall reflections, higher air absorption",
            ),
            PresetKind::Custom => Self::validated(
                kind,
                0.997,
                0.85,
                "Custom",
                "Custom acoustic environment",
            ),
        };
        // Canonical values are valid by construction.
        preset.expect("canonical preset values are in range")
    }

    /// Build a custom preset, validating the domain invariants:
    /// `damping` in `(0, 1]`, `wall_reflection` in `[0, 1]`.
    pub fn custom(damping: f32, wall_reflection: f32, name: &str) -> Result<Self> {
        Self::validated(
            PresetKind::Custom,
            damping,
            wall_reflection,
            name,
            "Custom acoustic environment",
        )
    }

    /// Air absorption per sub-step, in `(0, 1]`.
    pub fn damping(&self) -> f32 {
        self.damping
    }

    /// Fraction of amplitude preserved at a wall reflection, in `[0, 1]`.
    pub fn wall_reflection(&self) -> f32 {
        self.wall_reflection
    }

    /// The environment this preset models.
    pub fn kind(&self) -> PresetKind {
        self.kind
    }

    /// Human-readable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// One-line description of the environment.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Whether walls absorb instead of reflect.
    pub fn is_anechoic(&self) -> bool {
        self.kind == PresetKind::Anechoic
    }
}

impl PartialEq for DampingPreset {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && (self.damping - other.damping).abs() < EQ_TOLERANCE
            && (self.wall_reflection - other.wall_reflection).abs() < EQ_TOLERANCE
    }
}

/// Recommended preset for demonstrating wave phenomena: low damping keeps
/// interference patterns visible.
pub fn for_visualization() -> DampingPreset {
    DampingPreset::from_kind(PresetKind::Visualization)
}

/// Recommended preset for realistic room acoustics.
pub fn for_realistic() -> DampingPreset {
    DampingPreset::from_kind(PresetKind::Realistic)
}

/// Recommended preset for tests: anechoic walls isolate wave behaviour
/// from environmental reflections.
pub fn for_testing() -> DampingPreset {
    DampingPreset::from_kind(PresetKind::Anechoic)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_values() {
        let realistic = DampingPreset::from_kind(PresetKind::Realistic);
        assert!((realistic.damping() - 0.997).abs() < 1e-6);
        assert!((realistic.wall_reflection() - 0.85).abs() < 1e-6);

        let vis = DampingPreset::from_kind(PresetKind::Visualization);
        assert!((vis.damping() - 0.9998).abs() < 1e-6);
        assert!((vis.wall_reflection() - 0.98).abs() < 1e-6);

        let anechoic = DampingPreset::from_kind(PresetKind::Anechoic);
        assert!((anechoic.damping() - 0.998).abs() < 1e-6);
        assert_eq!(anechoic.wall_reflection(), 0.0);
        assert!(anechoic.is_anechoic());
    }

    #[test]
    fn test_custom_validation() {
        assert!(DampingPreset::custom(0.5, 0.5, "ok").is_ok());
        assert!(DampingPreset::custom(1.0, 0.0, "edge").is_ok());
        assert!(DampingPreset::custom(0.0, 0.5, "zero damping").is_err());
        assert!(DampingPreset::custom(-0.1, 0.5, "negative").is_err());
        assert!(DampingPreset::custom(1.1, 0.5, "over").is_err());
        assert!(DampingPreset::custom(0.5, -0.1, "refl low").is_err());
        assert!(DampingPreset::custom(0.5, 1.1, "refl high").is_err());
    }

    #[test]
    fn test_value_equality() {
        let a = DampingPreset::custom(0.9, 0.5, "a").unwrap();
        let b = DampingPreset::custom(0.9, 0.5, "b").unwrap();
        // Names do not participate in equality.
        assert_eq!(a, b);

        let c = DampingPreset::custom(0.9, 0.6, "c").unwrap();
        assert_ne!(a, c);
        assert_ne!(
            DampingPreset::from_kind(PresetKind::Realistic),
            DampingPreset::from_kind(PresetKind::Anechoic)
        );
    }

    #[test]
    fn test_recommendations() {
        assert_eq!(for_visualization().kind(), PresetKind::Visualization);
        assert_eq!(for_realistic().kind(), PresetKind::Realistic);
        assert_eq!(for_testing().kind(), PresetKind::Anechoic);
    }
}
