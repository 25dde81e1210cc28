//! Sight parameters precomputed once per listener configuration
//!
//! Squared radii and the cosine of the peripheral half-angle are derived at
//! registration so the per-query path only does multiplications and a dot
//! product.

use glam::Vec3;
use serde::Deserialize;

use crate::core::types::Attitude;
use crate::world::Pose;

/// Which attitudes a listener's sight reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DetectionByAffiliation {
    pub detect_enemies: bool,
    pub detect_neutrals: bool,
    pub detect_friendlies: bool,
}

impl Default for DetectionByAffiliation {
    fn default() -> Self {
        Self {
            detect_enemies: true,
            detect_neutrals: false,
            detect_friendlies: false,
        }
    }
}

impl DetectionByAffiliation {
    pub fn all() -> Self {
        Self {
            detect_enemies: true,
            detect_neutrals: true,
            detect_friendlies: true,
        }
    }
}

/// Bit set over [`Attitude`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AffiliationMask(u8);

impl AffiliationMask {
    pub const ENEMIES: u8 = 1 << 0;
    pub const NEUTRALS: u8 = 1 << 1;
    pub const FRIENDLIES: u8 = 1 << 2;

    pub fn from_detection(detection: &DetectionByAffiliation) -> Self {
        let mut bits = 0;
        if detection.detect_enemies {
            bits |= Self::ENEMIES;
        }
        if detection.detect_neutrals {
            bits |= Self::NEUTRALS;
        }
        if detection.detect_friendlies {
            bits |= Self::FRIENDLIES;
        }
        Self(bits)
    }

    pub fn allows(&self, attitude: Attitude) -> bool {
        let bit = match attitude {
            Attitude::Hostile => Self::ENEMIES,
            Attitude::Neutral => Self::NEUTRALS,
            Attitude::Friendly => Self::FRIENDLIES,
        };
        self.0 & bit != 0
    }
}

/// Cosine of a peripheral half-angle in degrees; 180 or more sees all around
pub fn peripheral_vision_cos(half_angle_degrees: f32) -> f32 {
    if half_angle_degrees >= 180.0 {
        -1.0
    } else {
        half_angle_degrees.max(0.0).to_radians().cos()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DigestedSightProperties {
    pub sight_radius: f32,
    pub sight_radius_sq: f32,
    /// Always >= `sight_radius_sq`
    pub lose_sight_radius_sq: f32,
    pub peripheral_vision_angle_cos: f32,
    pub auto_success_range_sq: Option<f32>,
    pub affiliation: AffiliationMask,
}

impl DigestedSightProperties {
    /// Radius for this query: losing sight of a visible target takes the larger one
    pub fn radius_sq(&self, previously_visible: bool) -> f32 {
        if previously_visible {
            self.lose_sight_radius_sq
        } else {
            self.sight_radius_sq
        }
    }

    /// Is `target` within `radius_sq` of the observer and inside its view cone?
    pub fn in_sight_pie(&self, observer: &Pose, target: Vec3, radius_sq: f32) -> bool {
        let offset = target - observer.location;
        let dist_sq = offset.length_squared();
        if dist_sq > radius_sq {
            return false;
        }
        if dist_sq <= f32::EPSILON {
            return true;
        }

        let direction = offset / dist_sq.sqrt();
        direction.dot(observer.forward) >= self.peripheral_vision_angle_cos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(half_angle_deg: f32) -> DigestedSightProperties {
        DigestedSightProperties {
            sight_radius: 10.0,
            sight_radius_sq: 100.0,
            lose_sight_radius_sq: 144.0,
            peripheral_vision_angle_cos: peripheral_vision_cos(half_angle_deg),
            auto_success_range_sq: None,
            affiliation: AffiliationMask::from_detection(&DetectionByAffiliation::all()),
        }
    }

    #[test]
    fn test_default_detection_is_enemies_only() {
        let mask = AffiliationMask::from_detection(&DetectionByAffiliation::default());
        assert!(mask.allows(Attitude::Hostile));
        assert!(!mask.allows(Attitude::Neutral));
        assert!(!mask.allows(Attitude::Friendly));
    }

    #[test]
    fn test_hysteresis_radius_selection() {
        let d = digest(90.0);
        assert_eq!(d.radius_sq(false), 100.0);
        assert_eq!(d.radius_sq(true), 144.0);
    }

    #[test]
    fn test_cone_rejects_targets_behind() {
        let d = digest(45.0);
        let observer = Pose::new(Vec3::ZERO, Vec3::X);

        assert!(d.in_sight_pie(&observer, Vec3::new(5.0, 1.0, 0.0), 100.0));
        assert!(!d.in_sight_pie(&observer, Vec3::new(-5.0, 0.0, 0.0), 100.0));
        assert!(!d.in_sight_pie(&observer, Vec3::new(1.0, 5.0, 0.0), 100.0));
    }

    #[test]
    fn test_radius_rejects_far_targets() {
        let d = digest(90.0);
        let observer = Pose::new(Vec3::ZERO, Vec3::X);

        assert!(d.in_sight_pie(&observer, Vec3::new(10.0, 0.0, 0.0), 100.0));
        assert!(!d.in_sight_pie(&observer, Vec3::new(10.5, 0.0, 0.0), 100.0));
    }

    #[test]
    fn test_full_half_angle_sees_all_around() {
        let d = digest(180.0);
        let observer = Pose::new(Vec3::ZERO, Vec3::X);
        assert!(d.in_sight_pie(&observer, Vec3::new(-5.0, 0.0, 0.0), 100.0));
    }

    #[test]
    fn test_coincident_target_is_visible() {
        let d = digest(10.0);
        let observer = Pose::new(Vec3::ONE, Vec3::X);
        assert!(d.in_sight_pie(&observer, Vec3::ONE, 100.0));
    }
}
