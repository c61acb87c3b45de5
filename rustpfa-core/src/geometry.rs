//! Detector geometry collaborator.

use std::collections::HashMap;
use std::fmt;

use crate::hit::HitType;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Cell size class of a calorimeter technology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Granularity {
    /// Fine cells (typically the ECal).
    #[default]
    Fine,
    /// Coarse cells.
    Coarse,
}

impl Granularity {
    /// True for fine granularity.
    #[inline]
    #[must_use]
    pub fn is_fine(self) -> bool {
        matches!(self, Self::Fine)
    }
}

/// Calorimeter sub-detectors with boundary parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SubDetector {
    /// ECal barrel.
    ECalBarrel,
    /// ECal endcap.
    ECalEndCap,
    /// HCal barrel.
    HCalBarrel,
    /// HCal endcap.
    HCalEndCap,
}

impl fmt::Display for SubDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ECalBarrel => "ECal barrel",
            Self::ECalEndCap => "ECal endcap",
            Self::HCalBarrel => "HCal barrel",
            Self::HCalEndCap => "HCal endcap",
        };
        f.write_str(name)
    }
}

/// Boundary coordinates of a sub-detector (mm).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SubDetectorParameters {
    /// Inner radius.
    pub inner_r: f32,
    /// Inner z coordinate.
    pub inner_z: f32,
    /// Outer radius.
    pub outer_r: f32,
    /// Outer z coordinate.
    pub outer_z: f32,
    /// Symmetry order of the inner polygon.
    pub inner_symmetry: u32,
    /// Symmetry order of the outer polygon.
    pub outer_symmetry: u32,
}

/// Geometry lookups needed by the algorithms.
pub trait Geometry {
    /// Granularity of a hit technology.
    fn granularity(&self, hit_type: HitType) -> Granularity;

    /// Boundary parameters, if the sub-detector is described.
    fn sub_detector(&self, sub_detector: SubDetector) -> Option<SubDetectorParameters>;
}

/// Table-driven geometry, loadable from JSON with the `serde` feature.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DetectorGeometry {
    /// Granularity per technology; unlisted technologies are coarse.
    pub granularities: HashMap<HitType, Granularity>,
    /// ECal barrel boundaries.
    pub ecal_barrel: Option<SubDetectorParameters>,
    /// ECal endcap boundaries.
    pub ecal_endcap: Option<SubDetectorParameters>,
    /// HCal barrel boundaries.
    pub hcal_barrel: Option<SubDetectorParameters>,
    /// HCal endcap boundaries.
    pub hcal_endcap: Option<SubDetectorParameters>,
}

impl Default for DetectorGeometry {
    fn default() -> Self {
        let granularities = HashMap::from([
            (HitType::ECal, Granularity::Fine),
            (HitType::HCal, Granularity::Coarse),
            (HitType::Muon, Granularity::Coarse),
        ]);
        Self {
            granularities,
            ecal_barrel: None,
            ecal_endcap: None,
            hcal_barrel: None,
            hcal_endcap: None,
        }
    }
}

impl DetectorGeometry {
    /// Sets the granularity of a technology.
    #[must_use]
    pub fn with_granularity(mut self, hit_type: HitType, granularity: Granularity) -> Self {
        self.granularities.insert(hit_type, granularity);
        self
    }

    /// Sets the parameters of a sub-detector.
    #[must_use]
    pub fn with_sub_detector(
        mut self,
        sub_detector: SubDetector,
        parameters: SubDetectorParameters,
    ) -> Self {
        *self.slot_mut(sub_detector) = Some(parameters);
        self
    }

    fn slot_mut(&mut self, sub_detector: SubDetector) -> &mut Option<SubDetectorParameters> {
        match sub_detector {
            SubDetector::ECalBarrel => &mut self.ecal_barrel,
            SubDetector::ECalEndCap => &mut self.ecal_endcap,
            SubDetector::HCalBarrel => &mut self.hcal_barrel,
            SubDetector::HCalEndCap => &mut self.hcal_endcap,
        }
    }
}

impl Geometry for DetectorGeometry {
    fn granularity(&self, hit_type: HitType) -> Granularity {
        self.granularities
            .get(&hit_type)
            .copied()
            .unwrap_or(Granularity::Coarse)
    }

    fn sub_detector(&self, sub_detector: SubDetector) -> Option<SubDetectorParameters> {
        match sub_detector {
            SubDetector::ECalBarrel => self.ecal_barrel,
            SubDetector::ECalEndCap => self.ecal_endcap,
            SubDetector::HCalBarrel => self.hcal_barrel,
            SubDetector::HCalEndCap => self.hcal_endcap,
        }
    }
}
