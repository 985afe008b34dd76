//! Climate feature flags and the command kinds a climate dispatches

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Supported-feature bit set, using the host's numeric climate values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClimateEntityFeature(u32);

impl ClimateEntityFeature {
    pub const TARGET_TEMPERATURE: Self = Self(1);
    pub const TARGET_TEMPERATURE_RANGE: Self = Self(2);
    pub const TARGET_HUMIDITY: Self = Self(4);
    pub const FAN_MODE: Self = Self(8);
    pub const PRESET_MODE: Self = Self(16);
    pub const SWING_MODE: Self = Self(32);
    pub const TURN_OFF: Self = Self(128);
    pub const TURN_ON: Self = Self(256);
    pub const SWING_HORIZONTAL_MODE: Self = Self(512);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for ClimateEntityFeature {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ClimateEntityFeature {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// What an inbound command addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DispatchKind {
    Service,
    HvacMode,
    PresetMode,
    FanMode,
    SwingMode,
    SwingHorizontalMode,
}

impl DispatchKind {
    pub const ALL: [DispatchKind; 6] = [
        DispatchKind::Service,
        DispatchKind::HvacMode,
        DispatchKind::PresetMode,
        DispatchKind::FanMode,
        DispatchKind::SwingMode,
        DispatchKind::SwingHorizontalMode,
    ];

    /// The mode kinds, in attribute order
    pub const MODES: [DispatchKind; 5] = [
        DispatchKind::HvacMode,
        DispatchKind::PresetMode,
        DispatchKind::FanMode,
        DispatchKind::SwingMode,
        DispatchKind::SwingHorizontalMode,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DispatchKind::Service => "service",
            DispatchKind::HvacMode => "hvac_mode",
            DispatchKind::PresetMode => "preset_mode",
            DispatchKind::FanMode => "fan_mode",
            DispatchKind::SwingMode => "swing_mode",
            DispatchKind::SwingHorizontalMode => "swing_horizontal_mode",
        }
    }

    /// Attribute listing the available keys (`hvac_modes`, ...)
    pub fn list_attribute(self) -> Option<&'static str> {
        match self {
            DispatchKind::Service => None,
            DispatchKind::HvacMode => Some("hvac_modes"),
            DispatchKind::PresetMode => Some("preset_modes"),
            DispatchKind::FanMode => Some("fan_modes"),
            DispatchKind::SwingMode => Some("swing_modes"),
            DispatchKind::SwingHorizontalMode => Some("swing_horizontal_modes"),
        }
    }

    /// Climate service that sets this kind of mode (`set_hvac_mode`, ...)
    pub fn setter_service(self) -> Option<String> {
        match self {
            DispatchKind::Service => None,
            mode => Some(format!("set_{}", mode.as_str())),
        }
    }

    /// Feature flag a non-empty local table of this kind advertises
    pub fn feature(self) -> ClimateEntityFeature {
        match self {
            DispatchKind::PresetMode => ClimateEntityFeature::PRESET_MODE,
            DispatchKind::FanMode => ClimateEntityFeature::FAN_MODE,
            DispatchKind::SwingMode => ClimateEntityFeature::SWING_MODE,
            DispatchKind::SwingHorizontalMode => ClimateEntityFeature::SWING_HORIZONTAL_MODE,
            DispatchKind::Service | DispatchKind::HvacMode => ClimateEntityFeature::empty(),
        }
    }
}

impl fmt::Display for DispatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Feature implied by a locally scripted service, if any
pub fn service_feature(service: &str) -> Option<ClimateEntityFeature> {
    match service {
        "turn_on" => Some(ClimateEntityFeature::TURN_ON),
        "turn_off" => Some(ClimateEntityFeature::TURN_OFF),
        "set_temperature" => Some(ClimateEntityFeature::TARGET_TEMPERATURE),
        "set_humidity" => Some(ClimateEntityFeature::TARGET_HUMIDITY),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_bits() {
        let mut features = ClimateEntityFeature::TURN_ON | ClimateEntityFeature::TURN_OFF;
        features |= ClimateEntityFeature::PRESET_MODE;

        assert_eq!(features.bits(), 256 + 128 + 16);
        assert!(features.contains(ClimateEntityFeature::TURN_ON));
        assert!(!features.contains(ClimateEntityFeature::FAN_MODE));
        assert!(features.intersects(ClimateEntityFeature::FAN_MODE | ClimateEntityFeature::TURN_OFF));
        assert_eq!(ClimateEntityFeature::from_bits(385), ClimateEntityFeature::from_bits(1 | 128 | 256));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(DispatchKind::HvacMode.list_attribute(), Some("hvac_modes"));
        assert_eq!(
            DispatchKind::SwingHorizontalMode.setter_service().as_deref(),
            Some("set_swing_horizontal_mode")
        );
        assert_eq!(DispatchKind::Service.setter_service(), None);
        assert_eq!(DispatchKind::FanMode.to_string(), "fan_mode");
        assert_eq!(DispatchKind::HvacMode.feature(), ClimateEntityFeature::empty());
    }

    #[test]
    fn test_service_feature() {
        assert_eq!(service_feature("turn_on"), Some(ClimateEntityFeature::TURN_ON));
        assert_eq!(service_feature("set_humidity"), Some(ClimateEntityFeature::TARGET_HUMIDITY));
        assert_eq!(service_feature("toggle"), None);
    }
}
