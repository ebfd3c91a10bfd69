//! Display units for body measurements, hydration and energy
//!
//! Values are always stored in canonical units (kilograms, centimeters,
//! milliliters, kilocalories). Each measurement kind has its own closed unit enum;
//! conversions are exhaustive matches, so a new unit cannot be added without
//! handling it everywhere.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

const MISSING: &str = "--";
const CM_PER_INCH: Decimal = dec!(2.54);
const ML_PER_GLASS: Decimal = dec!(240);

/// Conversion between a canonical stored value and a display unit
pub trait DisplayUnit: Copy {
    /// Short label shown after the value
    fn symbol(&self) -> &'static str;

    /// Decimal places shown
    fn decimals(&self) -> u32;

    /// Canonical value expressed in this unit (unrounded)
    fn from_canonical(&self, value: Decimal) -> Decimal;

    /// Value entered in this unit converted back to the canonical unit
    fn to_canonical(&self, value: Decimal) -> Decimal;

    /// Canonical value rounded for display, e.g. `154 lbs`
    fn format(&self, value: Decimal) -> String {
        let shown = round_half_up(self.from_canonical(value), self.decimals());
        format!("{} {}", shown, self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WeightUnit {
    #[default]
    #[serde(rename = "kg")]
    Kilograms,
    #[serde(rename = "lbs")]
    Pounds,
}

impl DisplayUnit for WeightUnit {
    fn symbol(&self) -> &'static str {
        match self {
            WeightUnit::Kilograms => "kg",
            WeightUnit::Pounds => "lbs",
        }
    }

    fn decimals(&self) -> u32 {
        0
    }

    fn from_canonical(&self, value: Decimal) -> Decimal {
        match self {
            WeightUnit::Kilograms => value,
            WeightUnit::Pounds => value * dec!(2.20462),
        }
    }

    fn to_canonical(&self, value: Decimal) -> Decimal {
        match self {
            WeightUnit::Kilograms => value,
            WeightUnit::Pounds => value / dec!(2.20462),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HeightUnit {
    #[default]
    #[serde(rename = "cm")]
    Centimeters,
    /// Feet and inches; single values are expressed in inches
    #[serde(rename = "ft")]
    FeetInches,
}

impl DisplayUnit for HeightUnit {
    fn symbol(&self) -> &'static str {
        match self {
            HeightUnit::Centimeters => "cm",
            HeightUnit::FeetInches => "in",
        }
    }

    fn decimals(&self) -> u32 {
        match self {
            HeightUnit::Centimeters => 0,
            HeightUnit::FeetInches => 1,
        }
    }

    fn from_canonical(&self, value: Decimal) -> Decimal {
        match self {
            HeightUnit::Centimeters => value,
            HeightUnit::FeetInches => value / CM_PER_INCH,
        }
    }

    fn to_canonical(&self, value: Decimal) -> Decimal {
        match self {
            HeightUnit::Centimeters => value,
            HeightUnit::FeetInches => value * CM_PER_INCH,
        }
    }

    /// Heights in feet read as `5'9"`
    fn format(&self, value: Decimal) -> String {
        match self {
            HeightUnit::Centimeters => format!("{} cm", round_half_up(value, 0)),
            HeightUnit::FeetInches => {
                let total_inches = round_half_up(value / CM_PER_INCH, 0);
                let feet = (total_inches / dec!(12)).floor();
                let inches = total_inches - feet * dec!(12);
                format!("{}'{}\"", feet, inches)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VolumeUnit {
    #[default]
    #[serde(rename = "ml")]
    Milliliters,
    #[serde(rename = "oz")]
    FluidOunces,
    /// 240 mL glasses
    #[serde(rename = "glasses")]
    Glasses,
}

impl DisplayUnit for VolumeUnit {
    fn symbol(&self) -> &'static str {
        match self {
            VolumeUnit::Milliliters => "ml",
            VolumeUnit::FluidOunces => "oz",
            VolumeUnit::Glasses => "glasses",
        }
    }

    fn decimals(&self) -> u32 {
        match self {
            VolumeUnit::Milliliters | VolumeUnit::FluidOunces => 0,
            VolumeUnit::Glasses => 1,
        }
    }

    fn from_canonical(&self, value: Decimal) -> Decimal {
        match self {
            VolumeUnit::Milliliters => value,
            VolumeUnit::FluidOunces => value * dec!(0.033814),
            VolumeUnit::Glasses => value / ML_PER_GLASS,
        }
    }

    fn to_canonical(&self, value: Decimal) -> Decimal {
        match self {
            VolumeUnit::Milliliters => value,
            VolumeUnit::FluidOunces => value / dec!(0.033814),
            VolumeUnit::Glasses => value * ML_PER_GLASS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EnergyUnit {
    #[default]
    #[serde(rename = "kcal")]
    Kilocalories,
    #[serde(rename = "kJ")]
    Kilojoules,
}

impl DisplayUnit for EnergyUnit {
    fn symbol(&self) -> &'static str {
        match self {
            EnergyUnit::Kilocalories => "kcal",
            EnergyUnit::Kilojoules => "kJ",
        }
    }

    fn decimals(&self) -> u32 {
        0
    }

    fn from_canonical(&self, value: Decimal) -> Decimal {
        match self {
            EnergyUnit::Kilocalories => value,
            EnergyUnit::Kilojoules => value * dec!(4.184),
        }
    }

    fn to_canonical(&self, value: Decimal) -> Decimal {
        match self {
            EnergyUnit::Kilocalories => value,
            EnergyUnit::Kilojoules => value / dec!(4.184),
        }
    }
}

/// The user's chosen display units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitPreferences {
    pub weight: WeightUnit,
    pub height: HeightUnit,
    pub volume: VolumeUnit,
    pub energy: EnergyUnit,
}

impl UnitPreferences {
    /// Weight in kilograms; unset or zero shows as `--`
    pub fn display_weight(&self, kilograms: Option<Decimal>) -> String {
        match kilograms.filter(|kg| !kg.is_zero()) {
            Some(kg) => self.weight.format(kg),
            None => MISSING.to_string(),
        }
    }

    /// Height in centimeters; unset or zero shows as `--`
    pub fn display_height(&self, centimeters: Option<Decimal>) -> String {
        match centimeters.filter(|cm| !cm.is_zero()) {
            Some(cm) => self.height.format(cm),
            None => MISSING.to_string(),
        }
    }

    /// Volume in milliliters; zero is shown, unset is `--`
    pub fn display_volume(&self, milliliters: Option<u64>) -> String {
        match milliliters {
            Some(ml) => self.volume.format(Decimal::from(ml)),
            None => MISSING.to_string(),
        }
    }

    /// Energy in kilocalories; zero is shown, unset is `--`
    pub fn display_energy(&self, kilocalories: Option<u64>) -> String {
        match kilocalories {
            Some(kcal) => self.energy.format(Decimal::from(kcal)),
            None => MISSING.to_string(),
        }
    }
}

fn round_half_up(value: Decimal, decimals: u32) -> Decimal {
    value
        .round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
}
