//! Trip point tables
//!
//! Every zone has exactly three trips: normal, high and hot. Their
//! temperatures must be non-decreasing in that order.

use serde::Serialize;

use crate::constants::cooling::MAX_STATE;
use crate::constants::thermal::{
    self, HYSTERESIS_MC, MODULE_TEMP_SHIFT_MC, TRIP_COUNT, TRIP_HIGH, TRIP_HOT, TRIP_NORMAL,
};
use crate::eeprom::Thresholds;
use crate::error::{Result, ThermalError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TripKind {
    Active,
    Hot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TripPoint {
    pub kind: TripKind,
    pub temp_mc: i32,
    pub hysteresis_mc: i32,
    /// Lowest cooling state bound to this trip
    pub min_state: u32,
    /// Highest cooling state bound to this trip
    pub max_state: u32,
}

pub type TripTable = [TripPoint; TRIP_COUNT];

/// Trip table with the standard kinds and state ranges
pub fn default_trips(normal_mc: i32, high_mc: i32, hot_mc: i32) -> TripTable {
    [
        TripPoint {
            kind: TripKind::Active,
            temp_mc: normal_mc,
            hysteresis_mc: HYSTERESIS_MC,
            min_state: 0,
            max_state: MAX_STATE * 4 / 10,
        },
        TripPoint {
            kind: TripKind::Active,
            temp_mc: high_mc,
            hysteresis_mc: HYSTERESIS_MC,
            min_state: MAX_STATE * 4 / 10,
            max_state: MAX_STATE,
        },
        TripPoint {
            kind: TripKind::Hot,
            temp_mc: hot_mc,
            hysteresis_mc: HYSTERESIS_MC,
            min_state: MAX_STATE,
            max_state: MAX_STATE,
        },
    ]
}

pub fn chassis_trips() -> TripTable {
    default_trips(
        thermal::ASIC_TEMP_NORM_MC,
        thermal::ASIC_TEMP_HIGH_MC,
        thermal::ASIC_TEMP_HOT_MC,
    )
}

pub fn module_trips() -> TripTable {
    default_trips(
        thermal::MODULE_TEMP_NORM_MC,
        thermal::MODULE_TEMP_HIGH_MC,
        thermal::MODULE_TEMP_HOT_MC,
    )
}

pub fn is_monotonic(trips: &TripTable) -> bool {
    trips.windows(2).all(|w| w[0].temp_mc <= w[1].temp_mc)
}

/// Validate a trip index
pub fn check_index(index: usize) -> Result<usize> {
    if index >= TRIP_COUNT {
        return Err(ThermalError::invalid_argument(format!(
            "trip index {} out of range (0-{})",
            index,
            TRIP_COUNT - 1
        )));
    }
    Ok(index)
}

/// Derive module trip temperatures from its thresholds
///
/// Normal sits two hysteresis steps below critical, or at critical when that
/// would not be positive. High is critical and hot is emergency.
pub fn derive_module_trips(current: &TripTable, thresholds: &Thresholds) -> Result<TripTable> {
    thresholds.check()?;

    let crit = thresholds.crit_mc;
    let normal = if crit - MODULE_TEMP_SHIFT_MC > 0 {
        crit - MODULE_TEMP_SHIFT_MC
    } else {
        crit
    };

    let mut trips = *current;
    trips[TRIP_NORMAL].temp_mc = normal;
    trips[TRIP_HIGH].temp_mc = crit;
    trips[TRIP_HOT].temp_mc = thresholds.emerg_mc;
    Ok(trips)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tables() {
        let trips = chassis_trips();
        assert_eq!(trips.map(|t| t.temp_mc), [75_000, 85_000, 105_000]);
        assert_eq!(trips.map(|t| t.kind), [TripKind::Active, TripKind::Active, TripKind::Hot]);
        assert_eq!(trips.map(|t| (t.min_state, t.max_state)), [(0, 4), (4, 10), (10, 10)]);
        assert!(trips.iter().all(|t| t.hysteresis_mc == 5_000));

        assert_eq!(module_trips().map(|t| t.temp_mc), [60_000, 70_000, 80_000]);
    }

    #[test]
    fn test_derivation() {
        let th = Thresholds { crit_mc: 70_000, emerg_mc: 80_000 };
        let trips = derive_module_trips(&module_trips(), &th).unwrap();
        assert_eq!(trips.map(|t| t.temp_mc), [60_000, 70_000, 80_000]);
        assert!(is_monotonic(&trips));
    }

    #[test]
    fn test_derivation_low_critical_keeps_normal_at_critical() {
        let th = Thresholds { crit_mc: 8_000, emerg_mc: 20_000 };
        let trips = derive_module_trips(&module_trips(), &th).unwrap();
        assert_eq!(trips.map(|t| t.temp_mc), [8_000, 8_000, 20_000]);

        let th = Thresholds { crit_mc: 10_000, emerg_mc: 20_000 };
        let trips = derive_module_trips(&module_trips(), &th).unwrap();
        assert_eq!(trips[TRIP_NORMAL].temp_mc, 10_000);
    }

    #[test]
    fn test_derivation_rejects_inconsistent_thresholds() {
        let th = Thresholds { crit_mc: 80_000, emerg_mc: 70_000 };
        assert!(matches!(
            derive_module_trips(&module_trips(), &th),
            Err(ThermalError::ThresholdInconsistency { .. })
        ));
    }

    #[test]
    fn test_check_index() {
        assert_eq!(check_index(2).unwrap(), 2);
        assert!(matches!(check_index(3), Err(ThermalError::InvalidArgument(_))));
    }

    #[test]
    fn test_monotonic() {
        let mut trips = module_trips();
        assert!(is_monotonic(&trips));
        trips[TRIP_HIGH].temp_mc = trips[TRIP_HOT].temp_mc + 1;
        assert!(!is_monotonic(&trips));
    }
}
