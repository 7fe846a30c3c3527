//! Step-wise governor
//!
//! Polls every enabled zone when its interval elapses and moves the bound fan
//! channels one cooling state at a time. At or above a trip the state is kept
//! inside that trip's range, and the hottest zone (trend raising) steps it up
//! by one. Below every trip the state steps down toward 0.
//!
//! A channel bound to several zones follows the highest target among the
//! zones polled in the same pass.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, warn};

use ct_core::{ThermalController, ThermalError, ThermalZone, Trend, TripBinding, ZoneId, ZoneMode};

/// Consecutive failed passes before fans are forced to full speed
pub const MAX_CONSECUTIVE_ERRORS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneReading {
    pub zone: String,
    pub temperature_mc: i32,
    pub trend: Trend,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelState {
    pub pwm: u8,
    pub state: u32,
}

/// Outcome of one governor pass
#[derive(Debug, Default, Serialize)]
pub struct PassReport {
    pub readings: Vec<ZoneReading>,
    pub channels: Vec<ChannelState>,
    pub errors: Vec<String>,
}

impl PassReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Next state for a channel bound to `bindings` of one zone
///
/// `bindings` must all refer to the same channel.
pub fn step_target(bindings: &[&TripBinding], temp_mc: i32, trips_mc: &[i32], trend: Trend, current: u32) -> u32 {
    let reached = trips_mc.iter().rposition(|&trip| temp_mc >= trip);
    match reached.and_then(|i| bindings.iter().find(|b| b.trip == i)) {
        Some(binding) if trend == Trend::Raising => (current + 1).clamp(binding.min_state, binding.max_state),
        Some(binding) => current.clamp(binding.min_state, binding.max_state),
        None if reached.is_some() => current,
        None => current.saturating_sub(1),
    }
}

pub struct Governor {
    controller: Arc<ThermalController>,
    last_polled: HashMap<ZoneId, Instant>,
}

impl Governor {
    pub fn new(controller: Arc<ThermalController>) -> Self {
        Self {
            controller,
            last_polled: HashMap::new(),
        }
    }

    fn is_due(&self, zone: &ThermalZone, now: Instant) -> bool {
        if zone.mode() == ZoneMode::Disabled || zone.polling_delay_ms() == 0 {
            return false;
        }
        match self.last_polled.get(&zone.id()) {
            Some(last) => now.saturating_duration_since(*last) >= Duration::from_millis(zone.polling_delay_ms()),
            None => true,
        }
    }

    /// Poll due zones and apply the resulting channel states
    pub fn pass(&mut self, now: Instant) -> PassReport {
        let controller = Arc::clone(&self.controller);
        let cooling = controller.cooling();
        let ctx = controller.context();
        let mut report = PassReport::default();

        let zones = controller.zones();
        self.last_polled.retain(|id, _| zones.iter().any(|z| z.id() == *id));

        let mut current: BTreeMap<u8, u32> = BTreeMap::new();
        for pwm in cooling.channels() {
            match cooling.get_state(pwm) {
                Ok(state) => {
                    current.insert(pwm, state);
                }
                Err(e) => report.errors.push(format!("pwm {}: {}", pwm, e)),
            }
        }

        let due: Vec<Arc<ThermalZone>> = zones.iter().filter(|z| self.is_due(z, now)).cloned().collect();
        let mut targets: BTreeMap<u8, u32> = BTreeMap::new();
        for zone in &due {
            self.last_polled.insert(zone.id(), now);

            let temp = match zone.read_temperature(&ctx) {
                Ok(temp) => temp,
                Err(ThermalError::SlotInactive(slot)) => {
                    debug!(zone = zone.name(), slot, "zone retired mid-pass");
                    continue;
                }
                Err(e) => {
                    report.errors.push(format!("{}: {}", zone.name(), e));
                    continue;
                }
            };

            let trend = zone.trend(controller.arbiter());
            let trips_mc: Vec<i32> = zone.trips().iter().map(|t| t.temp_mc).collect();
            let bindings = zone.bindings();

            for (&pwm, &state) in &current {
                let bound: Vec<&TripBinding> = bindings
                    .iter()
                    .filter(|b| cooling.owns(&b.device) && b.device.id == u32::from(pwm))
                    .collect();
                if bound.is_empty() {
                    continue;
                }
                let target = step_target(&bound, temp, &trips_mc, trend, state);
                let entry = targets.entry(pwm).or_insert(target);
                *entry = (*entry).max(target);
            }

            report.readings.push(ZoneReading {
                zone: zone.name().to_string(),
                temperature_mc: temp,
                trend,
            });
        }

        for (pwm, target) in targets {
            if current.get(&pwm) != Some(&target) {
                debug!(pwm, target, "step cooling state");
                if let Err(e) = cooling.set_state(pwm, target) {
                    report.errors.push(format!("pwm {}: {}", pwm, e));
                }
            }
        }

        for pwm in cooling.channels() {
            if let Ok(state) = cooling.get_state(pwm) {
                report.channels.push(ChannelState { pwm, state });
            }
        }
        report
    }

    /// Drive every channel to full speed
    pub fn apply_fallback(&self) {
        let cooling = self.controller.cooling();
        let max = cooling.max_state();
        for pwm in cooling.channels() {
            match cooling.set_state(pwm, max) {
                Ok(()) => warn!(pwm, "fan forced to full speed"),
                Err(e) => error!(pwm, error = %e, "failed to apply fallback speed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ct_core::{ChassisProfile, CoolingDevice, Settings, SimulatedChassis};

    fn binding(trip: usize, min_state: u32, max_state: u32) -> TripBinding {
        TripBinding {
            trip,
            device: CoolingDevice::new("chassis_fan", 0),
            min_state,
            max_state,
            weight: 1,
        }
    }

    fn setup() -> (Arc<SimulatedChassis>, Governor) {
        let mut settings = Settings::default();
        settings.chassis = ChassisProfile {
            initial_duty: 0,
            ..ChassisProfile::default()
        };
        let sim = Arc::new(SimulatedChassis::new(&settings.chassis));
        let controller = Arc::new(ThermalController::new(sim.clone(), &settings).unwrap());
        (sim, Governor::new(controller))
    }

    fn run(governor: &mut Governor, clock: &mut Instant, passes: u32) -> PassReport {
        let mut report = PassReport::default();
        for _ in 0..passes {
            *clock += Duration::from_secs(60);
            report = governor.pass(*clock);
        }
        report
    }

    #[test]
    fn test_step_target() {
        let table = [binding(0, 0, 4), binding(1, 4, 10), binding(2, 10, 10)];
        let bound: Vec<&TripBinding> = table.iter().collect();
        let trips = [75_000, 85_000, 105_000];

        assert_eq!(step_target(&bound, 80_000, &trips, Trend::Raising, 1), 2);
        assert_eq!(step_target(&bound, 80_000, &trips, Trend::Raising, 4), 4);
        assert_eq!(step_target(&bound, 80_000, &trips, Trend::Stable, 3), 3);
        assert_eq!(step_target(&bound, 90_000, &trips, Trend::Stable, 1), 4);
        assert_eq!(step_target(&bound, 110_000, &trips, Trend::Stable, 3), 10);
        assert_eq!(step_target(&bound, 50_000, &trips, Trend::Stable, 3), 2);
        assert_eq!(step_target(&bound, 50_000, &trips, Trend::Raising, 3), 2);
        assert_eq!(step_target(&bound, 50_000, &trips, Trend::Stable, 0), 0);

        // reached trip without a binding for this channel
        assert_eq!(step_target(&bound[..1], 90_000, &trips, Trend::Raising, 6), 6);
    }

    #[test]
    fn test_hot_chassis_steps_fans_up() {
        let (sim, mut governor) = setup();
        let mut clock = Instant::now();
        sim.set_sensor_temperature(0, 0, 80_000);

        let report = run(&mut governor, &mut clock, 6);
        assert!(report.is_ok(), "{:?}", report.errors);
        assert_eq!(report.channels, vec![ChannelState { pwm: 0, state: 4 }]);

        sim.set_sensor_temperature(0, 0, 90_000);
        let report = run(&mut governor, &mut clock, 8);
        assert_eq!(report.channels[0].state, 10);
    }

    #[test]
    fn test_cool_chassis_settles_on_floor() {
        let (sim, mut governor) = setup();
        let mut clock = Instant::now();
        sim.set_sensor_temperature(0, 0, 90_000);
        assert_eq!(run(&mut governor, &mut clock, 3).channels[0].state, 6);

        sim.set_sensor_temperature(0, 0, 40_000);
        let report = run(&mut governor, &mut clock, 12);
        assert_eq!(report.channels[0].state, 2);
    }

    #[test]
    fn test_zones_polled_on_their_interval() {
        let (_sim, mut governor) = setup();
        let start = Instant::now();
        let first = governor.pass(start);
        assert_eq!(first.readings.len(), governor.controller.zones().len());

        let early = governor.pass(start + Duration::from_millis(10));
        assert!(early.readings.is_empty());

        let later = governor.pass(start + Duration::from_millis(1_000));
        assert_eq!(later.readings.len(), first.readings.len());
    }

    #[test]
    fn test_disabled_zones_are_skipped() {
        let (_sim, mut governor) = setup();
        for zone in governor.controller.zones() {
            zone.set_mode(ZoneMode::Disabled);
        }
        assert!(governor.pass(Instant::now()).readings.is_empty());
    }

    #[test]
    fn test_fallback_forces_full_speed() {
        let (sim, governor) = setup();
        governor.apply_fallback();
        assert_eq!(sim.duty(0), Some(255));
    }
}
