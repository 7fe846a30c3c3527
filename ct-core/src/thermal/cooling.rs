//! Fan cooling channels
//!
//! Cooling states 0-10 map onto PWM duty 0-255. Each channel carries a floor
//! table: writing state `s` drives duty for `levels[s]`, so raising the floor
//! raises every lower state with it.
//!
//! Requests in `MAX_STATE + 2 ..= 2 * MAX_STATE` are floor adjustments, not
//! states: the floor becomes `request - MAX_STATE`.

use std::sync::Arc;

use ct_protocol::{Mfcr, Mfsc, Mfsl, RegisterId};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::constants::cooling::{DEFAULT_FLOOR, MAX_DUTY, MAX_STATE, OWN_TYPE};
use crate::error::{Result, ThermalError};
use crate::hw::{query_checked, write_checked, RegisterTransport};

const LEVELS: usize = MAX_STATE as usize + 1;

/// Nearest duty cycle for a cooling state
pub fn duty_from_state(state: u32) -> u8 {
    let state = state.min(MAX_STATE);
    ((state * MAX_DUTY + MAX_STATE / 2) / MAX_STATE) as u8
}

/// Nearest cooling state for a duty cycle
pub fn state_from_duty(duty: u8) -> u32 {
    (u32::from(duty) * MAX_STATE + MAX_DUTY / 2) / MAX_DUTY
}

/// A cooling device a trip can be bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CoolingDevice {
    pub type_name: String,
    pub id: u32,
}

impl CoolingDevice {
    pub fn new(type_name: impl Into<String>, id: u32) -> Self {
        Self {
            type_name: type_name.into(),
            id,
        }
    }
}

#[derive(Debug)]
struct CoolingChannel {
    pwm: u8,
    levels: Mutex<[u32; LEVELS]>,
}

impl CoolingChannel {
    fn new(pwm: u8) -> Self {
        let mut levels = [0u32; LEVELS];
        for (i, level) in levels.iter_mut().enumerate() {
            *level = DEFAULT_FLOOR.max(i as u32);
        }
        Self {
            pwm,
            levels: Mutex::new(levels),
        }
    }
}

pub struct CoolingController {
    transport: Arc<dyn RegisterTransport>,
    channels: Vec<CoolingChannel>,
    tachos: Vec<u8>,
}

impl CoolingController {
    /// Discover fans, clear tachometer minimums and create one channel per PWM
    pub fn probe(transport: Arc<dyn RegisterTransport>) -> Result<Self> {
        let payload = query_checked(transport.as_ref(), RegisterId::Mfcr, &Mfcr::default().pack())?;
        let mfcr = Mfcr::unpack(&payload)?;

        let tachos: Vec<u8> = mfcr.active_tachos().collect();
        for &tacho in &tachos {
            let payload = query_checked(transport.as_ref(), RegisterId::Mfsl, &Mfsl::query(tacho).pack())?;
            let mut mfsl = Mfsl::unpack(&payload)?;
            mfsl.tach_min = 0;
            write_checked(transport.as_ref(), RegisterId::Mfsl, &mfsl.pack())?;
        }

        let channels: Vec<CoolingChannel> = mfcr.active_pwms().map(CoolingChannel::new).collect();
        info!(tachos = tachos.len(), channels = channels.len(), "cooling probed");

        Ok(Self {
            transport,
            channels,
            tachos,
        })
    }

    pub fn max_state(&self) -> u32 {
        MAX_STATE
    }

    /// PWM indices of the channels
    pub fn channels(&self) -> Vec<u8> {
        self.channels.iter().map(|c| c.pwm).collect()
    }

    /// Active tachometers
    pub fn tachos(&self) -> &[u8] {
        &self.tachos
    }

    /// Bindable identity of a channel
    pub fn device(&self, pwm: u8) -> Result<CoolingDevice> {
        let channel = self.channel(pwm)?;
        Ok(CoolingDevice::new(OWN_TYPE, u32::from(channel.pwm)))
    }

    pub fn devices(&self) -> Vec<CoolingDevice> {
        self.channels
            .iter()
            .map(|c| CoolingDevice::new(OWN_TYPE, u32::from(c.pwm)))
            .collect()
    }

    /// True if the device is one of this controller's channels
    pub fn owns(&self, device: &CoolingDevice) -> bool {
        device.type_name == OWN_TYPE && self.channels.iter().any(|c| u32::from(c.pwm) == device.id)
    }

    /// Floor table of a channel
    pub fn levels(&self, pwm: u8) -> Result<[u32; LEVELS]> {
        Ok(*self.channel(pwm)?.levels.lock())
    }

    /// Current state, read back from the device duty
    pub fn get_state(&self, pwm: u8) -> Result<u32> {
        let channel = self.channel(pwm)?;
        Ok(state_from_duty(self.read_duty(channel)?))
    }

    pub fn set_state(&self, pwm: u8, requested: u32) -> Result<()> {
        let channel = self.channel(pwm)?;
        let mut state = requested;

        if (MAX_STATE + 2..=2 * MAX_STATE).contains(&requested) {
            let floor = requested - MAX_STATE;
            {
                let mut levels = channel.levels.lock();
                for (i, level) in levels.iter_mut().enumerate() {
                    *level = floor.max(i as u32);
                }
            }
            info!(pwm, floor, "cooling floor adjusted");

            let current = state_from_duty(self.read_duty(channel)?);
            if current >= floor {
                return Ok(());
            }
            state = current;
        }

        if state > MAX_STATE {
            return Err(ThermalError::invalid_argument(format!(
                "cooling state {} out of range (0-{})",
                requested, MAX_STATE
            )));
        }

        let level = channel.levels.lock()[state as usize];
        let duty = duty_from_state(level);
        debug!(pwm, state, level, duty, "set cooling state");
        write_checked(self.transport.as_ref(), RegisterId::Mfsc, &Mfsc::new(pwm, duty).pack())
    }

    fn channel(&self, pwm: u8) -> Result<&CoolingChannel> {
        self.channels
            .iter()
            .find(|c| c.pwm == pwm)
            .ok_or_else(|| ThermalError::invalid_argument(format!("no cooling channel for PWM {}", pwm)))
    }

    fn read_duty(&self, channel: &CoolingChannel) -> Result<u8> {
        let payload = query_checked(
            self.transport.as_ref(),
            RegisterId::Mfsc,
            &Mfsc::new(channel.pwm, 0).pack(),
        )?;
        Ok(Mfsc::unpack(&payload)?.duty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ChassisProfile;
    use crate::hw::{InjectedFailure, SimulatedChassis};

    fn setup() -> (Arc<SimulatedChassis>, CoolingController) {
        let sim = Arc::new(SimulatedChassis::new(&ChassisProfile::bare()));
        let cooling = CoolingController::probe(sim.clone()).unwrap();
        (sim, cooling)
    }

    #[test]
    fn test_duty_state_round_trip() {
        for s in 0..=MAX_STATE {
            let back = state_from_duty(duty_from_state(s));
            assert!(back.abs_diff(s) <= 1, "state {} came back as {}", s, back);
        }
        assert_eq!(duty_from_state(0), 0);
        assert_eq!(duty_from_state(MAX_STATE), 255);
        assert_eq!(duty_from_state(6), 153);
        assert_eq!(state_from_duty(255), MAX_STATE);
    }

    #[test]
    fn test_probe_clears_tach_min_and_creates_channels() {
        let (sim, cooling) = setup();
        assert_eq!(cooling.channels(), vec![0]);
        assert_eq!(cooling.tachos(), &[0, 1, 2, 3]);
        for tacho in 0..4 {
            assert_eq!(sim.tach_min(tacho), Some(0));
        }
        assert_eq!(cooling.levels(0).unwrap(), [2, 2, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        assert_eq!(cooling.max_state(), 10);
    }

    #[test]
    fn test_probe_failure() {
        let sim = Arc::new(SimulatedChassis::new(&ChassisProfile::bare()));
        sim.inject_failure(RegisterId::Mfsl, InjectedFailure::Status(1));
        assert!(CoolingController::probe(sim).is_err());
    }

    #[test]
    fn test_set_state_applies_floor_table() {
        let (sim, cooling) = setup();
        cooling.set_state(0, 1).unwrap();
        assert_eq!(sim.duty(0), Some(duty_from_state(2)));
        cooling.set_state(0, 7).unwrap();
        assert_eq!(sim.duty(0), Some(duty_from_state(7)));
        assert_eq!(cooling.get_state(0).unwrap(), 7);
    }

    #[test]
    fn test_floor_request_raises_table() {
        let (sim, cooling) = setup();
        sim.set_duty(0, duty_from_state(3));

        cooling.set_state(0, 16).unwrap();
        assert_eq!(cooling.levels(0).unwrap(), [6, 6, 6, 6, 6, 6, 6, 7, 8, 9, 10]);
        // current state 3 was below the floor, re-applied through the table
        assert_eq!(sim.duty(0), Some(duty_from_state(6)));
    }

    #[test]
    fn test_floor_request_keeps_faster_fan() {
        let (sim, cooling) = setup();
        sim.set_duty(0, duty_from_state(8));
        cooling.set_state(0, 14).unwrap();
        assert_eq!(sim.duty(0), Some(duty_from_state(8)));
        assert_eq!(cooling.levels(0).unwrap()[0], 4);
    }

    #[test]
    fn test_out_of_range_states() {
        let (_sim, cooling) = setup();
        assert!(matches!(cooling.set_state(0, 11), Err(ThermalError::InvalidArgument(_))));
        assert!(matches!(cooling.set_state(0, 21), Err(ThermalError::InvalidArgument(_))));
        assert!(matches!(cooling.set_state(3, 1), Err(ThermalError::InvalidArgument(_))));
    }

    #[test]
    fn test_write_failure_is_io() {
        let (sim, cooling) = setup();
        sim.inject_failure(RegisterId::Mfsc, InjectedFailure::Transport);
        assert!(cooling.set_state(0, 5).unwrap_err().is_io());
        assert!(cooling.get_state(0).unwrap_err().is_io());
    }

    #[test]
    fn test_ownership() {
        let (_sim, cooling) = setup();
        assert!(cooling.owns(&cooling.device(0).unwrap()));
        assert!(!cooling.owns(&CoolingDevice::new(OWN_TYPE, 9)));
        assert!(!cooling.owns(&CoolingDevice::new("mlxreg_fan", 0)));
    }
}
