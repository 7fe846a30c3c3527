/*
 * This file is part of chassis-thermal.
 *
 * Copyright (C) 2025 chassis-thermal contributors
 *
 * chassis-thermal is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * chassis-thermal is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with chassis-thermal. If not, see <https://www.gnu.org/licenses/>.
 */

//! ctctl command execution
//!
//! Every command renders to a string so the binary only prints.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::json;

use ct_core::{
    module_label, save_settings, EepromPagedReader, Monitor, Settings, ThermalController, ThermalError, TripPoint,
    ZoneKind,
};

use crate::cli::Command;
use crate::logger::log_event;

const DUMP_WIDTH: usize = 16;

/// Classic offset / hex / ASCII dump
pub fn hex_dump(offset: u32, bytes: &[u8]) -> String {
    let mut out = String::new();
    for (row, chunk) in bytes.chunks(DUMP_WIDTH).enumerate() {
        let address = offset as usize + row * DUMP_WIDTH;
        let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
        let ascii: String = chunk
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        let _ = writeln!(out, "{:08x}: {:<47}  |{}|", address, hex.join(" "), ascii);
    }
    out
}

fn celsius(mc: i32) -> String {
    format!("{:.3}", f64::from(mc) / 1000.0)
}

fn trip_summary(trips: &[TripPoint]) -> String {
    trips
        .iter()
        .map(|t| celsius(t.temp_mc))
        .collect::<Vec<_>>()
        .join("/")
}

fn zones(controller: &ThermalController) -> String {
    let ctx = controller.context();
    let zones = controller.zones();
    // read everything before asking for trends so the arbiter has seen all zones
    let readings: Vec<Result<i32, ThermalError>> = zones.iter().map(|z| z.read_temperature(&ctx)).collect();

    let mut out = String::new();
    let _ = writeln!(out, "{:<16} {:<9} {:>10} {:<26} {}", "ZONE", "MODE", "TEMP(C)", "TRIPS(C)", "TREND");
    for (zone, reading) in zones.iter().zip(readings) {
        let temp = match reading {
            Ok(mc) => celsius(mc),
            Err(e) => format!("error: {}", e),
        };
        let _ = writeln!(
            out,
            "{:<16} {:<9} {:>10} {:<26} {:?}",
            zone.name(),
            format!("{:?}", zone.mode()).to_lowercase(),
            temp,
            trip_summary(&zone.trips()),
            zone.trend(controller.arbiter())
        );
    }
    out
}

fn fans(controller: &ThermalController) -> anyhow::Result<String> {
    let cooling = controller.cooling();
    let monitor = controller.monitor();
    let mut out = String::new();

    for pwm in cooling.channels() {
        let duty = monitor.pwm_duty(pwm)?;
        let state = cooling.get_state(pwm)?;
        let levels = cooling.levels(pwm)?;
        let _ = writeln!(
            out,
            "pwm{}: duty {:>3} state {:>2}/{} floor {}",
            pwm,
            duty,
            state,
            cooling.max_state(),
            levels[0]
        );
    }
    for fan in monitor.fans()? {
        let _ = writeln!(
            out,
            "fan{}: {:>5} rpm{}",
            u16::from(fan.tacho) + 1,
            fan.rpm,
            if fan.fault { " FAULT" } else { "" }
        );
    }
    Ok(out)
}

fn module_info(controller: &ThermalController, slot: u8, module: u8) -> anyhow::Result<String> {
    let reader = EepromPagedReader::new(controller.transport());
    let info = reader
        .module_info(slot, module)
        .with_context(|| format!("slot {} module {}", slot, module))?;

    let monitor: Monitor<'_> = controller.monitor();
    let label = module_label(controller.slot_name(slot), module);
    let mut out = String::new();
    let _ = writeln!(out, "{}", label);
    let _ = writeln!(out, "  identifier: 0x{:02x}", info.identifier);
    let _ = writeln!(out, "  standard:   {}", info.standard);
    let _ = writeln!(out, "  eeprom:     {} bytes", info.eeprom_len);

    let temperature = monitor.module_temperature(slot, module)?;
    let thresholds = monitor.module_thresholds(slot, module)?;
    let fault = monitor.module_temperature_fault(slot, module)?;
    let _ = writeln!(
        out,
        "  temp:       {} C{}",
        celsius(temperature),
        if fault { " (untrusted)" } else { "" }
    );
    let _ = writeln!(
        out,
        "  thresholds: crit {} C, emerg {} C",
        celsius(thresholds.crit_mc),
        celsius(thresholds.emerg_mc)
    );
    Ok(out)
}

fn slot_zones(controller: &ThermalController, slot: u8) -> Vec<String> {
    controller
        .zones()
        .iter()
        .filter(|z| match z.kind() {
            ZoneKind::Chassis => false,
            kind => kind.slot() == slot,
        })
        .map(|z| z.name().to_string())
        .collect()
}

/// Execute one command against the controller
pub fn run(controller: &ThermalController, command: &Command) -> anyhow::Result<String> {
    match *command {
        Command::Eeprom {
            slot,
            module,
            offset,
            length,
        } => {
            let bytes = EepromPagedReader::new(controller.transport())
                .read_bulk(slot, module, offset, length)
                .with_context(|| format!("reading slot {} module {}", slot, module))?;
            log_event(
                "eeprom_dump",
                json!({ "slot": slot, "module": module, "offset": offset, "length": bytes.len() }),
            );
            Ok(hex_dump(offset, &bytes))
        }
        Command::ModuleInfo { slot, module } => module_info(controller, slot, module),
        Command::Zones => Ok(zones(controller)),
        Command::Fans => fans(controller),
        Command::Floor { channel, state } => {
            controller.cooling().set_state(channel, state)?;
            log_event("cooling_state", json!({ "channel": channel, "state": state }));
            let levels = controller.cooling().levels(channel)?;
            Ok(format!(
                "pwm{}: state {} levels {:?}\n",
                channel,
                controller.cooling().get_state(channel)?,
                levels
            ))
        }
        Command::Activate { slot } => {
            controller.activate_slot(slot)?;
            log_event("slot_activated", json!({ "slot": slot }));
            Ok(format!("slot {} active: {}\n", slot, slot_zones(controller, slot).join(", ")))
        }
        Command::Deactivate { slot } => {
            controller.deactivate_slot(slot)?;
            log_event("slot_deactivated", json!({ "slot": slot }));
            Ok(format!("slot {} inactive\n", slot))
        }
    }
}

/// Remember a line-card state change in the settings file
///
/// The next controller built from these settings brings active line cards
/// up. Returns the path written, or `None` when the command changes nothing.
pub fn persist_slot_state(settings: &mut Settings, path: &Path, command: &Command) -> anyhow::Result<Option<PathBuf>> {
    let (slot, active) = match *command {
        Command::Activate { slot } => (slot, true),
        Command::Deactivate { slot } => (slot, false),
        _ => return Ok(None),
    };
    if !settings.chassis.set_slot_active(slot, active) {
        anyhow::bail!("slot {} is not described in the chassis profile", slot);
    }

    let written = save_settings(settings, Some(path)).with_context(|| format!("saving {}", path.display()))?;
    log_event(
        "settings_saved",
        json!({ "path": written.display().to_string(), "slot": slot, "active": active }),
    );
    Ok(Some(written))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_dump_layout() {
        let dump = hex_dump(0x80, b"ABCDEFGHIJKLMNOP\x00\x01");
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("00000080: 41 42 43"));
        assert!(lines[0].ends_with("|ABCDEFGHIJKLMNOP|"));
        assert!(lines[1].starts_with("00000090: 00 01"));
        assert!(lines[1].ends_with("|..|"));
    }

    #[test]
    fn test_celsius() {
        assert_eq!(celsius(52_125), "52.125");
        assert_eq!(celsius(-500), "-0.500");
    }
}
