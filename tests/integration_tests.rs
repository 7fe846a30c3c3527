/*
 * Integration tests for chassis-thermal
 *
 * These drive the controller end-to-end through the public API, the way
 * ctctl and chassis-thermald use it.
 */

use std::sync::Arc;

use chassis_thermal::cli::{Cli, Command};
use clap::Parser;
use chassis_thermal::{commands, logger};
use ct_core::constants::eeprom::id;
use ct_core::{
    load_settings, save_settings, ChassisProfile, EepromPagedReader, ModuleProfile, ModuleStandard, Settings,
    SimulatedChassis, ThermalController, ThermalError, Trend,
};
use serial_test::serial;

fn setup() -> (Arc<SimulatedChassis>, ThermalController) {
    let settings = Settings::default();
    let sim = Arc::new(SimulatedChassis::new(&settings.chassis));
    let controller = ThermalController::new(sim.clone(), &settings).unwrap();
    (sim, controller)
}

fn command(line: &str) -> Command {
    Cli::try_parse_from(std::iter::once("ctctl").chain(line.split_whitespace()))
        .unwrap()
        .command
}

#[test]
#[serial]
fn test_line_card_cycle_through_commands() {
    let (_sim, controller) = setup();

    let out = commands::run(&controller, &command("activate 1")).unwrap();
    assert!(out.contains("lc1-module1"), "{}", out);
    assert!(out.contains("lc1-gearbox2"), "{}", out);

    let zones = commands::run(&controller, &command("zones")).unwrap();
    assert!(zones.contains("lc1-gearbox1"));
    assert!(zones.contains("58.000"), "{}", zones);

    assert!(commands::run(&controller, &command("activate 1")).is_err());
    commands::run(&controller, &command("deactivate 1")).unwrap();
    let zones = commands::run(&controller, &command("zones")).unwrap();
    assert!(!zones.contains("lc1-"));

    let err = commands::run(&controller, &command("deactivate 1")).unwrap_err();
    assert!(matches!(err.downcast_ref::<ThermalError>(), Some(ThermalError::SlotInactive(1))));
}

#[test]
#[serial]
fn test_eeprom_dump_matches_module_image() {
    let (sim, controller) = setup();
    let image = sim.module_image(0, 0).unwrap();

    let bytes = EepromPagedReader::new(controller.transport())
        .read_bulk(0, 0, 0, image.len())
        .unwrap();
    assert_eq!(bytes, image);

    let dump = commands::run(&controller, &command("eeprom 0 0 0x80 32")).unwrap();
    assert_eq!(dump.lines().count(), 2);
    assert!(dump.starts_with("00000080: "));

    assert!(commands::run(&controller, &command("eeprom 0 0 0 0")).is_err());
}

#[test]
#[serial]
fn test_module_info_command() {
    let (_sim, controller) = setup();
    let info = EepromPagedReader::new(controller.transport()).module_info(0, 2).unwrap();
    assert_eq!(info.standard, ModuleStandard::Sff8472);
    assert_eq!(info.eeprom_len, 512);

    let out = commands::run(&controller, &command("module-info 0 1")).unwrap();
    assert!(out.starts_with("front panel 002"), "{}", out);
    assert!(out.contains("crit 75.000 C, emerg 85.000 C"), "{}", out);
}

#[test]
#[serial]
fn test_floor_command_raises_minimum() {
    let (sim, controller) = setup();
    sim.set_duty(0, 0);

    let out = commands::run(&controller, &command("floor 0 16")).unwrap();
    assert!(out.contains("levels [6, 6, 6, 6, 6, 6, 6, 7, 8, 9, 10]"), "{}", out);
    assert_eq!(controller.cooling().get_state(0).unwrap(), 6);

    assert!(commands::run(&controller, &command("floor 0 11")).is_err());
}

#[test]
#[serial]
fn test_fans_command_reports_faults() {
    let (sim, controller) = setup();
    sim.set_fan_under_limit(2, true);
    let out = commands::run(&controller, &command("fans")).unwrap();
    assert!(out.contains("pwm0: duty 153 state  6/10 floor 2"), "{}", out);
    assert!(out.contains("fan3:  9000 rpm FAULT"), "{}", out);
    assert!(out.contains("fan1:  9000 rpm\n"), "{}", out);
}

#[test]
#[serial]
fn test_hottest_zone_trend() {
    let (sim, controller) = setup();
    sim.set_module_temperature(0, 2, 78_000);

    let ctx = controller.context();
    for zone in controller.zones() {
        zone.read_temperature(&ctx).unwrap();
    }
    let hot = controller.zone("module3").unwrap();
    assert_eq!(hot.trend(controller.arbiter()), Trend::Raising);
    assert_eq!(
        controller.chassis().trend(controller.arbiter()),
        Trend::Stable
    );
}

#[test]
#[serial]
fn test_settings_drive_controller() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");

    let mut settings = Settings::default();
    settings.poll_override_ms = Some(250);
    settings.chassis = ChassisProfile::bare();
    settings.chassis.slots[0].modules = vec![ModuleProfile::new(0, id::QSFP_DD, 44_000)];
    save_settings(&settings, Some(&path)).unwrap();

    let loaded = load_settings(Some(&path)).unwrap();
    let sim = Arc::new(SimulatedChassis::new(&loaded.chassis));
    let controller = ThermalController::new(sim, &loaded).unwrap();

    assert_eq!(controller.poll_interval_ms(), 250);
    let names: Vec<String> = controller.zones().iter().map(|z| z.name().to_string()).collect();
    assert_eq!(names, vec!["chassis", "module1"]);
    let module = controller.zone("module1").unwrap();
    assert_eq!(module.polling_delay_ms(), 250);
    assert_eq!(module.read_temperature(&controller.context()).unwrap(), 44_000);
}

#[test]
#[serial]
fn test_event_log_records_commands() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.json");
    logger::init_logging_at(&path);
    assert!(logger::is_enabled());

    let (_sim, controller) = setup();
    commands::run(&controller, &command("activate 1")).unwrap();
    logger::close_logging();

    let content = std::fs::read_to_string(&path).unwrap();
    let events: Vec<serde_json::Value> = content
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["event"], "slot_activated");
    assert_eq!(events[0]["data"]["slot"], 1);
}

#[test]
#[serial]
fn test_event_log_disabled_by_default() {
    logger::close_logging();
    assert!(!logger::is_enabled());
    logger::log_event("ignored", serde_json::json!({}));
}

#[test]
#[serial]
fn test_line_card_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    save_settings(&Settings::default(), Some(&path)).unwrap();

    let start = || {
        let settings = load_settings(Some(&path)).unwrap();
        let sim = Arc::new(SimulatedChassis::new(&settings.chassis));
        let controller = ThermalController::new(sim, &settings).unwrap();
        (settings, controller)
    };

    let (mut settings, controller) = start();
    let activate = command("activate 1");
    commands::run(&controller, &activate).unwrap();
    let written = commands::persist_slot_state(&mut settings, &path, &activate).unwrap();
    assert_eq!(written.as_deref(), Some(path.as_path()));

    let (mut settings, controller) = start();
    assert_eq!(controller.active_slots(), vec![0, 1]);
    let zones = commands::run(&controller, &command("zones")).unwrap();
    assert!(zones.contains("lc1-module1"), "{}", zones);

    let deactivate = command("deactivate 1");
    commands::run(&controller, &deactivate).unwrap();
    commands::persist_slot_state(&mut settings, &path, &deactivate).unwrap();

    let (mut settings, controller) = start();
    assert_eq!(controller.active_slots(), vec![0]);
    assert!(commands::persist_slot_state(&mut settings, &path, &command("zones")).unwrap().is_none());
    assert!(commands::persist_slot_state(&mut settings, &path, &command("activate 9")).is_err());
}
