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

//! ctctl - chassis-thermal command-line control

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use chassis_thermal::cli::Cli;
use chassis_thermal::{commands, logger};
use ct_core::{load_settings, resolve_settings_path, SimulatedChassis, ThermalController};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_env("CHASSIS_THERMAL_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    // Optional JSON event log
    if cli.logging {
        logger::init_logging();
        let args: Vec<String> = std::env::args().skip(1).collect();
        logger::log_event("startup", serde_json::json!({ "mode": "cli", "args": args }));
    }

    let path = resolve_settings_path(cli.config.as_deref());
    let mut settings = load_settings(Some(&path)).context("failed to load settings")?;
    let transport = Arc::new(SimulatedChassis::new(&settings.chassis));
    let controller = ThermalController::new(transport, &settings).context("failed to initialise thermal controller")?;

    tracing::debug!(command = ?cli.command, "running command");
    let result = commands::run(&controller, &cli.command)
        .and_then(|output| commands::persist_slot_state(&mut settings, &path, &cli.command).map(|_| output));
    match result {
        Ok(output) => {
            print!("{}", output);
            Ok(())
        }
        Err(e) => {
            logger::log_event("error", serde_json::json!({ "command": format!("{:?}", cli.command), "error": e.to_string() }));
            Err(e)
        }
    }
}
