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

//! ctctl argument parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "ctctl")]
#[command(version)]
#[command(about = "chassis-thermal control - module memory, thermal zones and fans")]
#[command(long_about = "chassis-thermal control - module memory, thermal zones and fans

Numeric arguments accept decimal or 0x-prefixed hexadecimal.

EXAMPLES:
    ctctl zones                        Zone temperatures, trips and trend
    ctctl eeprom 0 1 0x80 128          Dump page 0 upper half of module 2
    ctctl floor 0 14                   Raise the fan floor to state 4
    ctctl activate 1                   Bring line card 1 up and remember it

ENVIRONMENT VARIABLES:
    CHASSIS_THERMAL_LOG=debug          Log level on stderr
    CHASSIS_THERMAL_CONFIG=PATH        Settings file

FILES:
    ~/.config/chassis-thermal/settings.json   User settings
    /etc/chassis-thermal/settings.json        System settings")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings file (default: auto-detected)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Record commands in the JSON event log
    #[arg(long, global = true)]
    pub logging: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Hex dump of module memory
    Eeprom {
        #[arg(value_parser = number::<u8>)]
        slot: u8,
        #[arg(value_parser = number::<u8>)]
        module: u8,
        /// Logical offset into module memory
        #[arg(value_parser = number::<u32>)]
        offset: u32,
        /// Bytes to dump
        #[arg(value_parser = number::<usize>)]
        length: usize,
    },

    /// Module memory standard and size
    ModuleInfo {
        #[arg(value_parser = number::<u8>)]
        slot: u8,
        #[arg(value_parser = number::<u8>)]
        module: u8,
    },

    /// Zone temperatures, trips and trend
    Zones,

    /// Fan channel and tachometer status
    Fans,

    /// Set a cooling state; 12-20 sets the floor
    Floor {
        #[arg(value_parser = number::<u8>)]
        channel: u8,
        #[arg(value_parser = number::<u32>)]
        state: u32,
    },

    /// Bring a line card up and mark it active in the settings
    Activate {
        #[arg(value_parser = number::<u8>)]
        slot: u8,
    },

    /// Take a line card down and mark it inactive in the settings
    Deactivate {
        #[arg(value_parser = number::<u8>)]
        slot: u8,
    },
}

/// Parse decimal or `0x` hexadecimal
fn number<T: TryFrom<u64>>(value: &str) -> Result<T, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse::<u64>(),
    };
    parsed
        .ok()
        .and_then(|n| T::try_from(n).ok())
        .ok_or_else(|| format!("`{}` is not a number in range", value))
}
