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

//! chassis-thermal - operator tooling for switch chassis thermal control
//!
//! The `ctctl` CLI: argument parsing, command rendering and the opt-in
//! JSON event log. The thermal model itself lives in `ct-core`.

pub mod cli;
pub mod commands;
pub mod logger;
