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

//! Opt-in JSON-lines event log
//!
//! One JSON object per line: `{"ts_ms", "event", "data"}`. Writes never fail
//! the caller; an unwritable log path falls back to `/tmp`.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use lazy_static::lazy_static;
use serde_json::{json, Value};

pub const DEFAULT_LOG_PATH: &str = "/var/log/chassis-thermal/events.json";
const FALLBACK_LOG_PATH: &str = "/tmp/chassis_thermal_events.json";

lazy_static! {
    static ref LOG_FILE: Mutex<Option<File>> = Mutex::new(None);
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

fn open_append(path: &Path) -> Option<File> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    OpenOptions::new().create(true).append(true).open(path).ok()
}

pub fn init_logging() {
    init_logging_at(Path::new(DEFAULT_LOG_PATH));
}

/// Route events to `path`, or to the fallback file if it cannot be opened
pub fn init_logging_at(path: &Path) {
    let file = open_append(path).or_else(|| open_append(Path::new(FALLBACK_LOG_PATH)));
    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = file;
    }
}

/// Stop writing to the current log file
pub fn close_logging() {
    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = None;
    }
}

pub fn is_enabled() -> bool {
    LOG_FILE.lock().map(|g| g.is_some()).unwrap_or(false)
}

/// Append an event; a no-op until logging is initialised
pub fn log_event(event: &str, data: Value) {
    let line = json!({
        "ts_ms": now_millis(),
        "event": event,
        "data": data,
    })
    .to_string();

    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(f) = guard.as_mut() {
            let _ = writeln!(f, "{}", line);
        }
    }
}
