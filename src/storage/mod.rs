// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Record store backends.
//!
//! - [`memory::InMemoryStore`]: ordered map keyed by `(region, timestamp, id)`
//! - [`sql::SqlStore`]: SQLite or MySQL through the sqlx `Any` driver

pub mod traits;
pub mod memory;
pub mod sql;
