/*
 * This file is part of WireView.
 *
 * Copyright (C) 2025 WireView contributors
 *
 * WireView is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * WireView is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with WireView. If not, see <https://www.gnu.org/licenses/>.
 */

//! WireView command-line tool
//!
//! Thin front end over `wv-core`: argument parsing, output formatting, and
//! the command handlers. Device access lives entirely in the library crates.

pub mod cli;
pub mod commands;
pub mod logger;
pub mod output;
