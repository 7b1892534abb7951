// Copyright (c) 2026 ctfconv Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! Logger setup for the command line tool.
//!
//! The library only speaks through the `log` facade; the binary installs a
//! `flexi_logger` backend writing to stderr.

use flexi_logger::{FlexiLoggerError, Logger, LoggerHandle};

/// Log level spec for a given number of `-v` flags.
pub fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Start logging to stderr. `RUST_LOG` takes precedence over `verbosity`.
///
/// Keep the returned handle alive for as long as logging is needed.
pub fn init(verbosity: u8) -> Result<LoggerHandle, FlexiLoggerError> {
    Logger::try_with_env_or_str(level_for(verbosity))?
        .log_to_stderr()
        .format(flexi_logger::default_format)
        .start()
}
