// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Application launchers.
//!
//! Launchers start the real application after specialization has applied the
//! environment. Implementations:
//! - `ProcessLauncher`: spawns an executable and bridges its stdio
//! - `InProcessLauncher`: runs an [`Application`] on the tokio runtime

mod in_process;
mod process;
mod traits;

pub use in_process::{Application, ApplicationContext, InProcessLauncher, application_fn};
pub use process::{ProcessLauncher, ProcessLauncherConfig};
pub use traits::*;
