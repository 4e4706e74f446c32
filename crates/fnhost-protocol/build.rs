// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
use std::io::Result;

fn main() -> Result<()> {
    // Worker protocol (platform host <-> worker host <-> application)
    prost_build::compile_protos(&["proto/worker.proto"], &["proto/"])?;

    Ok(())
}
