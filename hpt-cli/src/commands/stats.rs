// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `hpt stats` command - Bring up the configured endpoints and dump their
//! counters.

use hpt_core::{Device, Hpt, LoopbackMode, LoopbackStack};

use super::load_config;

pub fn execute(config_path: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;

    if config.endpoints.is_empty() {
        println!("No endpoints configured.");
        println!();
        println!("Add some to a configuration file:");
        println!("  endpoints:");
        println!("    - name: hpt0");
        println!("      capacity: 1024");
        return Ok(());
    }

    let stack = LoopbackStack::new_shared(LoopbackMode::Record);
    let device = Device::new(config.device.clone(), stack);

    let mut clients = Vec::with_capacity(config.endpoints.len());
    for endpoint in &config.endpoints {
        match Hpt::alloc(&device, endpoint.name.as_str(), endpoint.capacity.get()) {
            Ok(client) => clients.push(client),
            Err(e) => tracing::warn!(endpoint = %endpoint.name, error = %e, "Failed to bring up endpoint"),
        }
    }

    println!("{}", serde_json::to_string_pretty(&device.stats())?);

    drop(clients);
    Ok(())
}
