// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `hpt validate` command - Validate configuration file.

use hpt_core::shm::RingLayout;
use hpt_core::ConfigLoader;

pub fn execute(file: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(file = %file, "Validating configuration");

    match ConfigLoader::load_file(file) {
        Ok(config) => {
            let device = &config.device;
            println!("✓ Configuration is valid");
            println!();
            println!("Device Settings:");
            println!("  Max Ring Capacity:  {} slots", device.max_items);
            println!("  Block Budget:       {} blocks", device.max_blocks);
            println!("  Poll Interval:      {:?}", device.poll_interval);
            println!("  MTU:                {} bytes", device.mtu);
            println!();
            println!("Endpoints ({}):", config.endpoints.len());

            let mut blocks = 0;
            for endpoint in &config.endpoints {
                let layout = RingLayout::new(endpoint.capacity);
                blocks += layout.block_count();
                println!(
                    "  - {} (capacity: {}, region: {} bytes, blocks: {})",
                    endpoint.name,
                    endpoint.capacity,
                    layout.region_size(),
                    layout.block_count()
                );
            }

            if blocks > device.max_blocks {
                println!();
                println!(
                    "! Endpoints need {} blocks but the budget is {}; later ones will fail to start",
                    blocks, device.max_blocks
                );
            }

            println!();
            print!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
