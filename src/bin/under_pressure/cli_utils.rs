use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use under_pressure::audio::AudioEngine;

/// Comma-separated device names used instead of the host list, for tests.
const TEST_DEVICES_ENV: &str = "UNDER_PRESSURE_TEST_DEVICES";

pub(crate) fn parse_device_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

pub(crate) fn list_input_devices() -> Result<()> {
    let devices = if let Ok(raw) = std::env::var(TEST_DEVICES_ENV) {
        parse_device_list(&raw)
    } else {
        AudioEngine::list_devices().unwrap_or_else(|err| {
            eprintln!("Failed to list audio input devices: {err}");
            Vec::new()
        })
    };

    if devices.is_empty() {
        println!("No audio input devices detected.");
    } else {
        println!("Available audio input devices:");
        for name in devices {
            println!("  - {name}");
        }
    }
    Ok(())
}

pub(crate) fn write_wav(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).with_context(|| format!("failed to write '{}'", path.display()))
}
