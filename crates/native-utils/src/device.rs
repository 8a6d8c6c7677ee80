use anyhow::Context;
use cpal::Device;
use cpal::traits::{DeviceTrait, HostTrait};

fn get_host() -> cpal::Host {
    cpal::default_host()
}

/// The input device called `device_name`, or the host's default input.
pub fn get_or_default_input(device_name: Option<&str>) -> anyhow::Result<Device> {
    let host = get_host();
    tracing::debug!("Host: {:?}", host.id());
    match device_name {
        None => host
            .default_input_device()
            .context("No default input device"),
        Some(target) => host
            .input_devices()?
            .find(|d| d.name().is_ok_and(|name| name == target))
            .with_context(|| format!("No input device named '{target}'")),
    }
}

/// The output device called `device_name`, or the host's default output.
pub fn get_or_default_output(device_name: Option<&str>) -> anyhow::Result<Device> {
    let host = get_host();
    match device_name {
        None => host
            .default_output_device()
            .context("No default output device"),
        Some(target) => host
            .output_devices()?
            .find(|d| d.name().is_ok_and(|name| name == target))
            .with_context(|| format!("No output device named '{target}'")),
    }
}

fn describe(name: &str, channels: u16, rate: u32, default: Option<&str>) -> String {
    let mut d = format!(" * {}({}ch, {}hz)", name, channels, rate);
    if default == Some(name) {
        d.push_str(" [default]");
    }
    d
}

/// One line per input device with its default config.
pub fn get_available_inputs() -> anyhow::Result<String> {
    let host = get_host();
    let default = host.default_input_device().and_then(|d| d.name().ok());
    let mut lines = Vec::new();
    for device in host.input_devices()? {
        let name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
        match device.default_input_config() {
            Ok(cfg) => lines.push(describe(
                &name,
                cfg.channels(),
                cfg.sample_rate().0,
                default.as_deref(),
            )),
            Err(e) => tracing::debug!("Skipping input {}: {}", name, e),
        }
    }
    Ok(lines.join("\n"))
}

pub fn get_available_outputs() -> anyhow::Result<String> {
    let host = get_host();
    let default = host.default_output_device().and_then(|d| d.name().ok());
    let mut lines = Vec::new();
    for device in host.output_devices()? {
        let name = device.name().unwrap_or_else(|_| "<unnamed>".to_string());
        match device.default_output_config() {
            Ok(cfg) => lines.push(describe(
                &name,
                cfg.channels(),
                cfg.sample_rate().0,
                default.as_deref(),
            )),
            Err(e) => tracing::debug!("Skipping output {}: {}", name, e),
        }
    }
    Ok(lines.join("\n"))
}
