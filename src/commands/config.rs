//! Print the effective configuration

use radsdk_device::ContextConfig;

pub fn show(config: &ContextConfig) -> Result<(), Box<dyn std::error::Error>> {
    print!("{}", config.to_toml_string()?);
    Ok(())
}
