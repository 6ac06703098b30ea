//! List recognised spectrometer models

use radsdk_device::{KNOWN_MODELS, OLD_KROMEK_VENDOR_ID};

pub fn list_models() {
    println!("Recognised models:");
    println!();
    println!(
        "{:<10} {:>9} {:<9} {:<9} {:>10} {:>5}",
        "Name", "USB ID", "Protocol", "Detector", "Dead time", "LLD"
    );
    println!("{}", "-".repeat(58));

    for model in KNOWN_MODELS {
        for index in 0..model.detectors.len() {
            let Some(properties) = model.properties(index) else {
                continue;
            };
            println!(
                "{:<10} {:04x}:{:04x} {:<9} {:<9} {:>8.2}us {:>5}",
                if index == 0 { model.name } else { "" },
                model.vendor_id,
                model.product_id,
                model.protocol,
                properties.kind,
                properties.dead_time * 1e6,
                properties.default_lld
            );
        }
    }

    println!();
    println!(
        "Devices reporting the older vendor id {:04x} are matched too.",
        OLD_KROMEK_VENDOR_ID
    );
}
