//! Replay a captured byte stream through a processor

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use radsdk_core::DataInterface;
use radsdk_device::ContextConfig;
use radsdk_dummy::{DummyConfig, LoopbackInterface};

use super::session::Session;
use crate::cli::Protocol;

/// Size of the largest report of each protocol
fn max_report_len(protocol: Protocol) -> usize {
    match protocol {
        Protocol::D3 => radsdk_d3::protocol::MAX_REPORT_LEN,
        Protocol::Interval => radsdk_interval::protocol::REPORT_LEN,
    }
}

pub fn run(
    config: &ContextConfig,
    protocol: Protocol,
    input: &Path,
    chunk: usize,
    top: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = std::fs::read(input)?;
    println!("Replaying {} bytes from {}", data.len(), input.display());

    // The whole capture arrives at once, so buffer all of it
    let reports = data.len() / max_report_len(protocol) + 1;
    let mut config = config.clone();
    config.processor.message_buffer_reports = config.processor.message_buffer_reports.max(reports);
    config.processor.rolling_queue_entries = config.processor.rolling_queue_entries.max(reports);

    let identity = match protocol {
        Protocol::D3 => DummyConfig::d3(),
        Protocol::Interval => DummyConfig::interval(),
    };
    let link = Arc::new(LoopbackInterface::new(identity));
    let interface: Arc<dyn DataInterface> = link.clone();
    let mut session = Session::open(config, interface, protocol)?;

    session.begin(0)?;
    log::info!("Injecting in {}-byte chunks", chunk);
    link.inject_chunked(&data, chunk);
    session.drain(Duration::from_secs(30));
    session.end()?;
    session.wait(Duration::from_secs(10))?;

    println!();
    session.print_summary(top)?;
    session.shutdown()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn capture(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file
    }

    #[test]
    fn test_replay_interval_capture() {
        let mut bytes = Vec::new();
        for _ in 0..50 {
            bytes.extend(radsdk_interval::protocol::encode_counts(&[12, 12, 40]));
        }
        let file = capture(&bytes);
        run(&ContextConfig::default(), Protocol::Interval, file.path(), 17, 3).unwrap();
    }

    #[test]
    fn test_replay_d3_capture() {
        let mut channels = vec![0u16; radsdk_d3::protocol::SPECTRUM_CHANNELS];
        channels[100] = 4;
        let mut bytes = Vec::new();
        for sequence in 0..3 {
            bytes.extend(radsdk_d3::protocol::encode_spectrum(sequence, 100, 1, &channels));
        }
        let file = capture(&bytes);
        run(&ContextConfig::default(), Protocol::D3, file.path(), 512, 3).unwrap();
    }

    #[test]
    fn test_missing_capture() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("none.bin");
        assert!(run(&ContextConfig::default(), Protocol::D3, &missing, 64, 3).is_err());
    }
}
