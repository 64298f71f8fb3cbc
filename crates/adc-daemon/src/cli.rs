//! One-shot control commands run from the command line

use adc_core::{dispatch, Command, DeviceRegistry, Payload, RegHex};
use anyhow::Result;
use tracing::info;

/// Dispatch a command and print any register values as JSON on stdout
pub fn run(registry: &DeviceRegistry, command: &Command) -> Result<()> {
    let payload = dispatch(registry, command)?;
    match render(&payload)? {
        Some(text) => println!("{text}"),
        None => info!(verb = %command.verb(), "Command completed"),
    }
    Ok(())
}

fn render(payload: &Payload) -> Result<Option<String>> {
    let text = match payload {
        Payload::Empty => return Ok(None),
        Payload::Register(op) => serde_json::to_string_pretty(&RegHex::from(op))?,
        Payload::Registers(_) => serde_json::to_string_pretty(&payload.to_hex())?,
    };
    Ok(Some(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use adc_core::{MemoryDevice, RegOp, Target};
    use std::sync::Arc;

    #[test]
    fn test_render_payloads() {
        assert_eq!(render(&Payload::Empty).unwrap(), None);

        let one = render(&Payload::Register(RegOp::write(1, 2))).unwrap().unwrap();
        let parsed: RegHex = serde_json::from_str(&one).unwrap();
        assert_eq!(parsed, RegHex::new("0x0001", "0x0002"));

        let many = render(&Payload::Registers(vec![RegOp::read(3), RegOp::read(0)]))
            .unwrap()
            .unwrap();
        let parsed: Vec<RegHex> = serde_json::from_str(&many).unwrap();
        assert_eq!(parsed[0].addr, "0x0003");
        assert_eq!(parsed[1].addr, "0x0000");
    }

    #[test]
    fn test_run_reports_unknown_device() {
        let mut registry = DeviceRegistry::new();
        registry.insert(Arc::new(MemoryDevice::new("adc0"))).unwrap();
        let command = Command::StreamStart {
            target: Target::Device("adc1".to_string()),
        };
        let err = run(&registry, &command).unwrap_err();
        assert!(err.to_string().contains("adc1"));
    }
}
