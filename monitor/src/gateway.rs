//! Gateway serial connection.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read};
use std::time::Duration;

use anyhow::Result;
use serialport::SerialPort;

/// Longest line kept; anything longer is boot noise
const MAX_LINE: usize = 256;

/// Find the first USB serial port (CDC-ACM or USB-UART bridge).
pub fn find_gateway_port() -> Result<String> {
    let ports = serialport::available_ports()?;
    ports
        .into_iter()
        .map(|info| info.port_name)
        .find(|name| name.contains("ttyACM") || name.contains("ttyUSB"))
        .ok_or_else(|| anyhow::anyhow!("No gateway port found - ensure the gateway is connected"))
}

/// Resolve a port argument - returns the port path if not "auto", otherwise auto-detects.
pub fn resolve_port(port_arg: &str) -> Result<String> {
    if port_arg == "auto" {
        find_gateway_port()
    } else {
        Ok(port_arg.to_string())
    }
}

/// Splits a byte stream into text lines.
#[derive(Default)]
pub struct LineAccumulator {
    buf: Vec<u8>,
}

impl LineAccumulator {
    /// Feed one byte; returns a completed, non-empty line.
    pub fn push(&mut self, byte: u8) -> Option<String> {
        match byte {
            b'\n' => {
                let line = String::from_utf8_lossy(&self.buf).trim().to_string();
                self.buf.clear();
                (!line.is_empty()).then_some(line)
            }
            _ if self.buf.len() >= MAX_LINE => {
                self.buf.clear();
                None
            }
            _ => {
                self.buf.push(byte);
                None
            }
        }
    }
}

/// Reads record lines from the gateway.
pub struct GatewayReader {
    port: Box<dyn SerialPort>,
    lines: LineAccumulator,
    ready: VecDeque<String>,
}

impl GatewayReader {
    pub fn new(port_name: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(500))
            .open()?;

        Ok(Self {
            port,
            lines: LineAccumulator::default(),
            ready: VecDeque::new(),
        })
    }

    /// Next complete line, or None if the port stayed quiet until the timeout.
    pub fn next_line(&mut self) -> Result<Option<String>> {
        let mut buf = [0u8; 64];
        while self.ready.is_empty() {
            match self.port.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(n) => self
                    .ready
                    .extend(buf[..n].iter().filter_map(|&byte| self.lines.push(byte))),
                Err(e) if e.kind() == ErrorKind::TimedOut => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(self.ready.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(acc: &mut LineAccumulator, bytes: &[u8]) -> Vec<String> {
        bytes.iter().filter_map(|&b| acc.push(b)).collect()
    }

    #[test]
    fn test_splits_lines() {
        let mut acc = LineAccumulator::default();
        let lines = feed(&mut acc, b"GW;1;1;240000000;30.\r\nGW;4;19;-45;1;101;30;25.\r\nGW;3");
        assert_eq!(lines, vec!["GW;1;1;240000000;30.", "GW;4;19;-45;1;101;30;25."]);
        assert_eq!(feed(&mut acc, b";19;Invalid CRC.\n"), vec!["GW;3;19;Invalid CRC."]);
    }

    #[test]
    fn test_skips_blank_lines() {
        let mut acc = LineAccumulator::default();
        assert!(feed(&mut acc, b"\r\n\n  \n").is_empty());
    }

    #[test]
    fn test_drops_overlong_line() {
        let mut acc = LineAccumulator::default();
        let mut noise = vec![b'x'; MAX_LINE + 10];
        noise.extend_from_slice(b"\nGW;1;1;240000000;30.\n");
        let lines = feed(&mut acc, &noise);
        assert_eq!(lines.last().map(String::as_str), Some("GW;1;1;240000000;30."));
        assert!(lines.iter().all(|line| line.len() <= MAX_LINE));
    }
}
