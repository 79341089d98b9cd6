//! Transport configuration
//!
//! Transport selection and tunables are plain serde types so a flash
//! session can be described in a TOML file or assembled in code.

use serde::{Deserialize, Serialize};

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// SocketCAN with ISO-TP (Linux only)
    SocketCan(SocketCanConfig),
    /// In-memory mock with scripted replies
    Mock(MockConfig),
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::Mock(MockConfig::default())
    }
}

/// SocketCAN configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketCanConfig {
    /// CAN interface name (e.g., "can0")
    pub interface: String,
    /// ISO-TP tunables
    #[serde(default)]
    pub isotp: IsoTpSettings,
}

/// ISO-TP framing options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsoTpSettings {
    /// TX padding byte on outgoing CAN frames
    #[serde(default = "default_tx_padding")]
    pub tx_padding: u8,
    /// Separation time minimum in microseconds, ours and the peer's
    #[serde(default = "default_st_min_us")]
    pub st_min_us: u32,
    /// Block size for ISO-TP flow control (0 = no limit)
    #[serde(default)]
    pub block_size: u8,
}

impl Default for IsoTpSettings {
    fn default() -> Self {
        Self {
            tx_padding: default_tx_padding(),
            st_min_us: default_st_min_us(),
            block_size: 0,
        }
    }
}

fn default_tx_padding() -> u8 {
    0x55
}

fn default_st_min_us() -> u32 {
    2500
}

/// Mock transport configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockConfig {
    /// Simulated latency in milliseconds
    #[serde(default)]
    pub latency_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socketcan_config_parses_with_defaults() {
        let toml = r#"
type = "socketcan"
interface = "can0"
"#;
        let config: TransportConfig = toml::from_str(toml).unwrap();
        let TransportConfig::SocketCan(can) = config else {
            panic!("expected socketcan config");
        };
        assert_eq!(can.interface, "can0");
        assert_eq!(can.isotp.tx_padding, 0x55);
        assert_eq!(can.isotp.st_min_us, 2500);
        assert_eq!(can.isotp.block_size, 0);
    }

    #[test]
    fn mock_is_the_default() {
        assert!(matches!(
            TransportConfig::default(),
            TransportConfig::Mock(_)
        ));
    }
}
