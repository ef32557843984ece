use std::time::Duration;

use mecalink_frame::AssemblerConfig;

/// Host-side link supervision settings.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Period of heartbeat emission while connected.
    pub heartbeat_interval: Duration,
    /// Consecutive unanswered heartbeats tolerated before the link is
    /// declared dead.
    pub heartbeat_miss_limit: u32,
    /// Period between reconnect attempts after an unrequested disconnect.
    pub reconnect_interval: Duration,
    /// Upper bound for one connect attempt (enforced by the runtime).
    pub connect_timeout: Duration,
    /// Reply to received heartbeats with a heartbeat of our own.
    ///
    /// The motion controller always echoes, so the host treats incoming
    /// heartbeats as replies and leaves this off. Two echoing endpoints
    /// would bounce a heartbeat back and forth forever.
    pub echo_heartbeats: bool,
    /// Reassembly buffer settings for inbound bytes.
    pub assembler: AssemblerConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(2),
            heartbeat_miss_limit: 3,
            reconnect_interval: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(3),
            echo_heartbeats: false,
            assembler: AssemblerConfig::default(),
        }
    }
}

/// Motion-controller endpoint settings.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Reassembly buffer settings. Sized for a microcontroller by default.
    pub assembler: AssemblerConfig,
    /// Send one heartbeat as soon as a controller connects.
    pub greet_on_connect: bool,
    /// Reply to Control commands with the resulting accessory state.
    pub echo_control: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            assembler: AssemblerConfig { capacity: 128 },
            greet_on_connect: true,
            echo_control: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_defaults_match_protocol_timing() {
        let config = LinkConfig::default();
        assert_eq!(config.heartbeat_interval, Duration::from_secs(2));
        assert_eq!(config.heartbeat_miss_limit, 3);
        assert_eq!(config.reconnect_interval, Duration::from_secs(3));
        assert!(!config.echo_heartbeats);
    }

    #[test]
    fn device_defaults() {
        let config = DeviceConfig::default();
        assert_eq!(config.assembler.capacity, 128);
        assert!(config.greet_on_connect);
        assert!(config.echo_control);
    }
}
