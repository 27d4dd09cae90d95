use serde::Deserialize;

/// Server configuration: bind addresses, ports, and TLS/ICE material.
/// Loaded from a TOML file and overridable by CLI flags. Rarely changes
/// without a restart — contrast with [`crate::settings::ServerSettings`].
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// IP address to bind on (default "0.0.0.0").
    /// Set this to the public/VPN IP that clients connect to so that UDP
    /// replies are sent from the correct source address.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port for the WebSocket signalling endpoint (`/voice`).
    #[serde(default = "default_signaling_port")]
    pub signaling_port: u16,

    /// UDP port for the native voice protocol.
    #[serde(default = "default_voice_port")]
    pub voice_port: u16,

    /// Loopback bind address for the administrative CLI.
    #[serde(default = "default_admin_bind")]
    pub admin_bind: String,

    /// Path to TLS certificate file (PEM), for `wss://`.
    pub cert_path: Option<String>,

    /// Path to TLS private key file (PEM), for `wss://`.
    pub key_path: Option<String>,

    #[serde(default = "default_ice_port_min")]
    pub ice_port_min: u16,
    #[serde(default = "default_ice_port_max")]
    pub ice_port_max: u16,

    /// Path to the runtime settings JSON file.
    #[serde(default = "default_settings_path")]
    pub settings_path: String,

    /// Path to the JSON file backing the credential store.
    #[serde(default = "default_credential_store_path")]
    pub credential_store_path: String,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_signaling_port() -> u16 {
    9987
}
fn default_voice_port() -> u16 {
    9988
}
fn default_admin_bind() -> String {
    "127.0.0.1:9989".into()
}
fn default_ice_port_min() -> u16 {
    50000
}
fn default_ice_port_max() -> u16 {
    50100
}
fn default_settings_path() -> String {
    "server_settings.json".into()
}
fn default_credential_store_path() -> String {
    "credentials.json".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            signaling_port: default_signaling_port(),
            voice_port: default_voice_port(),
            admin_bind: default_admin_bind(),
            cert_path: None,
            key_path: None,
            ice_port_min: default_ice_port_min(),
            ice_port_max: default_ice_port_max(),
            settings_path: default_settings_path(),
            credential_store_path: default_credential_store_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = ServerConfig::default();
        assert_eq!(config.signaling_port, 9987);
        assert_eq!(config.voice_port, 9988);
        assert_eq!(config.admin_bind, "127.0.0.1:9989");
    }

    #[test]
    fn config_toml_deserialization_fills_in_defaults() {
        let toml = r#"
            signaling_port = 1234
            voice_port = 5678
        "#;
        let config: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.signaling_port, 1234);
        assert_eq!(config.voice_port, 5678);
        assert_eq!(config.ice_port_min, 50000);
    }

    #[test]
    fn config_toml_overrides_every_field() {
        let toml = r#"
            host = "127.0.0.1"
            signaling_port = 1
            voice_port = 2
            admin_bind = "127.0.0.1:1"
            cert_path = "certs/server.crt"
            key_path = "certs/server.key"
            ice_port_min = 40000
            ice_port_max = 40010
            settings_path = "settings.json"
            credential_store_path = "creds.json"
        "#;
        let config: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.cert_path.as_deref(), Some("certs/server.crt"));
        assert_eq!(config.ice_port_max, 40010);
    }
}
