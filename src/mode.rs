use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which peer of the reverse proxy is supervised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// The client peer (frpc)
    #[default]
    #[serde(alias = "frpc")]
    Client,
    /// The server peer (frps)
    #[serde(alias = "frps")]
    Server,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::Client, Mode::Server];

    /// Name used for the extracted binary and as the config file stem
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Client => "client",
            Mode::Server => "server",
        }
    }

    /// Upper-case form used in status lines ("CLIENT started successfully")
    pub fn upper(&self) -> &'static str {
        match self {
            Mode::Client => "CLIENT",
            Mode::Server => "SERVER",
        }
    }

    /// File name of the configuration for this mode
    pub fn config_file_name(&self) -> String {
        format!("{}.toml", self.as_str())
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "client" | "frpc" => Ok(Mode::Client),
            "server" | "frps" => Ok(Mode::Server),
            other => anyhow::bail!("Unknown mode '{}' (expected 'client' or 'server')", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_names() {
        assert_eq!(Mode::Client.to_string(), "client");
        assert_eq!(Mode::Server.to_string(), "server");
        assert_eq!(Mode::Client.upper(), "CLIENT");
        assert_eq!(Mode::Server.config_file_name(), "server.toml");
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("client".parse::<Mode>().unwrap(), Mode::Client);
        assert_eq!("SERVER".parse::<Mode>().unwrap(), Mode::Server);
        // Legacy preference values
        assert_eq!("frpc".parse::<Mode>().unwrap(), Mode::Client);
        assert_eq!("frps".parse::<Mode>().unwrap(), Mode::Server);
        assert!("proxy".parse::<Mode>().is_err());
    }

    #[test]
    fn test_mode_serde() {
        #[derive(Deserialize, Serialize)]
        struct Wrapper {
            mode: Mode,
        }

        let parsed: Wrapper = toml::from_str(r#"mode = "server""#).unwrap();
        assert_eq!(parsed.mode, Mode::Server);

        // Legacy values are read but never written
        let parsed: Wrapper = toml::from_str(r#"mode = "frpc""#).unwrap();
        assert_eq!(parsed.mode, Mode::Client);
        let parsed: Wrapper = toml::from_str(r#"mode = "frps""#).unwrap();
        assert_eq!(parsed.mode, Mode::Server);

        let rendered = toml::to_string(&Wrapper { mode: Mode::Client }).unwrap();
        assert!(rendered.contains(r#"mode = "client""#));
    }

    #[test]
    fn test_default_mode_is_client() {
        assert_eq!(Mode::default(), Mode::Client);
    }
}
