use anyhow::Error;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub http_addr: String,
    pub log_level: Option<String>,
    pub log_file: Option<String>,
    pub database_url: String,
    /// Base URL the call-control provider reaches this service at. Every
    /// callback URL embedded in an instruction document is built from it.
    pub public_url: String,
    pub skip_access_log_paths: Vec<String>,
    pub voice: VoiceConfig,
    pub notifier: NotifierConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum Prompt {
    Say { text: String },
    Play { url: String },
}

impl Prompt {
    pub fn say(text: impl Into<String>) -> Self {
        Prompt::Say { text: text.into() }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VoiceConfig {
    pub language: Option<String>,
    pub voice: Option<String>,
    pub gather_timeout: u32,
    pub dial_timeout: u32,
    pub caller_id: Option<String>,
    pub greeting: Prompt,
    pub no_launch: Prompt,
    pub menu: Prompt,
    pub connecting: Prompt,
    pub exhausted: Prompt,
    pub forward_failed: Prompt,
    pub fallback: Prompt,
}

#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum NotifierKind {
    Log,
    Http {
        url: String,
        headers: Option<HashMap<String, String>>,
    },
    Local {
        root: String,
    },
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotifierConfig {
    #[serde(flatten)]
    pub kind: NotifierKind,
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
}

fn default_subject_prefix() -> String {
    "Information line".to_string()
}

impl Default for NotifierKind {
    fn default() -> Self {
        Self::Log
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            kind: NotifierKind::default(),
            subject_prefix: default_subject_prefix(),
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            language: Some("en-GB".to_string()),
            voice: Some("alice".to_string()),
            gather_timeout: 30,
            dial_timeout: 20,
            caller_id: None,
            greeting: Prompt::say("This is the launch information phone number."),
            no_launch: Prompt::say("There are no launches in the next three days."),
            menu: Prompt::say(
                "Press 2 to be connected to a human; otherwise please either hang up \
                 or press 1 to end the call.",
            ),
            connecting: Prompt::say("Connecting you now."),
            exhausted: Prompt::say(
                "Sorry, nobody is available to take your call. Please try the \
                 alternative phone number on the notice.",
            ),
            forward_failed: Prompt::say(
                "Call failed. Please try the alternative phone number on the notice.",
            ),
            fallback: Prompt::say("Sorry, something went wrong. Please call back later."),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8080".to_string(),
            log_level: Some("info".to_string()),
            log_file: None,
            database_url: "sqlite://infoline.sqlite3".to_string(),
            public_url: "http://localhost:8080".to_string(),
            skip_access_log_paths: vec!["/heartbeat".to_string()],
            voice: VoiceConfig::default(),
            notifier: NotifierConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self, Error> {
        let config = toml::from_str(
            &std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("{}: {}", e, path))?,
        )?;
        Ok(config)
    }

    /// Start-up checks that serde cannot express.
    pub fn validate(&self) -> Result<(), Error> {
        self.http_addr
            .parse::<std::net::SocketAddr>()
            .map_err(|e| anyhow::anyhow!("http_addr {:?}: {}", self.http_addr, e))?;
        if !(self.public_url.starts_with("http://") || self.public_url.starts_with("https://")) {
            return Err(anyhow::anyhow!(
                "public_url {:?} must be an absolute http(s) URL",
                self.public_url
            ));
        }
        if let NotifierKind::Http { url, .. } = &self.notifier.kind {
            if url.is_empty() {
                return Err(anyhow::anyhow!("notifier url is empty"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.http_addr, "0.0.0.0:8080");
        assert_eq!(config.voice.gather_timeout, 30);
        assert!(matches!(config.notifier.kind, NotifierKind::Log));
        assert_eq!(config.notifier.subject_prefix, "Information line");
    }

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(
            r#"
            http_addr = "127.0.0.1:9000"
            database_url = "sqlite::memory:"
            public_url = "https://example.org/line"

            [voice]
            dial_timeout = 15
            greeting = { type = "play", url = "https://example.org/hello.mp3" }

            [notifier]
            type = "http"
            url = "https://hooks.example.org/calls"
            subject_prefix = "Launch line"
            "#,
        )
        .unwrap();
        assert_eq!(config.public_url, "https://example.org/line");
        assert_eq!(config.voice.dial_timeout, 15);
        assert_eq!(config.voice.gather_timeout, 30);
        assert_eq!(
            config.voice.greeting,
            Prompt::Play {
                url: "https://example.org/hello.mp3".to_string()
            }
        );
        match config.notifier.kind {
            NotifierKind::Http { url, headers } => {
                assert_eq!(url, "https://hooks.example.org/calls");
                assert!(headers.is_none());
            }
            other => panic!("unexpected notifier {:?}", other),
        }
        assert_eq!(config.notifier.subject_prefix, "Launch line");
    }

    #[test]
    fn test_validate() {
        assert!(Config::default().validate().is_ok());

        let config = Config {
            public_url: "line.example.org".to_string(),
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("public_url"));

        let config = Config {
            http_addr: "nowhere".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_reports_missing_path() {
        let err = Config::load("/nonexistent/infoline.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/infoline.toml"));
    }
}
