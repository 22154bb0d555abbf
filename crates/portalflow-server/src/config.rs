use portalflow_browser::LaunchOptions;
use portalflow_core::{ChallengePolicy, OrchestratorConfig, PortalUrls, Timeouts};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub orchestrator: OrchestratorConfig,
    pub node_binary: String,
    pub node_working_dir: Option<PathBuf>,
    pub intent: IntentConfig,
}

#[derive(Debug, Clone)]
pub struct IntentConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    server: ServerSection,
    #[serde(default)]
    sessions: SessionsSection,
    #[serde(default)]
    browser: BrowserSection,
    #[serde(default)]
    portals: PortalsSection,
    #[serde(default)]
    timeouts: TimeoutsSection,
    #[serde(default)]
    challenge: ChallengeSection,
    #[serde(default)]
    intent: IntentSection,
}

#[derive(Debug, Deserialize)]
struct ServerSection {
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SessionsSection {
    #[serde(default = "default_ttl_secs")]
    ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    sweep_interval_secs: u64,
}

impl Default for SessionsSection {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BrowserSection {
    #[serde(default = "default_headless")]
    headless: bool,
    #[serde(default)]
    slow_mo_ms: u64,
    #[serde(default = "default_launch_timeout_secs")]
    launch_timeout_secs: u64,
    #[serde(default = "default_node_binary")]
    node_binary: String,
    #[serde(default)]
    working_dir: Option<PathBuf>,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            slow_mo_ms: 0,
            launch_timeout_secs: default_launch_timeout_secs(),
            node_binary: default_node_binary(),
            working_dir: None,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct PortalsSection {
    vahan_url: Option<String>,
    passport_url: Option<String>,
    eid_url: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct TimeoutsSection {
    quick_secs: Option<u64>,
    standard_secs: Option<u64>,
    slow_secs: Option<u64>,
    navigation_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ChallengeSection {
    #[serde(default)]
    allow_trusted_injection: bool,
}

#[derive(Debug, Deserialize)]
struct IntentSection {
    #[serde(default)]
    gemini_api_key: Option<String>,
    #[serde(default = "default_gemini_model")]
    model: String,
    #[serde(default)]
    base_url: Option<String>,
}

impl Default for IntentSection {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            model: default_gemini_model(),
            base_url: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_ttl_secs() -> u64 {
    600
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_headless() -> bool {
    true
}

fn default_launch_timeout_secs() -> u64 {
    LaunchOptions::default().launch_timeout_secs
}

fn default_node_binary() -> String {
    "node".to_string()
}

fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

impl ServerConfig {
    pub fn load() -> anyhow::Result<Self> {
        let config = match load_from_file()? {
            Some(file_config) => Self::from_file(file_config),
            None => Self::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.orchestrator
            .validate()
            .map_err(|err| anyhow::anyhow!("{}", err))
    }

    fn from_file(file: FileConfig) -> Self {
        let defaults = Timeouts::default();
        let secs_or = |value: Option<u64>, fallback: Duration| {
            value.map(Duration::from_secs).unwrap_or(fallback)
        };
        let portal_defaults = PortalUrls::default();

        Self {
            host: file.server.host,
            port: file.server.port,
            orchestrator: OrchestratorConfig {
                session_ttl: Duration::from_secs(file.sessions.ttl_secs),
                sweep_interval: Duration::from_secs(file.sessions.sweep_interval_secs),
                timeouts: Timeouts {
                    quick: secs_or(file.timeouts.quick_secs, defaults.quick),
                    standard: secs_or(file.timeouts.standard_secs, defaults.standard),
                    slow: secs_or(file.timeouts.slow_secs, defaults.slow),
                    navigation: secs_or(file.timeouts.navigation_secs, defaults.navigation),
                },
                portals: PortalUrls {
                    vahan: file.portals.vahan_url.unwrap_or(portal_defaults.vahan),
                    passport: file.portals.passport_url.unwrap_or(portal_defaults.passport),
                    eid: file.portals.eid_url.unwrap_or(portal_defaults.eid),
                },
                challenge: ChallengePolicy {
                    allow_trusted_injection: file.challenge.allow_trusted_injection,
                },
                launch: LaunchOptions {
                    headless: file.browser.headless,
                    slow_mo_ms: file.browser.slow_mo_ms,
                    launch_timeout_secs: file.browser.launch_timeout_secs,
                    ..LaunchOptions::default()
                },
            },
            node_binary: file.browser.node_binary,
            node_working_dir: file.browser.working_dir,
            intent: IntentConfig {
                // Keys usually stay out of the file.
                api_key: file
                    .intent
                    .gemini_api_key
                    .or_else(|| env::var("GEMINI_API_KEY").ok())
                    .filter(|key| !key.trim().is_empty()),
                model: file.intent.model,
                base_url: file.intent.base_url,
            },
        }
    }

    fn from_env() -> Self {
        let defaults = OrchestratorConfig::default();
        let portal_defaults = defaults.portals.clone();

        Self {
            host: env::var("PORTALFLOW_HOST").unwrap_or_else(|_| default_host()),
            port: env_parse("PORTALFLOW_PORT").unwrap_or_else(default_port),
            orchestrator: OrchestratorConfig {
                session_ttl: env_parse("PORTALFLOW_SESSION_TTL_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.session_ttl),
                sweep_interval: env_parse("PORTALFLOW_SWEEP_INTERVAL_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.sweep_interval),
                timeouts: defaults.timeouts,
                portals: PortalUrls {
                    vahan: env::var("PORTALFLOW_VAHAN_URL").unwrap_or(portal_defaults.vahan),
                    passport: env::var("PORTALFLOW_PASSPORT_URL")
                        .unwrap_or(portal_defaults.passport),
                    eid: env::var("PORTALFLOW_EID_URL").unwrap_or(portal_defaults.eid),
                },
                challenge: ChallengePolicy {
                    allow_trusted_injection: env_parse("PORTALFLOW_TRUSTED_INJECTION")
                        .unwrap_or(false),
                },
                launch: LaunchOptions {
                    headless: env_parse("PORTALFLOW_HEADLESS").unwrap_or_else(default_headless),
                    ..LaunchOptions::default()
                },
            },
            node_binary: default_node_binary(),
            node_working_dir: None,
            intent: IntentConfig {
                api_key: env::var("GEMINI_API_KEY")
                    .ok()
                    .filter(|key| !key.trim().is_empty()),
                model: env::var("PORTALFLOW_GEMINI_MODEL")
                    .unwrap_or_else(|_| default_gemini_model()),
                base_url: None,
            },
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|value| value.trim().parse().ok())
}

fn load_from_file() -> anyhow::Result<Option<FileConfig>> {
    let config_path = env::var("PORTALFLOW_CONFIG").ok();
    let path = if let Some(path) = config_path {
        Some(PathBuf::from(path))
    } else if Path::new("portalflow.toml").exists() {
        Some(PathBuf::from("portalflow.toml"))
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(None);
    };
    read_file(&path).map(Some)
}

fn read_file(path: &Path) -> anyhow::Result<FileConfig> {
    let contents = fs::read_to_string(path)
        .map_err(|err| anyhow::anyhow!("Failed to read config {}: {}", path.display(), err))?;
    toml::from_str(&contents)
        .map_err(|err| anyhow::anyhow!("Failed to parse config {}: {}", path.display(), err))
}
