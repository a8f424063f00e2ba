use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Reference links sent in reply to `LINK`, in display order.
pub const DEFAULT_LINKS: [&str; 7] = [
    "https://agenciavirtual.aguasdorio.com.br/#/login",
    "https://www.aguasdorio.com.br/",
    "https://www.aguasdorio.com.br/servicos/segunda-via",
    "https://www.aguasdorio.com.br/servicos/religacao",
    "https://www.aguasdorio.com.br/servicos/alteracao-de-titularidade",
    "https://www.aguasdorio.com.br/servicos/parcelamento",
    "https://www.aguasdorio.com.br/servicos/revisao-de-conta",
];

pub const DEFAULT_BANNER: &str = "🥳 Sejam bem vindos ao 🤖 VCGA-LeituraAE";

/// Number of snapshot slots the converter can fill (`base_vcga.csv` .. `base_vcga10.csv`).
const SNAPSHOT_SLOTS: usize = 10;

/// What the delivery client does with a 5xx answer from the bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServerErrorPolicy {
    /// Stop without re-sending; the next poll cycle picks the chat up again.
    Defer,
    /// Count the 5xx as one consumed attempt and re-send after the delay.
    Retry,
}

/// Typed configuration for the auto-responder.
#[derive(Clone, Debug)]
pub struct Config {
    // Bridge
    pub bridge_url: String,
    pub bridge_timeout: Duration,
    pub require_bridge_connected: bool,

    // Data
    pub data_dir: PathBuf,
    pub snapshot_files: Vec<PathBuf>,
    pub counters_file: PathBuf,

    // Poll loop
    pub poll_interval: Duration,
    pub poll_backoff: Duration,
    pub stop_join_timeout: Duration,

    // Delivery
    pub delivery_max_attempts: u32,
    pub delivery_retry_delay: Duration,
    pub delivery_server_error: ServerErrorPolicy,

    // Replies
    pub links: Vec<String>,
    pub banner: String,
    pub signature: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("dados_matriculas");
        Self {
            bridge_url: "http://localhost:3000".to_string(),
            bridge_timeout: Duration::from_secs(10),
            require_bridge_connected: true,
            snapshot_files: default_snapshot_files(&data_dir),
            data_dir,
            counters_file: PathBuf::from("contadores.json"),
            poll_interval: Duration::from_secs(1),
            poll_backoff: Duration::from_secs(5),
            stop_join_timeout: Duration::from_secs(5),
            delivery_max_attempts: 3,
            delivery_retry_delay: Duration::from_secs(5),
            delivery_server_error: ServerErrorPolicy::Defer,
            links: DEFAULT_LINKS.iter().map(|s| s.to_string()).collect(),
            banner: DEFAULT_BANNER.to_string(),
            signature: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let defaults = Self::default();

        let bridge_url = env_str("VCGA_BRIDGE_URL")
            .and_then(non_empty)
            .unwrap_or(defaults.bridge_url);
        let bridge_url = validate_base_url(&bridge_url)?;

        let data_dir = env_path("VCGA_DATA_DIR").unwrap_or(defaults.data_dir);
        // VCGA_SNAPSHOT_FILES overrides the numbered slots; relative entries live in the data dir.
        let snapshot_files = parse_csv_paths(env_str("VCGA_SNAPSHOT_FILES"))
            .map(|paths| {
                paths
                    .into_iter()
                    .map(|p| if p.is_absolute() { p } else { data_dir.join(p) })
                    .collect()
            })
            .unwrap_or_else(|| default_snapshot_files(&data_dir));

        let counters_file = env_path("VCGA_COUNTERS_FILE").unwrap_or(defaults.counters_file);
        if let Some(parent) = counters_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let delivery_server_error = match env_str("DELIVERY_SERVER_ERROR")
            .map(|s| s.trim().to_lowercase())
            .as_deref()
        {
            None | Some("") | Some("defer") => ServerErrorPolicy::Defer,
            Some("retry") => ServerErrorPolicy::Retry,
            Some(other) => {
                return Err(Error::Config(format!(
                    "DELIVERY_SERVER_ERROR must be `defer` or `retry`, got `{other}`"
                )))
            }
        };

        let links = parse_csv_list(env_str("VCGA_LINKS")).unwrap_or(defaults.links);

        Ok(Self {
            bridge_url,
            bridge_timeout: env_millis("BRIDGE_TIMEOUT_MS").unwrap_or(defaults.bridge_timeout),
            require_bridge_connected: env_bool("REQUIRE_BRIDGE_CONNECTED")
                .unwrap_or(defaults.require_bridge_connected),
            data_dir,
            snapshot_files,
            counters_file,
            poll_interval: env_millis("POLL_INTERVAL_MS").unwrap_or(defaults.poll_interval),
            poll_backoff: env_millis("POLL_BACKOFF_MS").unwrap_or(defaults.poll_backoff),
            stop_join_timeout: env_millis("STOP_JOIN_TIMEOUT_MS")
                .unwrap_or(defaults.stop_join_timeout),
            delivery_max_attempts: env_u32("DELIVERY_MAX_ATTEMPTS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.delivery_max_attempts),
            delivery_retry_delay: env_millis("DELIVERY_RETRY_DELAY_MS")
                .unwrap_or(defaults.delivery_retry_delay),
            delivery_server_error,
            links,
            banner: env_str("VCGA_BANNER")
                .and_then(non_empty)
                .unwrap_or(defaults.banner),
            signature: env_str("VCGA_SIGNATURE").and_then(non_empty),
        })
    }
}

/// `base_vcga.csv`, `base_vcga2.csv`, ... `base_vcga10.csv` under `data_dir`.
pub fn default_snapshot_files(data_dir: &Path) -> Vec<PathBuf> {
    (1..=SNAPSHOT_SLOTS)
        .map(|slot| {
            if slot == 1 {
                data_dir.join("base_vcga.csv")
            } else {
                data_dir.join(format!("base_vcga{slot}.csv"))
            }
        })
        .collect()
}

fn validate_base_url(raw: &str) -> Result<String> {
    let url = raw.trim().trim_end_matches('/');
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(Error::Config(format!(
            "VCGA_BRIDGE_URL must start with http:// or https://, got `{raw}`"
        )));
    }
    Ok(url.to_string())
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(txt) = fs::read_to_string(path) else {
        return;
    };

    for line in txt.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_millis(key: &str) -> Option<Duration> {
    env_u64(key).map(Duration::from_millis)
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn parse_csv_list(v: Option<String>) -> Option<Vec<String>> {
    let out = v?
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect::<Vec<_>>();
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn parse_csv_paths(v: Option<String>) -> Option<Vec<PathBuf>> {
    parse_csv_list(v).map(|items| items.into_iter().map(PathBuf::from).collect())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_snapshot_slots_follow_converter_naming() {
        let files = default_snapshot_files(Path::new("dados"));
        assert_eq!(files.len(), 10);
        assert_eq!(files[0], PathBuf::from("dados/base_vcga.csv"));
        assert_eq!(files[1], PathBuf::from("dados/base_vcga2.csv"));
        assert_eq!(files[9], PathBuf::from("dados/base_vcga10.csv"));
    }

    #[test]
    fn defaults_match_bot_constants() {
        let cfg = Config::default();
        assert_eq!(cfg.links.len(), 7);
        assert_eq!(cfg.delivery_max_attempts, 3);
        assert_eq!(cfg.delivery_retry_delay, Duration::from_secs(5));
        assert_eq!(cfg.poll_interval, Duration::from_secs(1));
        assert_eq!(cfg.poll_backoff, Duration::from_secs(5));
        assert_eq!(cfg.delivery_server_error, ServerErrorPolicy::Defer);
    }

    #[test]
    fn base_url_requires_scheme_and_drops_trailing_slash() {
        assert_eq!(
            validate_base_url("http://localhost:3000/").unwrap(),
            "http://localhost:3000"
        );
        assert!(matches!(
            validate_base_url("localhost:3000"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn csv_list_skips_blanks() {
        assert_eq!(
            parse_csv_list(Some(" a, ,b ".to_string())),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(parse_csv_list(Some(" , ".to_string())), None);
        assert_eq!(parse_csv_list(None), None);
    }
}
