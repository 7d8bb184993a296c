use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::fs;
use anyhow::{Context, Result, anyhow};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    pub remote: RemoteConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub topology: String, // Path or http(s) URL
    #[serde(default = "default_topology_object")]
    pub topology_object: String,
    pub state_names: String, // Path or http(s) URL
    pub data_dir: Option<PathBuf>, // Served under /data when set
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    pub base_id: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_view")]
    pub view: String,
    #[serde(default = "default_max_records")]
    pub max_records: u32,
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Follow the `offset` cursor past the first page.
    #[serde(default)]
    pub all_pages: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MapConfig {
    #[serde(default = "default_width")]
    pub width: f64,
    #[serde(default = "default_height")]
    pub height: f64,
    #[serde(default = "default_projection_scale")]
    pub projection_scale: f64,
    #[serde(default = "default_color_domain")]
    pub color_domain: [f64; 2],
    #[serde(default = "default_palette")]
    pub palette: Vec<String>, // Hex codes, lightest first
    #[serde(default = "default_unknown_color")]
    pub unknown_color: String,
    #[serde(default = "default_highlight_color")]
    pub highlight_color: String,
    #[serde(default = "default_scale_extent")]
    pub scale_extent: [f64; 2],
    #[serde(default = "default_max_focus_scale")]
    pub max_focus_scale: f64,
    #[serde(default = "default_focus_padding")]
    pub focus_padding: f64,
    #[serde(default = "default_transition_ms")]
    pub transition_ms: u64,
    #[serde(default = "default_highlight_ms")]
    pub highlight_ms: u64,
    #[serde(default = "default_places")]
    pub places: Vec<PlaceConfig>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PlaceConfig {
    pub name: String,
    pub lon: f64,
    pub lat: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            projection_scale: default_projection_scale(),
            color_domain: default_color_domain(),
            palette: default_palette(),
            unknown_color: default_unknown_color(),
            highlight_color: default_highlight_color(),
            scale_extent: default_scale_extent(),
            max_focus_scale: default_max_focus_scale(),
            focus_padding: default_focus_padding(),
            transition_ms: default_transition_ms(),
            highlight_ms: default_highlight_ms(),
            places: default_places(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: default_port() }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let map = &self.map;
        if map.width <= 0.0 || map.height <= 0.0 {
            return Err(anyhow!("map size must be positive, got {}x{}", map.width, map.height));
        }
        if map.palette.is_empty() {
            return Err(anyhow!("map.palette must contain at least one color"));
        }
        if !(map.color_domain[0] < map.color_domain[1]) {
            return Err(anyhow!("map.color_domain must be increasing: {:?}", map.color_domain));
        }
        let [min, max] = map.scale_extent;
        if !(min > 0.0 && min <= max) {
            return Err(anyhow!("map.scale_extent must satisfy 0 < min <= max: {:?}", map.scale_extent));
        }
        if !(map.max_focus_scale > 0.0) {
            return Err(anyhow!("map.max_focus_scale must be positive"));
        }
        if !(map.focus_padding > 0.0) {
            return Err(anyhow!("map.focus_padding must be positive, got {}", map.focus_padding));
        }
        Ok(())
    }

    /// Resolves the bearer credential, falling back to the configured env var.
    pub fn api_key(&self) -> Result<String> {
        if let Some(key) = &self.remote.api_key {
            return Ok(key.clone());
        }
        std::env::var(&self.remote.api_key_env).with_context(|| {
            format!(
                "No remote.api_key in config and environment variable {} is not set",
                self.remote.api_key_env
            )
        })
    }
}

fn default_topology_object() -> String { "states".to_string() }
fn default_endpoint() -> String { "https://api.airtable.com/v0".to_string() }
fn default_table() -> String { "Table 1".to_string() }
fn default_view() -> String { "Grid view".to_string() }
fn default_max_records() -> u32 { 100 }
fn default_api_key_env() -> String { "AIRTABLE_API_KEY".to_string() }
fn default_timeout_secs() -> u64 { 10 }
fn default_connect_timeout_secs() -> u64 { 3 }
fn default_width() -> f64 { 720.0 }
fn default_height() -> f64 { 450.0 }
fn default_projection_scale() -> f64 { 500.0 }
fn default_color_domain() -> [f64; 2] { [1.0, 500.0] }
fn default_unknown_color() -> String { "#000000".to_string() }
fn default_highlight_color() -> String { "lightblue".to_string() }
fn default_scale_extent() -> [f64; 2] { [0.2, 5.0] }
fn default_max_focus_scale() -> f64 { 8.0 }
fn default_focus_padding() -> f64 { 0.9 }
fn default_transition_ms() -> u64 { 750 }
fn default_highlight_ms() -> u64 { 250 }
fn default_port() -> u16 { 3000 }

// Sequential Reds, 9 classes
fn default_palette() -> Vec<String> {
    [
        "#fff5f0", "#fee0d2", "#fcbba1", "#fc9272", "#fb6a4a",
        "#ef3b2c", "#cb181d", "#a50f15", "#67000d",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_places() -> Vec<PlaceConfig> {
    vec![
        PlaceConfig { name: "Seattle".to_string(), lon: -122.3367534, lat: 47.5996582 },
        PlaceConfig { name: "Miami".to_string(), lon: -80.1942949, lat: 25.7645783 },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [input]
        topology = "data/us.json"
        state_names = "data/us-state-names.csv"

        [remote]
        base_id = "appExample"
    "#;

    #[test]
    fn minimal_config_fills_defaults() {
        let config = AppConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.input.topology_object, "states");
        assert_eq!(config.remote.max_records, 100);
        assert_eq!(config.remote.view, "Grid view");
        assert!(!config.remote.all_pages);
        assert_eq!(config.map.width, 720.0);
        assert_eq!(config.map.height, 450.0);
        assert_eq!(config.map.color_domain, [1.0, 500.0]);
        assert_eq!(config.map.palette.len(), 9);
        assert_eq!(config.map.scale_extent, [0.2, 5.0]);
        assert_eq!(config.map.max_focus_scale, 8.0);
        assert_eq!(config.map.places.len(), 2);
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn shipped_config_parses() {
        let config = AppConfig::from_toml(include_str!("../config.toml")).unwrap();
        assert_eq!(config.remote.table, "Table 1");
        assert_eq!(config.map.scale_extent, [0.2, 5.0]);
        assert_eq!(config.map.places[1].name, "Miami");
        assert_eq!(config.input.data_dir, Some(PathBuf::from("data")));
    }

    #[test]
    fn shipped_config_sources_resolve() {
        let config = AppConfig::from_toml(include_str!("../config.toml")).unwrap();
        let root = Path::new(env!("CARGO_MANIFEST_DIR"));
        for source in [&config.input.topology, &config.input.state_names] {
            if source.starts_with("http://") || source.starts_with("https://") {
                assert!(reqwest::Url::parse(source).is_ok(), "bad URL {}", source);
            } else {
                assert!(root.join(source).is_file(), "{} is missing", source);
            }
        }
        if let Some(dir) = &config.input.data_dir {
            assert!(root.join(dir).is_dir());
        }
    }

    #[test]
    fn rejects_non_positive_focus_padding() {
        for padding in ["0.0", "-0.5"] {
            let content = format!("{MINIMAL}\n[map]\nfocus_padding = {padding}\n");
            assert!(AppConfig::from_toml(&content).is_err(), "accepted {}", padding);
        }
    }

    #[test]
    fn rejects_empty_palette() {
        let content = format!("{MINIMAL}\n[map]\npalette = []\n");
        assert!(AppConfig::from_toml(&content).is_err());
    }

    #[test]
    fn rejects_inverted_scale_extent() {
        let content = format!("{MINIMAL}\n[map]\nscale_extent = [5.0, 0.2]\n");
        assert!(AppConfig::from_toml(&content).is_err());
    }

    #[test]
    fn explicit_api_key_wins() {
        let content = MINIMAL.replace("base_id = \"appExample\"", "base_id = \"appExample\"\napi_key = \"key123\"");
        let config = AppConfig::from_toml(&content).unwrap();
        assert_eq!(config.api_key().unwrap(), "key123");
    }

    #[test]
    fn missing_api_key_env_is_an_error() {
        let content = MINIMAL.replace(
            "base_id = \"appExample\"",
            "base_id = \"appExample\"\napi_key_env = \"JAIL_CHOROPLETH_TEST_UNSET_KEY\"",
        );
        let config = AppConfig::from_toml(&content).unwrap();
        assert!(config.api_key().is_err());
    }
}
