// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Layered configuration: `base.toml` → `site.toml` → `run.json`.
//!
//! Later layers override earlier ones key by key. Typed sections such as
//! `[resampler]` or `[preprocess]` are pulled out with [`LayeredConfig::section`].

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const ENV_ROOT: &str = "RIL_CONFIG_ROOT";
const ENV_BASE: &str = "RIL_CONFIG_BASE";
const ENV_SITE: &str = "RIL_CONFIG_SITE";
const ENV_RUN: &str = "RIL_CONFIG_RUN";

/// Which file a merged value came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigLayer {
    Base,
    Site,
    Run,
}

/// A single key changed while a layer was applied.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfigDiffEvent {
    pub layer: ConfigLayer,
    /// Dotted key path, e.g. `resampler.output_len`.
    pub path: String,
    pub previous: Option<Value>,
    pub current: Option<Value>,
}

/// Paths of the layers to merge, in order. Missing files are skipped.
#[derive(Clone, Debug, Default)]
pub struct ConfigLayering {
    pub base: Option<PathBuf>,
    pub site: Option<PathBuf>,
    pub run: Option<PathBuf>,
}

impl ConfigLayering {
    /// Discovers layer files from `RIL_CONFIG_*` variables, falling back to
    /// `base.toml`, `site.toml` and `run.json` under the config root.
    pub fn discover() -> Self {
        let root = std::env::var(ENV_ROOT)
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_root());

        let layer = |var: &str, file: &str| {
            std::env::var(var)
                .map(PathBuf::from)
                .ok()
                .or_else(|| Some(root.join(file)))
                .and_then(existing_path)
        };

        ConfigLayering {
            base: layer(ENV_BASE, "base.toml"),
            site: layer(ENV_SITE, "site.toml"),
            run: layer(ENV_RUN, "run.json"),
        }
    }

    pub fn with_base<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.base = Some(path.into());
        self
    }

    pub fn with_site<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.site = Some(path.into());
        self
    }

    pub fn with_run<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.run = Some(path.into());
        self
    }
}

fn existing_path(path: PathBuf) -> Option<PathBuf> {
    if path.exists() {
        Some(path)
    } else {
        None
    }
}

fn default_root() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => {
            let config_dir = home.join(".ril").join("config");
            if config_dir.exists() {
                config_dir
            } else {
                home.join(".ril")
            }
        }
        None => PathBuf::from("."),
    }
}

/// Result of merging the configured layers.
#[derive(Clone, Debug)]
pub struct LayeredConfig {
    layering: ConfigLayering,
    value: Value,
    events: Vec<ConfigDiffEvent>,
}

impl LayeredConfig {
    /// Loads and merges base → site → run.
    pub fn load(layering: ConfigLayering) -> Result<Self, LayeredConfigError> {
        let mut value = Value::Object(Default::default());
        let mut events = Vec::new();

        let layers = [
            (layering.base.as_deref(), ConfigLayer::Base),
            (layering.site.as_deref(), ConfigLayer::Site),
            (layering.run.as_deref(), ConfigLayer::Run),
        ];
        for (path, kind) in layers {
            let Some(path) = path else { continue };
            let parsed = match kind {
                ConfigLayer::Run => load_json(path)?,
                ConfigLayer::Base | ConfigLayer::Site => load_toml(path)?,
            };
            if let Some(layer) = parsed {
                apply_layer(&mut value, &layer, kind, &mut events);
            }
        }

        for event in &events {
            debug!(
                layer = ?event.layer,
                path = %event.path,
                previous = ?event.previous,
                current = ?event.current,
                "config value applied"
            );
        }

        Ok(LayeredConfig {
            layering,
            value,
            events,
        })
    }

    /// An empty configuration; every section lookup yields `None`.
    pub fn empty() -> Self {
        LayeredConfig {
            layering: ConfigLayering::default(),
            value: Value::Object(Default::default()),
            events: Vec::new(),
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn layering(&self) -> &ConfigLayering {
        &self.layering
    }

    pub fn events(&self) -> &[ConfigDiffEvent] {
        &self.events
    }

    /// Deserialises the section found by walking `path`, or `None` if absent.
    pub fn section<T>(&self, path: &[&str]) -> Result<Option<T>, serde_json::Error>
    where
        T: DeserializeOwned,
    {
        let mut node = &self.value;
        for key in path {
            match node {
                Value::Object(map) => match map.get(*key) {
                    Some(value) => node = value,
                    None => return Ok(None),
                },
                _ => return Ok(None),
            }
        }
        serde_json::from_value(node.clone()).map(Some)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LayeredConfigError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse TOML {path:?}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to parse JSON {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid section {section}: {source}")]
    Section {
        section: String,
        #[source]
        source: serde_json::Error,
    },
}

fn read_text(path: &Path) -> Result<Option<String>, LayeredConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    fs::read_to_string(path)
        .map(Some)
        .map_err(|source| LayeredConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn load_toml(path: &Path) -> Result<Option<Value>, LayeredConfigError> {
    let Some(text) = read_text(path)? else {
        return Ok(None);
    };
    let value: toml::Value = toml::from_str(&text).map_err(|source| LayeredConfigError::Toml {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::to_value(value)
        .map(Some)
        .map_err(|source| LayeredConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
}

fn load_json(path: &Path) -> Result<Option<Value>, LayeredConfigError> {
    let Some(text) = read_text(path)? else {
        return Ok(None);
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| LayeredConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
}

fn apply_layer(
    dest: &mut Value,
    layer: &Value,
    kind: ConfigLayer,
    events: &mut Vec<ConfigDiffEvent>,
) {
    let before = dest.clone();
    merge(dest, layer);
    diff(&before, dest, &mut Vec::new(), kind, events);
}

fn merge(dest: &mut Value, src: &Value) {
    match (dest, src) {
        (Value::Object(dest_map), Value::Object(src_map)) => {
            for (key, value) in src_map {
                match dest_map.get_mut(key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        dest_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (dest_slot, src_value) => {
            *dest_slot = src_value.clone();
        }
    }
}

fn diff(
    before: &Value,
    after: &Value,
    path: &mut Vec<String>,
    layer: ConfigLayer,
    out: &mut Vec<ConfigDiffEvent>,
) {
    if before == after {
        return;
    }

    match (before, after) {
        (Value::Object(before_map), Value::Object(after_map)) => {
            let mut keys: Vec<&String> = before_map.keys().chain(after_map.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                path.push(key.clone());
                let before_child = before_map.get(key).unwrap_or(&Value::Null);
                let after_child = after_map.get(key).unwrap_or(&Value::Null);
                diff(before_child, after_child, path, layer, out);
                path.pop();
            }
        }
        _ => {
            let non_null = |v: &Value| (!v.is_null()).then(|| v.clone());
            out.push(ConfigDiffEvent {
                layer,
                path: path.join("."),
                previous: non_null(before),
                current: non_null(after),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_dir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        dir.push(format!("ril_layered_{nanos}"));
        dir
    }

    #[derive(Debug, serde::Deserialize, PartialEq)]
    struct Resampler {
        sets: usize,
        frames_per_set: usize,
        output_len: usize,
    }

    #[test]
    fn later_layers_override_earlier_ones() {
        let root = unique_temp_dir();
        fs::create_dir_all(&root).unwrap();

        let base = root.join("base.toml");
        fs::write(
            &base,
            r#"
            [resampler]
            sets = 10
            frames_per_set = 10
            output_len = 50
            "#,
        )
        .unwrap();

        let site = root.join("site.toml");
        fs::write(
            &site,
            r#"
            [resampler]
            output_len = 40
            "#,
        )
        .unwrap();

        let run = root.join("run.json");
        fs::write(&run, r#"{"resampler":{"sets":5}}"#).unwrap();

        let layering = ConfigLayering::default()
            .with_base(&base)
            .with_site(&site)
            .with_run(&run);
        let stacked = LayeredConfig::load(layering).unwrap();

        let resampler: Resampler = stacked.section(&["resampler"]).unwrap().unwrap();
        assert_eq!(
            resampler,
            Resampler {
                sets: 5,
                frames_per_set: 10,
                output_len: 40
            }
        );

        let events = stacked.events();
        assert!(events.iter().any(|event| {
            event.layer == ConfigLayer::Site
                && event.path == "resampler.output_len"
                && event.previous == Some(Value::from(50))
                && event.current == Some(Value::from(40))
        }));
        assert!(events.iter().any(|event| {
            event.layer == ConfigLayer::Run
                && event.path == "resampler.sets"
                && event.current == Some(Value::from(5))
        }));

        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn missing_sections_and_files_yield_none() {
        let layering = ConfigLayering::default().with_base(unique_temp_dir().join("absent.toml"));
        let stacked = LayeredConfig::load(layering).unwrap();
        assert!(stacked.events().is_empty());
        let section: Option<Resampler> = stacked.section(&["resampler"]).unwrap();
        assert!(section.is_none());
    }

    #[test]
    fn malformed_toml_reports_path() {
        let root = unique_temp_dir();
        fs::create_dir_all(&root).unwrap();
        let base = root.join("base.toml");
        fs::write(&base, "[resampler\nsets = ").unwrap();

        let err = LayeredConfig::load(ConfigLayering::default().with_base(&base)).unwrap_err();
        assert!(matches!(err, LayeredConfigError::Toml { ref path, .. } if path == &base));

        let _ = fs::remove_dir_all(root);
    }
}
