#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;

use crate::InstrumentConfig;

pub const MANIFEST_FILE: &str = "labelflow.toml";

#[derive(Debug, Error, Diagnostic)]
#[error("manifest error: {message}")]
#[diagnostic(code(labelflow::manifest))]
pub struct ManifestError {
    pub message: String,
}

/// Settings from the nearest `labelflow.toml`, with paths made absolute.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedManifest {
    pub manifest_path: Option<PathBuf>,
    pub project_root: PathBuf,

    pub enabled: Option<bool>,
    pub runtime: Option<String>,
    pub traits: Option<String>,
    pub symbol: Option<String>,

    pub prelude: Option<PathBuf>,
}

impl ResolvedManifest {
    pub fn empty(project_root: PathBuf) -> Self {
        Self {
            project_root,
            ..Self::default()
        }
    }

    /// Defaults overlaid with whatever the manifest sets.
    pub fn instrument_config(&self) -> InstrumentConfig {
        let mut cfg = InstrumentConfig::default();
        if let Some(enabled) = self.enabled {
            cfg.enabled = enabled;
        }
        if let Some(runtime) = &self.runtime {
            cfg.names.annotations = runtime.clone();
        }
        if let Some(traits) = &self.traits {
            cfg.names.traits = traits.clone();
        }
        if let Some(symbol) = &self.symbol {
            cfg.names.symbol = symbol.clone();
        }
        cfg
    }
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
struct Manifest {
    #[serde(default)]
    instrument: Option<Instrument>,

    #[serde(default)]
    compile: Option<Compile>,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
struct Instrument {
    #[serde(default)]
    enabled: Option<bool>,

    /// Object receiving `declare`, `assert`, `as`, ...
    #[serde(default)]
    runtime: Option<String>,

    #[serde(default)]
    traits: Option<String>,

    #[serde(default)]
    symbol: Option<String>,
}

#[derive(Clone, Debug, Default, serde::Deserialize)]
struct Compile {
    #[serde(default)]
    prelude: Option<String>,
}

pub fn find_manifest(start: &Path) -> Option<PathBuf> {
    let mut cur = if start.is_file() {
        start.parent()?.to_path_buf()
    } else {
        start.to_path_buf()
    };

    loop {
        let candidate = cur.join(MANIFEST_FILE);
        if candidate.exists() {
            return Some(candidate);
        }
        match cur.parent() {
            Some(parent) => cur = parent.to_path_buf(),
            None => return None,
        }
    }
}

/// Finds and reads the manifest governing `start` (a source file or a directory).
pub fn load_resolved_manifest(start: &Path) -> Result<ResolvedManifest, ManifestError> {
    let project_root = if start.is_file() {
        start.parent().unwrap_or_else(|| Path::new(".")).to_path_buf()
    } else {
        start.to_path_buf()
    };

    let Some(manifest_path) = find_manifest(&project_root) else {
        return Ok(ResolvedManifest::empty(project_root));
    };
    let manifest_dir = manifest_path
        .parent()
        .ok_or_else(|| ManifestError {
            message: "manifest has no parent directory".to_string(),
        })?
        .to_path_buf();

    let raw = fs::read_to_string(&manifest_path).map_err(|e| ManifestError {
        message: format!("failed to read {}: {e}", manifest_path.display()),
    })?;
    let mut out = parse_manifest(&raw, &manifest_dir).map_err(|e| ManifestError {
        message: format!("{}: {}", manifest_path.display(), e.message),
    })?;
    out.manifest_path = Some(manifest_path);
    tracing::debug!(manifest = ?out.manifest_path, "loaded manifest");
    Ok(out)
}

/// Parses manifest text; relative paths resolve against `manifest_dir`.
pub fn parse_manifest(raw: &str, manifest_dir: &Path) -> Result<ResolvedManifest, ManifestError> {
    let parsed: Manifest = toml::from_str(raw).map_err(|e| ManifestError {
        message: format!("failed to parse: {e}"),
    })?;

    let mut out = ResolvedManifest::empty(manifest_dir.to_path_buf());
    if let Some(instrument) = parsed.instrument {
        out.enabled = instrument.enabled;
        out.runtime = non_empty(instrument.runtime, "instrument.runtime")?;
        out.traits = non_empty(instrument.traits, "instrument.traits")?;
        out.symbol = non_empty(instrument.symbol, "instrument.symbol")?;
    }
    if let Some(compile) = parsed.compile {
        out.prelude = compile.prelude.map(|p| resolve_path(manifest_dir, &p));
    }
    Ok(out)
}

fn non_empty(value: Option<String>, key: &str) -> Result<Option<String>, ManifestError> {
    match value {
        Some(v) if v.trim().is_empty() => Err(ManifestError {
            message: format!("`{key}` must not be empty"),
        }),
        other => Ok(other),
    }
}

fn resolve_path(base: &Path, p: &str) -> PathBuf {
    let pb = PathBuf::from(p);
    if pb.is_absolute() { pb } else { base.join(pb) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_manifest() {
        let raw = r#"
            [instrument]
            enabled = false
            runtime = "SA"
            traits = "Traits"
            symbol = "sym"

            [compile]
            prelude = "lib/prelude.js"
        "#;
        let m = parse_manifest(raw, Path::new("/proj")).unwrap();
        assert_eq!(m.prelude, Some(PathBuf::from("/proj/lib/prelude.js")));

        let cfg = m.instrument_config();
        assert!(!cfg.enabled);
        assert_eq!(cfg.names.annotations, "SA");
        assert_eq!(cfg.names.traits, "Traits");
        assert_eq!(cfg.names.symbol, "sym");
    }

    #[test]
    fn missing_sections_keep_defaults() {
        let m = parse_manifest("", Path::new("/proj")).unwrap();
        assert_eq!(m.instrument_config(), InstrumentConfig::default());
        assert_eq!(m.prelude, None);

        let m = parse_manifest("[instrument]\nruntime = \"SA\"\n", Path::new("/proj")).unwrap();
        let cfg = m.instrument_config();
        assert!(cfg.enabled);
        assert_eq!(cfg.names.annotations, "SA");
        assert_eq!(cfg.names.symbol, "S$");
    }

    #[test]
    fn malformed_manifest_is_an_error() {
        let err = parse_manifest("[instrument]\nenabled = \"yes\"\n", Path::new("/proj")).unwrap_err();
        assert!(err.to_string().starts_with("manifest error: failed to parse"), "{err}");

        let err = parse_manifest("[instrument]\nruntime = \"\"\n", Path::new("/proj")).unwrap_err();
        assert!(err.message.contains("instrument.runtime"), "{err}");
    }

    #[test]
    fn manifest_is_found_in_a_parent_directory() {
        let root = std::env::temp_dir().join(format!("labelflow-manifest-{}", std::process::id()));
        let nested = root.join("src").join("deep");
        fs::create_dir_all(&nested).unwrap();
        fs::write(root.join(MANIFEST_FILE), "[compile]\nprelude = \"prelude.js\"\n").unwrap();
        let file = nested.join("main.js");
        fs::write(&file, "var x;").unwrap();

        let m = load_resolved_manifest(&file).unwrap();
        assert_eq!(m.manifest_path, Some(root.join(MANIFEST_FILE)));
        assert_eq!(m.project_root, root);
        assert_eq!(m.prelude, Some(root.join("prelude.js")));

        fs::remove_dir_all(&root).unwrap();
    }
}
