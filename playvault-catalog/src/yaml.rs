//! YAML loading for human-curated identity aliases.
//!
//! Aliases live in an `aliases/` directory; each `.yaml` file holds a list
//! of `{ alias, canonical, reason? }` entries. Titles are normalized on load
//! so authors can write them the way the storefront displays them.

use std::path::Path;

use playvault_core::normalize_title;
use thiserror::Error;

use crate::types::TitleAlias;

#[derive(Debug, Error)]
pub enum YamlError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("YAML parse error in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yml::Error,
    },
    #[error("Not a directory: {0}")]
    DirNotFound(String),
}

/// Load all alias definitions from YAML files in a directory.
///
/// A missing directory yields an empty list. Files are read in name order so
/// that later files can be reasoned about deterministically. Entries whose
/// alias and canonical normalize to the same title are dropped.
pub fn load_aliases(dir: &Path) -> Result<Vec<TitleAlias>, YamlError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    if !dir.is_dir() {
        return Err(YamlError::DirNotFound(dir.display().to_string()));
    }

    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| YamlError::Io {
            path: dir.display().to_string(),
            source: e,
        })?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .is_some_and(|ext| ext == "yaml" || ext == "yml")
        })
        .collect();
    entries.sort_by_key(|e| e.file_name());

    let mut all = Vec::new();
    for entry in entries {
        let path = entry.path();
        let contents = std::fs::read_to_string(&path).map_err(|e| YamlError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let aliases: Vec<TitleAlias> =
            serde_yml::from_str(&contents).map_err(|e| YamlError::Parse {
                path: path.display().to_string(),
                source: e,
            })?;
        all.extend(aliases.into_iter().filter_map(normalize_alias));
    }

    Ok(all)
}

fn normalize_alias(alias: TitleAlias) -> Option<TitleAlias> {
    let a = normalize_title(&alias.alias);
    let c = normalize_title(&alias.canonical);
    if a.is_empty() || c.is_empty() || a == c {
        return None;
    }
    Some(TitleAlias {
        alias: a,
        canonical: c,
        reason: alias.reason,
    })
}
