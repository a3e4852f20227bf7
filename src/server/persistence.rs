use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::common::data::RecordedInteraction;
use crate::server::server::Error;

/// A `.json` corpus file holds either one interaction or an array of them.
#[derive(Deserialize)]
#[serde(untagged)]
enum JsonCorpusFile {
    Many(Vec<RecordedInteraction>),
    One(Box<RecordedInteraction>),
}

/// Reads every corpus file under `dir` into recorded interactions.
///
/// Files are visited in lexicographic filename order so the corpus (and
/// with it the per-identity response order) is reproducible across runs.
/// YAML files may hold several `---`-separated documents; unknown
/// extensions are skipped.
pub fn load_trips_dir(dir: &Path) -> Result<Vec<RecordedInteraction>, Error> {
    let entries = fs::read_dir(dir)
        .map_err(|e| Error::Load(format!("cannot read corpus directory {}: {}", dir.display(), e)))?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    paths.sort();

    let mut interactions = Vec::new();
    for path in paths {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match extension.as_deref() {
            Some("yaml") | Some("yml") => load_yaml_file(&path, &mut interactions)?,
            Some("json") => load_json_file(&path, &mut interactions)?,
            _ => {
                tracing::debug!("skipping non-corpus file {}", path.display());
            }
        }
    }

    Ok(interactions)
}

fn load_yaml_file(path: &Path, interactions: &mut Vec<RecordedInteraction>) -> Result<(), Error> {
    let content = read_file(path)?;
    for document in serde_yaml::Deserializer::from_str(&content) {
        // A trailing `---` yields an empty document; tolerate it.
        let interaction = Option::<RecordedInteraction>::deserialize(document)
            .map_err(|e| Error::Load(format!("malformed interaction in {}: {}", path.display(), e)))?;
        if let Some(interaction) = interaction {
            interactions.push(interaction);
        }
    }
    Ok(())
}

fn load_json_file(path: &Path, interactions: &mut Vec<RecordedInteraction>) -> Result<(), Error> {
    let content = read_file(path)?;
    let parsed: JsonCorpusFile = serde_json::from_str(&content)
        .map_err(|e| Error::Load(format!("malformed interaction in {}: {}", path.display(), e)))?;
    match parsed {
        JsonCorpusFile::Many(many) => interactions.extend(many),
        JsonCorpusFile::One(one) => interactions.push(*one),
    }
    Ok(())
}

fn read_file(path: &Path) -> Result<String, Error> {
    fs::read_to_string(path)
        .map_err(|e| Error::Load(format!("cannot read corpus file {}: {}", path.display(), e)))
}
