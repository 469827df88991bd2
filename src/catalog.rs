use crate::ASSET_ROOT;
use crate::config::AppConfig;
use bevy::prelude::{Commands, Res, Resource};
use std::fs;
use std::path::Path;

/// Extension of placeable model files under the models directory.
pub const MODEL_EXTENSION: &str = "glb";

/// The placeable models found at startup. Built once; never refreshed.
#[derive(Resource, Debug, Default, Clone)]
pub struct ModelCatalog {
    models: Vec<String>,
}

impl ModelCatalog {
    /// Scan `dir` for `.glb` files and strip the extension to form the
    /// model identifiers. An unreadable directory yields an empty
    /// catalog rather than an error; the picker copes with zero
    /// entries.
    pub fn scan(dir: &Path) -> Self {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!("could not scan models dir {}: {err}", dir.display());
                return Self::default();
            }
        };

        let mut filenames: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        filenames.sort();

        Self {
            models: model_names(filenames.into_iter()),
        }
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Scan the configured models directory and publish the catalog as a
/// resource. Runs once at startup, after the log subscriber is up.
pub fn load_model_catalog(mut commands: Commands, config: Res<AppConfig>) {
    let dir = Path::new(ASSET_ROOT).join(&config.models_dir);
    let catalog = ModelCatalog::scan(&dir);
    tracing::info!(
        "{} placeable model(s) in {}",
        catalog.models().len(),
        dir.display()
    );
    commands.insert_resource(catalog);
}

/// Keep filenames carrying the model extension, in scan order, with the
/// extension stripped.
fn model_names(filenames: impl Iterator<Item = String>) -> Vec<String> {
    let suffix = format!(".{MODEL_EXTENSION}");
    filenames
        .filter_map(|filename| {
            filename
                .strip_suffix(&suffix)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs::File;

    fn names(filenames: &[&str]) -> Vec<String> {
        model_names(filenames.iter().map(|s| s.to_string()))
    }

    #[test]
    fn strips_extension_and_keeps_scan_order() {
        assert_eq!(names(&["chair.glb", "lamp.glb"]), vec!["chair", "lamp"]);
        assert_eq!(names(&["lamp.glb", "chair.glb"]), vec!["lamp", "chair"]);
    }

    #[test]
    fn ignores_files_with_other_extensions() {
        assert_eq!(
            names(&["chair.glb", "readme.txt", "lamp.png", "vase.glb"]),
            vec!["chair", "vase"]
        );
    }

    #[test]
    fn no_entry_retains_the_extension() {
        for name in names(&["chair.glb", "table.glb.glb"]) {
            assert!(!name.ends_with(".glb"), "{name} kept its extension");
        }
    }

    #[test]
    fn bare_extension_is_not_a_model() {
        assert_eq!(names(&[".glb"]), Vec::<String>::new());
    }

    #[test]
    fn empty_listing_gives_empty_catalog() {
        assert_eq!(names(&[]), Vec::<String>::new());
    }

    #[test]
    fn missing_directory_degrades_to_empty() {
        let catalog = ModelCatalog::scan(Path::new("/definitely/not/a/models/dir"));
        assert!(catalog.is_empty());
        assert_eq!(catalog.models(), &[] as &[String]);
    }

    #[test]
    fn scan_lists_glb_files_sorted() {
        let dir = std::env::temp_dir().join(format!("setdress-catalog-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        for filename in ["lamp.glb", "chair.glb", "notes.txt"] {
            File::create(dir.join(filename)).unwrap();
        }

        let catalog = ModelCatalog::scan(&dir);
        assert_eq!(catalog.models(), ["chair", "lamp"]);

        fs::remove_dir_all(&dir).unwrap();
    }
}
