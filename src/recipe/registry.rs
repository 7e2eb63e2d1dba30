// src/recipe/registry.rs

//! Recipe loading and indexing
//!
//! The registry is pure lookup: it loads TOML recipe files from a directory
//! once, validates them, and hands out shared references. All resolution
//! logic lives in the solver.

use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::recipe::format::Recipe;
use crate::version::Version;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

/// Read access to externally authored recipes
pub trait RecipeSource: Send + Sync {
    /// Load the recipe for a package name
    fn load_recipe(&self, name: &str) -> Result<Arc<Recipe>>;

    /// Ordered (highest first) available versions with their checksums
    fn list_versions(&self, name: &str) -> Result<Vec<(Version, Hash)>> {
        let recipe = self.load_recipe(name)?;
        recipe
            .versions_descending()
            .into_iter()
            .map(|e| Ok((e.version.clone(), e.checksum()?)))
            .collect()
    }
}

/// In-memory index of loaded recipes, keyed by package name
#[derive(Debug, Default)]
pub struct RecipeRegistry {
    recipes: BTreeMap<String, Arc<Recipe>>,
}

impl RecipeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.toml` file under a directory (recursively)
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut registry = Self::new();

        for entry in WalkDir::new(dir).follow_links(true) {
            let entry = entry.map_err(|e| Error::IoError(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            if entry.path().extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            registry.load_file(entry.path())?;
        }

        debug!("loaded {} recipes from {}", registry.len(), dir.display());
        Ok(registry)
    }

    /// Load and index a single recipe file
    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path)?;
        let recipe: Recipe = toml::from_str(&content).map_err(|e| Error::RecipeError {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        recipe.validate().map_err(|e| Error::RecipeError {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        self.insert(recipe)
    }

    /// Insert a recipe directly (used by tests and embedded registries)
    pub fn insert(&mut self, recipe: Recipe) -> Result<()> {
        let name = recipe.package.name.clone();
        if self.recipes.contains_key(&name) {
            return Err(Error::ParseError(format!(
                "duplicate recipe for package '{}'",
                name
            )));
        }
        self.recipes.insert(name, Arc::new(recipe));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Recipe>> {
        self.recipes.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    /// Package names in lexicographic order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.recipes.keys().map(|s| s.as_str())
    }
}

impl RecipeSource for RecipeRegistry {
    fn load_recipe(&self, name: &str) -> Result<Arc<Recipe>> {
        self.get(name)
            .ok_or_else(|| Error::NotFound(format!("no recipe for package '{}'", name)))
    }
}
