// src/recipe/mod.rs

//! Package recipes: format and registry

pub mod format;
pub mod registry;

pub use format::{
    BuildSection, DepKind, DependencyDecl, Hook, HookWhen, PackageSection, PatchDecl, Recipe,
    VersionEntry,
};
pub use registry::{RecipeRegistry, RecipeSource};
