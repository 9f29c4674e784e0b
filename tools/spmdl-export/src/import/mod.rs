//! Scene importers
//!
//! An importer turns a source asset into a [`SourceScene`]. The exporter only
//! sees the scene, never the source file format.

mod gltf;

use std::path::Path;

use crate::error::Result;
use crate::scene::SourceScene;

pub use self::gltf::{import_gltf, import_gltf_slice, SCENE_ROOT_NAME};

pub trait SceneImporter {
    fn import(&self, path: &Path) -> Result<SourceScene>;
}

/// glTF 2.0 (`.gltf` / `.glb`) importer
#[derive(Debug, Clone, Copy, Default)]
pub struct GltfImporter;

impl SceneImporter for GltfImporter {
    fn import(&self, path: &Path) -> Result<SourceScene> {
        import_gltf(path)
    }
}

/// Importer for a file, chosen by extension
pub fn importer_for(path: &Path) -> Option<Box<dyn SceneImporter>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "gltf" | "glb" => Some(Box::new(GltfImporter)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_importer_by_extension() {
        assert!(importer_for(Path::new("hero.GLB")).is_some());
        assert!(importer_for(Path::new("scene.gltf")).is_some());
        assert!(importer_for(Path::new("mesh.obj")).is_none());
        assert!(importer_for(Path::new("noext")).is_none());
    }
}
