use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the manifest file inside the data directory
pub const MANIFEST_FILE: &str = "templates.json";

/// Size class of a HUD glyph, in canonical pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlyphSize {
    /// 8x8 text and counter glyphs
    Small,
    /// 8x16 item sprites
    Tall,
}

impl GlyphSize {
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            GlyphSize::Small => (8, 8),
            GlyphSize::Tall => (8, 16),
        }
    }
}

/// Closed set of template groups a tile can be matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateGroup {
    /// Digits, blank, and the "X" / "A" / "L" HUD letters
    Glyph,
    /// Full, half and empty heart containers
    Heart,
    /// Items that can sit in the B slot
    BItem,
    /// Sword levels shown in the A slot
    Sword,
    /// Pickups lying on the floor of the gameplay area
    FloorItem,
}

impl TemplateGroup {
    pub const ALL: [TemplateGroup; 5] = [
        TemplateGroup::Glyph,
        TemplateGroup::Heart,
        TemplateGroup::BItem,
        TemplateGroup::Sword,
        TemplateGroup::FloorItem,
    ];

    pub fn size(self) -> GlyphSize {
        match self {
            TemplateGroup::Glyph | TemplateGroup::Heart => GlyphSize::Small,
            TemplateGroup::BItem | TemplateGroup::Sword | TemplateGroup::FloorItem => {
                GlyphSize::Tall
            }
        }
    }
}

/// One reference image inside a group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateEntry {
    pub name: String,
    pub file: String,
}

/// Ordered reference images for one group. Order is the bank index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupEntry {
    pub group: TemplateGroup,
    pub templates: Vec<TemplateEntry>,
}

/// Reference image of one room, used for map localization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomEntry {
    pub id: u16,
    pub name: String,
    pub file: String,
}

/// Raw templates.json file format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateManifest {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub groups: Vec<GroupEntry>,
    #[serde(default)]
    pub rooms: Vec<RoomEntry>,
}

impl TemplateManifest {
    /// Load the manifest from the data directory.
    /// A missing manifest yields an empty library; a malformed one is an error.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let manifest_path = data_dir.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            tracing::warn!(
                "No {} found at {}. Template matching disabled.",
                MANIFEST_FILE,
                manifest_path.display()
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&manifest_path)
            .with_context(|| format!("Failed to read {}", manifest_path.display()))?;
        let manifest: TemplateManifest = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", manifest_path.display()))?;

        tracing::info!(
            "Loaded manifest v{}: {} group(s), {} room(s)",
            manifest.version,
            manifest.groups.len(),
            manifest.rooms.len()
        );
        Ok(manifest)
    }

    /// Entries for one group, in bank order. Duplicate group entries are concatenated.
    pub fn group(&self, group: TemplateGroup) -> Vec<&TemplateEntry> {
        self.groups
            .iter()
            .filter(|g| g.group == group)
            .flat_map(|g| g.templates.iter())
            .collect()
    }

    pub fn template_count(&self) -> usize {
        self.groups.iter().map(|g| g.templates.len()).sum::<usize>() + self.rooms.len()
    }
}

/// Resolve a manifest-relative file name against the data directory
pub fn resolve(data_dir: &Path, file: &str) -> PathBuf {
    data_dir.join("templates").join(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_nonexistent() {
        let manifest = TemplateManifest::load(Path::new("/nonexistent")).unwrap();
        assert!(manifest.groups.is_empty());
        assert_eq!(manifest.template_count(), 0);
    }

    #[test]
    fn test_parse_manifest() {
        let json = r#"{
            "version": "1",
            "groups": [
                { "group": "glyph", "templates": [
                    { "name": "0", "file": "glyph/0.png" },
                    { "name": "1", "file": "glyph/1.png" }
                ]},
                { "group": "b_item", "templates": [
                    { "name": "empty", "file": "b_item/empty.png" }
                ]},
                { "group": "glyph", "templates": [
                    { "name": "x", "file": "glyph/x.png" }
                ]}
            ],
            "rooms": [ { "id": 119, "name": "start", "file": "rooms/ow_7_7.png" } ]
        }"#;
        let manifest: TemplateManifest = serde_json::from_str(json).unwrap();
        let glyphs = manifest.group(TemplateGroup::Glyph);
        assert_eq!(glyphs.len(), 3);
        assert_eq!(glyphs[2].name, "x");
        assert_eq!(manifest.group(TemplateGroup::Sword).len(), 0);
        assert_eq!(manifest.template_count(), 5);
    }

    #[test]
    fn test_group_sizes() {
        assert_eq!(TemplateGroup::Glyph.size().dimensions(), (8, 8));
        assert_eq!(TemplateGroup::Sword.size().dimensions(), (8, 16));
        assert_eq!(TemplateGroup::FloorItem.size(), GlyphSize::Tall);
    }

    #[test]
    fn test_resolve() {
        let p = resolve(Path::new("data"), "glyph/0.png");
        assert_eq!(p, PathBuf::from("data/templates/glyph/0.png"));
    }
}
