use anyhow::{Context, Result};
use image::GrayImage;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};
use z1_data::{TemplateGroup, TemplateManifest};

use crate::layout::ROOM_SAMPLE;
use crate::ncc::{ncc_score, normalize};

/// Reference image stored at zero mean / unit variance
#[derive(Debug, Clone)]
pub struct NormalizedTemplate {
    pub name: String,
    values: Vec<f32>,
}

impl NormalizedTemplate {
    pub fn from_pixels(name: impl Into<String>, raw: &[f32]) -> Self {
        Self {
            name: name.into(),
            values: normalize(raw),
        }
    }

    pub fn from_image(name: impl Into<String>, gray: &GrayImage) -> Self {
        let raw: Vec<f32> = gray.as_raw().iter().map(|&p| p as f32).collect();
        Self::from_pixels(name, &raw)
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn score(&self, sample: &[f32]) -> f32 {
        ncc_score(sample, &self.values)
    }
}

/// Winner of a bank search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BankMatch {
    pub index: usize,
    pub score: f32,
}

/// Ordered templates of one group, all of the same size
#[derive(Debug, Clone)]
pub struct TemplateBank {
    width: u32,
    height: u32,
    templates: Vec<NormalizedTemplate>,
}

impl TemplateBank {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            templates: Vec::new(),
        }
    }

    pub fn for_group(group: TemplateGroup) -> Self {
        let (w, h) = group.size().dimensions();
        Self::new(w, h)
    }

    pub fn push(&mut self, template: NormalizedTemplate) {
        debug_assert_eq!(template.values().len(), (self.width * self.height) as usize);
        self.templates.push(template);
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.templates.get(index).map(|t| t.name.as_str())
    }

    /// Highest-scoring template for the sample; first wins on ties.
    /// An empty bank has no winner.
    pub fn best_match(&self, sample: &[f32]) -> Option<BankMatch> {
        let mut best: Option<BankMatch> = None;
        for (index, template) in self.templates.iter().enumerate() {
            let score = template.score(sample);
            if best.map_or(true, |b| score > b.score) {
                best = Some(BankMatch { index, score });
            }
        }
        best
    }
}

/// Downsampled reference image of one room
#[derive(Debug, Clone)]
pub struct RoomTemplate {
    pub id: u16,
    pub template: NormalizedTemplate,
}

/// Every template bank plus the room bank. Immutable once loaded.
#[derive(Debug, Clone, Default)]
pub struct TemplateLibrary {
    banks: HashMap<TemplateGroup, TemplateBank>,
    rooms: Vec<RoomTemplate>,
}

impl TemplateLibrary {
    /// Load every image listed in the manifest under `data_dir`.
    /// Unreadable images are skipped with a warning.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let manifest = TemplateManifest::load(data_dir)?;
        let mut library = Self::default();

        for group in TemplateGroup::ALL {
            let (w, h) = group.size().dimensions();
            let mut bank = TemplateBank::new(w, h);
            for entry in manifest.group(group) {
                let path = z1_data::resolve(data_dir, &entry.file);
                match load_gray(&path, w, h) {
                    Ok(gray) => bank.push(NormalizedTemplate::from_image(&entry.name, &gray)),
                    Err(e) => warn!("Failed to load {:?} template {}: {:#}", group, entry.name, e),
                }
            }
            debug!("{:?} bank: {} template(s)", group, bank.len());
            library.banks.insert(group, bank);
        }

        for room in &manifest.rooms {
            let path = z1_data::resolve(data_dir, &room.file);
            match load_gray(&path, ROOM_SAMPLE.0, ROOM_SAMPLE.1) {
                Ok(gray) => library.add_room(room.id, NormalizedTemplate::from_image(&room.name, &gray)),
                Err(e) => warn!("Failed to load room {} ({}): {:#}", room.id, room.name, e),
            }
        }

        info!(
            "TemplateLibrary loaded {} template(s) and {} room(s) from {}",
            library.banks.values().map(TemplateBank::len).sum::<usize>(),
            library.rooms.len(),
            data_dir.display()
        );
        Ok(library)
    }

    pub fn insert_bank(&mut self, group: TemplateGroup, bank: TemplateBank) {
        self.banks.insert(group, bank);
    }

    pub fn add_room(&mut self, id: u16, template: NormalizedTemplate) {
        self.rooms.push(RoomTemplate { id, template });
    }

    pub fn bank(&self, group: TemplateGroup) -> Option<&TemplateBank> {
        self.banks.get(&group).filter(|b| !b.is_empty())
    }

    pub fn rooms(&self) -> &[RoomTemplate] {
        &self.rooms
    }

    pub fn template_count(&self) -> usize {
        self.banks.values().map(TemplateBank::len).sum::<usize>() + self.rooms.len()
    }
}

/// Load an image as grayscale at exactly `width` x `height`
fn load_gray(path: &Path, width: u32, height: u32) -> Result<GrayImage> {
    let img = image::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let gray = img.to_luma8();
    if gray.dimensions() == (width, height) {
        return Ok(gray);
    }
    Ok(image::imageops::resize(
        &gray,
        width,
        height,
        image::imageops::FilterType::Triangle,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glyph(seed: u32) -> Vec<f32> {
        (0..64u32)
            .map(|i| ((i.wrapping_mul(seed).wrapping_add(seed * 3)) % 251) as f32)
            .collect()
    }

    #[test]
    fn test_best_match_picks_source_template() {
        let mut bank = TemplateBank::new(8, 8);
        bank.push(NormalizedTemplate::from_pixels("a", &glyph(7)));
        bank.push(NormalizedTemplate::from_pixels("b", &glyph(13)));
        bank.push(NormalizedTemplate::from_pixels("c", &glyph(29)));

        let m = bank.best_match(&glyph(13)).unwrap();
        assert_eq!(m.index, 1);
        assert_eq!(bank.name(m.index), Some("b"));
        assert!((m.score - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_empty_bank_has_no_match() {
        let bank = TemplateBank::new(8, 8);
        assert!(bank.best_match(&glyph(3)).is_none());
        let library = TemplateLibrary::default();
        assert!(library.bank(TemplateGroup::Glyph).is_none());
    }

    #[test]
    fn test_load_without_manifest_is_empty() {
        let library = TemplateLibrary::load(Path::new("/nonexistent")).unwrap();
        assert_eq!(library.template_count(), 0);
    }

    #[test]
    fn test_load_from_disk() {
        let dir = std::env::temp_dir().join(format!("z1_templates_{}", std::process::id()));
        let glyph_dir = dir.join("templates").join("glyph");
        std::fs::create_dir_all(&glyph_dir).unwrap();

        // Stored at 2x; the loader resizes to the group size
        let img = GrayImage::from_fn(16, 16, |x, y| image::Luma([((x / 2 + y / 2) * 30) as u8]));
        img.save(glyph_dir.join("7.png")).unwrap();
        std::fs::write(
            dir.join("templates.json"),
            r#"{ "version": "t", "groups": [ { "group": "glyph", "templates": [
                { "name": "7", "file": "glyph/7.png" },
                { "name": "missing", "file": "glyph/missing.png" } ] } ] }"#,
        )
        .unwrap();

        let library = TemplateLibrary::load(&dir).unwrap();
        let bank = library.bank(TemplateGroup::Glyph).unwrap();
        assert_eq!(bank.len(), 1);
        assert_eq!(bank.dimensions(), (8, 8));
        assert_eq!(bank.name(0), Some("7"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
