use std::path::PathBuf;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::shared::dcp_time::DcpTimePeriod;
use crate::shared::film::{ContentKind, Standard};

#[derive(Clone, Debug, PartialEq)]
pub enum AssetKind {
    Picture { stereoscopic: bool },
    Sound { channels: usize, sample_rate: u32 },
    Subtitle,
    Font,
}

/// One asset as it appears in the composition.
#[derive(Clone, Debug, PartialEq)]
pub struct AssetEntry {
    pub id: Uuid,
    pub kind: AssetKind,
    /// File name inside the package; `None` for an asset that lives in another package.
    pub file: Option<PathBuf>,
    pub edit_rate: u32,
    pub intrinsic_duration: i64,
    pub entry_point: i64,
    pub duration: i64,
    /// Base64 SHA-1 of the file, once digests have been calculated.
    pub hash: Option<String>,
    pub size: u64,
}

impl AssetEntry {
    pub fn is_referenced(&self) -> bool {
        self.file.is_none()
    }

    pub fn is_picture(&self) -> bool {
        matches!(self.kind, AssetKind::Picture { .. })
    }

    pub fn is_sound(&self) -> bool {
        matches!(self.kind, AssetKind::Sound { .. })
    }

    pub fn is_subtitle(&self) -> bool {
        matches!(self.kind, AssetKind::Subtitle)
    }
}

/// An asset from an existing package that a reel uses instead of writing its own.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferencedReelAsset {
    pub asset: AssetEntry,
    pub period: DcpTimePeriod,
}

/// One reel of the composition.
#[derive(Clone, Debug, PartialEq)]
pub struct ManifestReel {
    pub id: Uuid,
    pub picture: Option<AssetEntry>,
    pub sound: Option<AssetEntry>,
    pub subtitle: Option<AssetEntry>,
    pub fonts: Vec<AssetEntry>,
}

impl ManifestReel {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            picture: None,
            sound: None,
            subtitle: None,
            fonts: Vec::new(),
        }
    }

    pub fn assets(&self) -> impl Iterator<Item = &AssetEntry> {
        self.picture
            .iter()
            .chain(self.sound.iter())
            .chain(self.subtitle.iter())
            .chain(self.fonts.iter())
    }

    pub fn assets_mut(&mut self) -> impl Iterator<Item = &mut AssetEntry> {
        self.picture
            .iter_mut()
            .chain(self.sound.iter_mut())
            .chain(self.subtitle.iter_mut())
            .chain(self.fonts.iter_mut())
    }
}

impl Default for ManifestReel {
    fn default() -> Self {
        Self::new()
    }
}

/// The composition playlist: every reel of the package plus its metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct CompositionPlaylist {
    pub id: Uuid,
    pub content_title: String,
    pub annotation_text: String,
    pub content_kind: ContentKind,
    pub creator: String,
    pub issuer: String,
    pub issue_date: DateTime<Utc>,
    pub standard: Standard,
    pub reels: Vec<ManifestReel>,
}

impl CompositionPlaylist {
    pub fn new(content_title: &str, content_kind: ContentKind, standard: Standard) -> Self {
        Self {
            id: Uuid::new_v4(),
            content_title: content_title.to_string(),
            annotation_text: content_title.to_string(),
            content_kind,
            creator: String::new(),
            issuer: String::new(),
            issue_date: Utc::now(),
            standard,
            reels: Vec::new(),
        }
    }

    /// Assets whose files live in this package, i.e. everything the packing list must cover.
    pub fn package_assets(&self) -> Vec<&AssetEntry> {
        self.reels
            .iter()
            .flat_map(|r| r.assets())
            .filter(|a| !a.is_referenced())
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn entry(kind: AssetKind, file: Option<&str>) -> AssetEntry {
        AssetEntry {
            id: Uuid::new_v4(),
            kind,
            file: file.map(PathBuf::from),
            edit_rate: 24,
            intrinsic_duration: 10,
            entry_point: 0,
            duration: 10,
            hash: Some("aGFzaA==".to_string()),
            size: 100,
        }
    }

    #[test]
    fn test_package_assets_skips_referenced() {
        let mut cpl = CompositionPlaylist::new("Film", ContentKind::Feature, Standard::Smpte);
        let mut reel = ManifestReel::new();
        reel.picture = Some(entry(AssetKind::Picture { stereoscopic: false }, None));
        reel.sound = Some(entry(
            AssetKind::Sound {
                channels: 6,
                sample_rate: 48_000,
            },
            Some("pcm.mxf"),
        ));
        cpl.reels.push(reel);

        let assets = cpl.package_assets();
        assert_eq!(assets.len(), 1);
        assert!(assets[0].is_sound());
    }

    #[test]
    fn test_reel_asset_iteration_order() {
        let mut reel = ManifestReel::new();
        reel.subtitle = Some(entry(AssetKind::Subtitle, Some("sub.xml")));
        reel.picture = Some(entry(AssetKind::Picture { stereoscopic: true }, Some("j2c.mxf")));
        reel.fonts.push(entry(AssetKind::Font, Some("font.ttf")));

        let kinds: Vec<_> = reel.assets().map(|a| a.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                AssetKind::Picture { stereoscopic: true },
                AssetKind::Subtitle,
                AssetKind::Font
            ]
        );
    }

    #[test]
    fn test_assets_mut_updates_hash() {
        let mut reel = ManifestReel::new();
        reel.picture = Some(entry(AssetKind::Picture { stereoscopic: false }, Some("j2c.mxf")));
        for asset in reel.assets_mut() {
            asset.hash = Some("new".to_string());
        }
        assert_eq!(reel.picture.unwrap().hash.as_deref(), Some("new"));
    }
}
