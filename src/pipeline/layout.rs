//! Output folder naming
//!
//! For an input `/music/Album.flac` every artifact lives in `/music/Album/`
//! and is named after the input stem:
//!
//! | artifact                 | file                           |
//! |--------------------------|--------------------------------|
//! | tier                     | `Album_<T>.flac`               |
//! | residual                 | `Album_<T>_residual.flac`      |
//! | reconstruction           | `Album_<T>_reco.flac`          |
//! | reconstruction residual  | `Album_<T>_reco_residual.flac` |
//! | lossy preview            | `Album_LB.opus`                |
//! | thumbnail                | `Album_TN.opus`                |
//! | cover art                | `cover.jpg`                    |

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{FomaError, Result};
use crate::tier::TierName;

/// How an existing output folder is treated at the start of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Delete the folder and start empty
    #[default]
    Wipe,
    /// Keep unrelated files, remove only artifacts this run would produce
    Reuse,
}

/// Paths of every artifact produced for one input
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactLayout {
    input: PathBuf,
    output_dir: PathBuf,
    base_name: String,
}

impl ArtifactLayout {
    /// Layout for `input`, with the output folder as its sibling
    pub fn for_input(input: &Path) -> Result<Self> {
        let base_name = input
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| FomaError::Config {
                reason: format!("cannot derive an output name from {}", input.display()),
            })?
            .to_string();
        let parent = input.parent().unwrap_or_else(|| Path::new(""));

        Ok(Self {
            input: input.to_path_buf(),
            output_dir: parent.join(&base_name),
            base_name,
        })
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    fn file(&self, suffix: &str) -> PathBuf {
        self.output_dir.join(format!("{}_{}", self.base_name, suffix))
    }

    pub fn tier(&self, tier: &TierName) -> PathBuf {
        self.file(&format!("{}.flac", tier))
    }

    pub fn residual(&self, tier: &TierName) -> PathBuf {
        self.file(&format!("{}_residual.flac", tier))
    }

    pub fn reco(&self, tier: &TierName) -> PathBuf {
        self.file(&format!("{}_reco.flac", tier))
    }

    pub fn reco_residual(&self, tier: &TierName) -> PathBuf {
        self.file(&format!("{}_reco_residual.flac", tier))
    }

    pub fn preview(&self) -> PathBuf {
        self.file("LB.opus")
    }

    pub fn thumbnail(&self) -> PathBuf {
        self.file("TN.opus")
    }

    pub fn cover(&self) -> PathBuf {
        self.output_dir.join("cover.jpg")
    }

    /// Every path a run over `tiers` could create
    pub fn artifacts<'t>(&self, tiers: impl IntoIterator<Item = &'t TierName>) -> Vec<PathBuf> {
        let mut paths = vec![self.preview(), self.thumbnail(), self.cover()];
        for tier in tiers {
            paths.push(self.tier(tier));
            paths.push(self.residual(tier));
            paths.push(self.reco(tier));
            paths.push(self.reco_residual(tier));
        }
        paths
    }

    /// Create the output folder according to `mode`
    ///
    /// In `Reuse` mode every artifact of `tiers` is removed first, so a
    /// stale file from an earlier run can never be verified in place of a
    /// missing one.
    pub fn prepare<'t>(
        &self,
        mode: OutputMode,
        tiers: impl IntoIterator<Item = &'t TierName>,
    ) -> Result<()> {
        let dir_error = |source| FomaError::OutputDir {
            path: self.output_dir.clone(),
            source,
        };

        match mode {
            OutputMode::Wipe => {
                if self.output_dir.exists() {
                    info!("Removing existing folder {}", self.output_dir.display());
                    fs::remove_dir_all(&self.output_dir).map_err(dir_error)?;
                }
                fs::create_dir_all(&self.output_dir).map_err(dir_error)?;
            }
            OutputMode::Reuse => {
                fs::create_dir_all(&self.output_dir).map_err(dir_error)?;
                for path in self.artifacts(tiers) {
                    if path.exists() {
                        debug!("Removing stale artifact {}", path.display());
                        fs::remove_file(&path).map_err(dir_error)?;
                    }
                }
            }
        }

        info!("Output folder ready: {}", self.output_dir.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_names_follow_input_stem() {
        let layout = ArtifactLayout::for_input(Path::new("/music/Album.flac")).unwrap();
        assert_eq!(layout.output_dir(), Path::new("/music/Album"));
        assert_eq!(
            layout.tier(&TierName::sr()),
            PathBuf::from("/music/Album/Album_SR.flac")
        );
        assert_eq!(
            layout.residual(&TierName::hr()),
            PathBuf::from("/music/Album/Album_HR_residual.flac")
        );
        assert_eq!(
            layout.reco(&TierName::sr()),
            PathBuf::from("/music/Album/Album_SR_reco.flac")
        );
        assert_eq!(
            layout.reco_residual(&TierName::sr()),
            PathBuf::from("/music/Album/Album_SR_reco_residual.flac")
        );
        assert_eq!(layout.preview(), PathBuf::from("/music/Album/Album_LB.opus"));
        assert_eq!(layout.thumbnail(), PathBuf::from("/music/Album/Album_TN.opus"));
        assert_eq!(layout.cover(), PathBuf::from("/music/Album/cover.jpg"));
    }

    #[test]
    fn test_wipe_removes_unrelated_files() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArtifactLayout::for_input(&dir.path().join("song.flac")).unwrap();
        fs::create_dir_all(layout.output_dir()).unwrap();
        let notes = layout.output_dir().join("notes.txt");
        fs::write(&notes, "keep?").unwrap();

        layout.prepare(OutputMode::Wipe, &[TierName::cr()]).unwrap();

        assert!(layout.output_dir().is_dir());
        assert!(!notes.exists());
    }

    #[test]
    fn test_reuse_keeps_unrelated_files_but_clears_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ArtifactLayout::for_input(&dir.path().join("song.flac")).unwrap();
        fs::create_dir_all(layout.output_dir()).unwrap();
        let notes = layout.output_dir().join("notes.txt");
        let stale = layout.reco_residual(&TierName::sr());
        fs::write(&notes, "keep").unwrap();
        fs::write(&stale, "old").unwrap();

        layout
            .prepare(OutputMode::Reuse, &[TierName::cr(), TierName::sr()])
            .unwrap();

        assert!(notes.exists());
        assert!(!stale.exists());
    }
}
