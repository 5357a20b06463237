//! On-disk layout of a built index generation
//!
//! ```text
//! <root>/
//! ├── vantage_points.vps
//! └── indices/
//!     ├── vp_<id>.vpi
//!     └── ...
//! ```
//!
//! Builds write into `<root>.staging` and are swapped into `<root>` by rename.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use crate::corpus::SeriesId;

pub const VANTAGE_SET_FILE: &str = "vantage_points.vps";
pub const INDICES_DIR: &str = "indices";
pub const INDEX_EXTENSION: &str = "vpi";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLayout {
    root: PathBuf,
}

impl IndexLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn vantage_set_path(&self) -> PathBuf {
        self.root.join(VANTAGE_SET_FILE)
    }

    pub fn indices_dir(&self) -> PathBuf {
        self.root.join(INDICES_DIR)
    }

    pub fn index_path(&self, vantage: SeriesId) -> PathBuf {
        self.indices_dir()
            .join(format!("vp_{}.{}", vantage.0, INDEX_EXTENSION))
    }

    /// Whether a generation has been committed here
    pub fn exists(&self) -> bool {
        self.vantage_set_path().is_file()
    }

    /// Layout a build writes into before it is swapped in
    pub fn staging(&self) -> IndexLayout {
        IndexLayout::new(self.sibling(".staging"))
    }

    /// Where the previous generation is parked during a swap
    pub fn retired_root(&self) -> PathBuf {
        self.sibling(".retired")
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .root
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("vantage_index"));
        name.push(suffix);
        self.root.with_file_name(name)
    }

    /// Vantage point ids that have an index file present, ascending
    pub fn indexed_vantage_points(&self) -> io::Result<Vec<SeriesId>> {
        let dir = self.indices_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|x| x.to_str()) != Some(INDEX_EXTENSION) {
                continue;
            }
            let id = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.strip_prefix("vp_"))
                .and_then(|s| s.parse::<u64>().ok());
            if let Some(id) = id {
                ids.push(SeriesId(id));
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Replace the generation at `root` with the one built in `staging`.
    ///
    /// Both renames stay inside the parent directory. Any stale index files of
    /// the previous generation go away with the retired tree.
    pub fn commit(&self, staging: &IndexLayout) -> io::Result<()> {
        let retired = self.retired_root();
        if retired.exists() {
            std::fs::remove_dir_all(&retired)?;
        }
        if self.root.exists() {
            std::fs::rename(&self.root, &retired)?;
        }
        if let Err(err) = std::fs::rename(&staging.root, &self.root) {
            // Put the previous generation back so it keeps serving
            if retired.exists() {
                if let Err(restore) = std::fs::rename(&retired, &self.root) {
                    tracing::warn!(
                        "Failed to restore {:?} from {:?}: {}",
                        self.root,
                        retired,
                        restore
                    );
                }
            }
            return Err(err);
        }
        if retired.exists() {
            std::fs::remove_dir_all(&retired)?;
        }
        Ok(())
    }
}
