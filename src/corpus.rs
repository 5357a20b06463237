//! Directory-backed corpus: one JSON file per series
//!
//! ```text
//! <root>/
//! ├── ts_0.json
//! ├── ts_1.json
//! └── ...
//! ```
//!
//! Each file holds `{"times": [...], "values": [...]}`.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use rand::Rng;
use vantage_core::corpus::{CorpusError, SeriesId, SeriesSource};

use crate::series::TimeSeries;

const FILE_PREFIX: &str = "ts_";
const FILE_EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct DirCorpus {
    root: PathBuf,
}

impl DirCorpus {
    /// Open an existing corpus directory
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CorpusError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("corpus directory {:?} not found", root),
            )
            .into());
        }
        Ok(Self { root })
    }

    /// Open the corpus directory at `root`, creating it if needed
    pub fn create(root: impl Into<PathBuf>) -> Result<Self, CorpusError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, id: SeriesId) -> PathBuf {
        self.root
            .join(format!("{}{}.{}", FILE_PREFIX, id.0, FILE_EXTENSION))
    }

    /// Store `series` under `id`, replacing any previous content
    pub fn write(&self, id: SeriesId, series: &TimeSeries) -> Result<(), CorpusError> {
        let path = self.path_of(id);
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_json::to_writer(&mut writer, series).map_err(|e| CorpusError::Decode {
            id,
            reason: e.to_string(),
        })?;
        writer.flush()?;
        Ok(())
    }

    /// Fill the corpus with `count` random synthetic series, ids `0..count`
    pub fn generate<R: Rng + ?Sized>(&self, count: u64, rng: &mut R) -> Result<(), CorpusError> {
        for id in (0..count).map(SeriesId) {
            let series = TimeSeries::random(rng).map_err(|e| CorpusError::Decode {
                id,
                reason: e.to_string(),
            })?;
            self.write(id, &series)?;
        }
        tracing::info!("Generated {} series in {:?}", count, self.root);
        Ok(())
    }
}

fn parse_file_name(path: &Path) -> Option<SeriesId> {
    if path.extension().and_then(|x| x.to_str()) != Some(FILE_EXTENSION) {
        return None;
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.strip_prefix(FILE_PREFIX))
        .and_then(|s| s.parse::<u64>().ok())
        .map(SeriesId)
}

impl SeriesSource for DirCorpus {
    type Series = TimeSeries;

    fn ids(&self) -> Result<Vec<SeriesId>, CorpusError> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            match parse_file_name(&path) {
                Some(id) => ids.push(id),
                None => tracing::debug!("Ignoring {:?} in corpus directory", path),
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    fn fetch(&self, id: SeriesId) -> Result<TimeSeries, CorpusError> {
        let path = self.path_of(id);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(CorpusError::NotFound(id))
            }
            Err(err) => return Err(err.into()),
        };
        serde_json::from_reader(BufReader::new(file)).map_err(|e| CorpusError::Decode {
            id,
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::tempdir;

    #[test]
    fn test_write_and_fetch() {
        let dir = tempdir().unwrap();
        let corpus = DirCorpus::create(dir.path()).unwrap();
        let series = TimeSeries::new(vec![0.0, 0.5, 1.0], vec![1.0, -2.0, 3.5]).unwrap();

        corpus.write(SeriesId(7), &series).unwrap();

        assert!(dir.path().join("ts_7.json").is_file());
        assert_eq!(corpus.fetch(SeriesId(7)).unwrap(), series);
        assert_eq!(corpus.ids().unwrap(), vec![SeriesId(7)]);
    }

    #[test]
    fn test_ids_skip_foreign_files() {
        let dir = tempdir().unwrap();
        let corpus = DirCorpus::create(dir.path()).unwrap();
        for name in ["ts_10.json", "ts_2.json", "ts_x.json", "readme.txt", "ts_3.csv"] {
            std::fs::write(dir.path().join(name), b"{}").unwrap();
        }

        assert_eq!(corpus.ids().unwrap(), vec![SeriesId(2), SeriesId(10)]);
    }

    #[test]
    fn test_fetch_errors() {
        let dir = tempdir().unwrap();
        let corpus = DirCorpus::create(dir.path()).unwrap();
        std::fs::write(corpus.path_of(SeriesId(1)), b"not json").unwrap();

        assert!(matches!(
            corpus.fetch(SeriesId(0)),
            Err(CorpusError::NotFound(SeriesId(0)))
        ));
        assert!(matches!(
            corpus.fetch(SeriesId(1)),
            Err(CorpusError::Decode { id: SeriesId(1), .. })
        ));
    }

    #[test]
    fn test_open_requires_existing_directory() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing");

        assert!(matches!(DirCorpus::open(&missing), Err(CorpusError::Io(_))));
        assert!(!missing.exists());

        DirCorpus::create(&missing).unwrap();
        assert!(DirCorpus::open(&missing).is_ok());
    }

    #[test]
    fn test_generate_is_seeded() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        let ca = DirCorpus::create(a.path()).unwrap();
        let cb = DirCorpus::create(b.path()).unwrap();

        ca.generate(5, &mut StdRng::seed_from_u64(9)).unwrap();
        cb.generate(5, &mut StdRng::seed_from_u64(9)).unwrap();

        assert_eq!(ca.ids().unwrap().len(), 5);
        for id in ca.ids().unwrap() {
            assert_eq!(ca.fetch(id).unwrap(), cb.fetch(id).unwrap());
        }
    }
}
