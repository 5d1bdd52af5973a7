//! Training data builder — turns the sample store and label registry into
//! the `(images, ids)` set the recognizer trains on.

use crate::error::ServiceError;
use crate::labels::{lock_store, LabelStore};
use image::GrayImage;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

/// File extensions recognized as face samples.
const SAMPLE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Parallel image/label-id sequences of equal length.
#[derive(Default)]
pub struct TrainingSet {
    pub images: Vec<GrayImage>,
    pub ids: Vec<u32>,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Scan the dataset directory and assemble the full training set.
///
/// One identity per subdirectory; each resolves (or creates) its label id
/// through the registry. Unreadable sample files are logged and skipped —
/// a single corrupt sample must not abort training. Directories are
/// visited in sorted order so repeated builds over an unchanged dataset
/// yield identical sequences.
pub fn build(dataset_dir: &Path, labels: &Mutex<LabelStore>) -> Result<TrainingSet, ServiceError> {
    let mut set = TrainingSet::default();
    if !dataset_dir.is_dir() {
        return Ok(set);
    }

    let mut identity_dirs: Vec<_> = fs::read_dir(dataset_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    identity_dirs.sort();

    for dir in identity_dirs {
        let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
            tracing::warn!(path = %dir.display(), "skipping non-UTF-8 identity directory");
            continue;
        };
        let id = lock_store(labels).get_or_create(name)?;

        let mut sample_files: Vec<_> = fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| SAMPLE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        sample_files.sort();

        for path in sample_files {
            match image::open(&path) {
                Ok(img) => {
                    set.images.push(img.to_luma8());
                    set.ids.push(id);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable sample");
                }
            }
        }
    }

    tracing::debug!(samples = set.len(), "training set assembled");
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::save_sample;
    use facekeep_core::SAMPLE_SIZE;
    use image::Luma;
    use std::path::PathBuf;

    fn fixture() -> (tempfile::TempDir, PathBuf, Mutex<LabelStore>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let dataset = dir.path().join("dataset");
        let labels = Mutex::new(
            LabelStore::open(dir.path().join("labels.json")).expect("labels"),
        );
        (dir, dataset, labels)
    }

    fn sample(fill: u8) -> GrayImage {
        GrayImage::from_pixel(SAMPLE_SIZE, SAMPLE_SIZE, Luma([fill]))
    }

    #[test]
    fn test_empty_dataset_builds_empty_set() {
        let (_guard, dataset, labels) = fixture();
        let set = build(&dataset, &labels).expect("build");
        assert!(set.is_empty());
    }

    #[test]
    fn test_parallel_sequences_share_ids_per_identity() {
        let (_guard, dataset, labels) = fixture();
        save_sample(&dataset, "alice", &sample(10)).expect("save");
        save_sample(&dataset, "alice", &sample(20)).expect("save");
        save_sample(&dataset, "bob", &sample(30)).expect("save");

        let set = build(&dataset, &labels).expect("build");
        assert_eq!(set.images.len(), set.ids.len());
        assert_eq!(set.len(), 3);
        // alice sorts first, two samples under one id; bob gets the next id.
        assert_eq!(set.ids, vec![1, 1, 2]);
    }

    #[test]
    fn test_unreadable_sample_is_skipped() {
        let (_guard, dataset, labels) = fixture();
        save_sample(&dataset, "alice", &sample(10)).expect("save");
        fs::write(dataset.join("alice/002.png"), b"not a png").expect("write junk");

        let set = build(&dataset, &labels).expect("build");
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_unrecognized_extensions_ignored() {
        let (_guard, dataset, labels) = fixture();
        save_sample(&dataset, "alice", &sample(10)).expect("save");
        fs::write(dataset.join("alice/notes.txt"), b"hi").expect("write");

        let set = build(&dataset, &labels).expect("build");
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let (_guard, dataset, labels) = fixture();
        save_sample(&dataset, "bob", &sample(40)).expect("save");
        save_sample(&dataset, "alice", &sample(10)).expect("save");

        let first = build(&dataset, &labels).expect("first build");
        let second = build(&dataset, &labels).expect("second build");
        assert_eq!(first.ids, second.ids);
        assert_eq!(
            first.images.iter().map(|i| i.as_raw().clone()).collect::<Vec<_>>(),
            second.images.iter().map(|i| i.as_raw().clone()).collect::<Vec<_>>(),
        );
    }

    #[test]
    fn test_colliding_names_train_as_one_identity() {
        // "alice bob" and "alice/bob" sanitize to the same slug, so their
        // samples land in one directory and train under one label id.
        let (_guard, dataset, labels) = fixture();
        let slug_a = crate::store::sanitize_name("alice bob");
        let slug_b = crate::store::sanitize_name("alice/bob");
        assert_eq!(slug_a, slug_b);

        save_sample(&dataset, &slug_a, &sample(10)).expect("save");
        save_sample(&dataset, &slug_b, &sample(20)).expect("save");

        let set = build(&dataset, &labels).expect("build");
        assert_eq!(set.len(), 2);
        assert_eq!(set.ids[0], set.ids[1]);
    }
}
