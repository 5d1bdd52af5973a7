//! Sample store — normalized face crops persisted per identity.
//!
//! Layout: `<dataset_dir>/<slug>/NNN.png`, where `NNN` is the first unused
//! zero-padded index starting at 001. Writes for one identity are
//! serialized by the engine actor, so index probing cannot race itself.

use crate::error::{image_write_error, ServiceError};
use image::GrayImage;
use std::fs;
use std::path::{Path, PathBuf};

/// Slug used when sanitization leaves nothing of the raw name.
pub const FALLBACK_SLUG: &str = "user";

/// Upper bound on slug length, in characters.
const MAX_SLUG_CHARS: usize = 50;

/// Filesystem-safe projection of a raw identity name.
///
/// Keeps ASCII alphanumerics, `_`, `-` and CJK unified ideographs; every
/// other run of characters collapses to a single `_`. Lossy and not
/// injective: distinct raw names may map to one slug, in which case their
/// samples and label co-mingle (`LabelStore::note_alias` flags the merge).
pub fn sanitize_name(raw: &str) -> String {
    let mut slug = String::new();
    let mut in_gap = false;

    for c in raw.trim().chars() {
        let keep = c.is_ascii_alphanumeric()
            || c == '_'
            || c == '-'
            || ('\u{4e00}'..='\u{9fa5}').contains(&c);
        if keep {
            slug.push(c);
            in_gap = false;
        } else if !in_gap {
            slug.push('_');
            in_gap = true;
        }
    }

    let slug: String = slug.chars().take(MAX_SLUG_CHARS).collect();
    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// Persist a normalized 200x200 grayscale face crop for `slug`.
///
/// Creates the identity directory if absent and probes `001.png`,
/// `002.png`, ... for the first unused index. The sample write happens
/// before any registry mutation, so a failed write never leaves a ghost
/// identity.
pub fn save_sample(
    dataset_dir: &Path,
    slug: &str,
    face: &GrayImage,
) -> Result<PathBuf, ServiceError> {
    let identity_dir = dataset_dir.join(slug);
    fs::create_dir_all(&identity_dir)?;

    let mut index = 1u32;
    let path = loop {
        let candidate = identity_dir.join(format!("{index:03}.png"));
        if !candidate.exists() {
            break candidate;
        }
        index += 1;
    };

    face.save(&path).map_err(image_write_error)?;
    tracing::debug!(slug, path = %path.display(), "face sample saved");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use facekeep_core::SAMPLE_SIZE;

    fn sample() -> GrayImage {
        GrayImage::from_pixel(SAMPLE_SIZE, SAMPLE_SIZE, image::Luma([127u8]))
    }

    #[test]
    fn test_sanitize_keeps_safe_characters() {
        assert_eq!(sanitize_name("alice_bob-01"), "alice_bob-01");
        assert_eq!(sanitize_name("张伟"), "张伟");
    }

    #[test]
    fn test_sanitize_collapses_runs() {
        assert_eq!(sanitize_name("alice // bob"), "alice_bob");
        assert_eq!(sanitize_name("!!a!!b!!"), "_a_b_");
    }

    #[test]
    fn test_sanitize_trims_and_truncates() {
        assert_eq!(sanitize_name("  alice  "), "alice");
        let long: String = std::iter::repeat('x').take(80).collect();
        assert_eq!(sanitize_name(&long).chars().count(), 50);
    }

    #[test]
    fn test_sanitize_empty_falls_back() {
        assert_eq!(sanitize_name(""), FALLBACK_SLUG);
        assert_eq!(sanitize_name("   "), FALLBACK_SLUG);
    }

    #[test]
    fn test_sanitize_collision_is_the_contract() {
        // Known limitation: distinct raw names can share one slug, which
        // co-mingles their samples and label. Asserted here so a change
        // in behavior is a deliberate decision, not an accident.
        assert_eq!(sanitize_name("alice bob"), sanitize_name("alice/bob"));
    }

    #[test]
    fn test_samples_numbered_sequentially() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = save_sample(dir.path(), "alice", &sample()).expect("save");
        let second = save_sample(dir.path(), "alice", &sample()).expect("save");

        assert!(first.ends_with("alice/001.png"));
        assert!(second.ends_with("alice/002.png"));
    }

    #[test]
    fn test_first_unused_index_is_reused() {
        let dir = tempfile::tempdir().expect("tempdir");
        save_sample(dir.path(), "alice", &sample()).expect("save 001");
        save_sample(dir.path(), "alice", &sample()).expect("save 002");
        fs::remove_file(dir.path().join("alice/001.png")).expect("remove");

        let path = save_sample(dir.path(), "alice", &sample()).expect("save");
        assert!(path.ends_with("alice/001.png"));
    }

    #[test]
    fn test_identities_get_separate_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        save_sample(dir.path(), "alice", &sample()).expect("save");
        save_sample(dir.path(), "bob", &sample()).expect("save");
        assert!(dir.path().join("alice/001.png").exists());
        assert!(dir.path().join("bob/001.png").exists());
    }
}
