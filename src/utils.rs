//! Utility functions for building the image working set.

use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use crate::error::{AnnotatorError, Result};
use crate::state::{AnnotationStore, ImageKey};

/// Extensions of image files picked up from the images directory.
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "bmp", "png"];

/// Separator between folder and file name in review image names.
pub const FOLDER_SEPARATOR: char = '#';

/// Image file names in `dir`, naturally sorted.
pub fn list_images(dir: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(dir).map_err(|e| AnnotatorError::io(dir, e))?;

    let mut names = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()));
        if is_image {
            if let Some(name) = path.file_name() {
                names.push(name.to_string_lossy().to_string());
            }
        }
    }

    names.sort_by(|a, b| natural_cmp(a, b));
    Ok(names)
}

/// Compare strings with digit runs ordered by numeric value, so
/// `img2.jpg` sorts before `img10.jpg`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = Chunks { rest: a };
    let mut right = Chunks { rest: b };
    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = compare_chunk(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn compare_chunk(x: &str, y: &str) -> Ordering {
    let numeric = |s: &str| s.starts_with(|c: char| c.is_ascii_digit());
    if numeric(x) && numeric(y) {
        let x = x.trim_start_matches('0');
        let y = y.trim_start_matches('0');
        x.len().cmp(&y.len()).then_with(|| x.cmp(y))
    } else {
        x.cmp(y)
    }
}

/// Alternating runs of digits and non-digits.
struct Chunks<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let first = self.rest.chars().next()?;
        let digit = first.is_ascii_digit();
        let end = self
            .rest
            .find(|c: char| c.is_ascii_digit() != digit)
            .unwrap_or(self.rest.len());
        let (chunk, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(chunk)
    }
}

/// Map a review image name to its bucket.
///
/// `<folder>#<file_name>` names the folder explicitly (the file name is the
/// part after the last `#`). A plain name is only accepted when exactly one
/// folder is loaded.
pub fn resolve_image(name: &str, store: &AnnotationStore) -> Option<ImageKey> {
    match name.rsplit_once(FOLDER_SEPARATOR) {
        Some((prefix, file_name)) => {
            let folder = prefix.rsplit(FOLDER_SEPARATOR).next().unwrap_or(prefix);
            store
                .folder(folder)
                .map(|_| ImageKey::new(folder, file_name))
        }
        None => {
            let mut folders = store.folders().keys();
            match (folders.next(), folders.next()) {
                (Some(only), None) => Some(ImageKey::new(only.clone(), name)),
                _ => None,
            }
        }
    }
}

/// Resolve every listed image, skipping the ones no loaded folder claims.
pub fn working_set(names: &[String], store: &AnnotationStore) -> Vec<ImageKey> {
    let mut keys = Vec::with_capacity(names.len());
    for name in names {
        match resolve_image(name, store) {
            Some(key) => {
                let known = store
                    .folder(&key.folder)
                    .is_some_and(|f| f.buckets.contains_key(&key.file_name));
                if !known {
                    tracing::warn!(image = %name, "Image has no entry in its annotations document");
                }
                keys.push(key);
            }
            None => tracing::warn!(image = %name, "No loaded folder for image, skipping"),
        }
    }
    keys
}
