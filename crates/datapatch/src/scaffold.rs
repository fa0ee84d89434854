//! Patch file scaffolding: naming convention, sequence allocation, and
//! the unit template.
//!
//! Generated files are named `{YYYY_MM_DD}_{seq:06}_{token}.rs` where
//! the sequence continues from the highest one already used today in
//! the patch root. The template defines a struct named by the
//! StudlyCase of the token, implementing [`crate::Patch`] with empty
//! `up`/`down` bodies.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::error::PatchError;
use crate::units::UNIT_EXTENSION;

/// Creates a new patch unit file for `name` in the patch root,
/// returning the path written.
///
/// `name` is normalized to a lowercase snake token. Fails with
/// [`PatchError::ScaffoldCollision`] if the generated filename already
/// exists; concurrent invocations racing on the same sequence are not
/// guarded.
pub fn create_patch(root: &Path, name: &str) -> Result<PathBuf, PatchError> {
    fs::create_dir_all(root)?;

    let token = snake_case(name);
    let date = Local::now().format("%Y_%m_%d").to_string();
    let sequence = last_sequence(root, &date)? + 1;
    let stem = format!("{date}_{sequence:06}_{token}");
    let path = root.join(format!("{stem}.{UNIT_EXTENSION}"));

    if path.exists() {
        return Err(PatchError::ScaffoldCollision { path });
    }

    fs::write(&path, template(&class_name_for(&stem)))?;
    tracing::info!(file = %path.display(), "created patch");

    Ok(path)
}

/// Derives the unit struct name from a file stem: the date+sequence
/// prefix is stripped, the remainder StudlyCased.
pub fn class_name_for(file_stem: &str) -> String {
    studly_case(strip_date_prefix(file_stem))
}

/// Highest sequence among today's files in the root (top level only),
/// or 0 if none.
fn last_sequence(root: &Path, date: &str) -> Result<u32, PatchError> {
    let mut last = 0;
    for entry in fs::read_dir(root)? {
        let name = entry?.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(sequence) = sequence_of(name, date) {
            last = last.max(sequence);
        }
    }
    Ok(last)
}

/// Parses the 6-digit sequence out of `{date}_{seq:06}_...`, if the
/// name matches that shape for the given date.
fn sequence_of(file_name: &str, date: &str) -> Option<u32> {
    let rest = file_name.strip_prefix(date)?.strip_prefix('_')?;
    let bytes = rest.as_bytes();
    if bytes.len() < 7 || bytes[6] != b'_' {
        return None;
    }
    if !bytes[..6].iter().all(|b| b.is_ascii_digit()) {
        return None;
    }
    rest[..6].parse().ok()
}

/// Strips a leading `YYYY_MM_DD_NNNNNN_` prefix if present.
fn strip_date_prefix(stem: &str) -> &str {
    let bytes = stem.as_bytes();
    let digits = |range: std::ops::Range<usize>| bytes[range].iter().all(|b| b.is_ascii_digit());
    let shaped = bytes.len() > 18
        && digits(0..4)
        && bytes[4] == b'_'
        && digits(5..7)
        && bytes[7] == b'_'
        && digits(8..10)
        && bytes[10] == b'_'
        && digits(11..17)
        && bytes[17] == b'_';
    if shaped {
        &stem[18..]
    } else {
        stem
    }
}

/// Normalizes a human name to a lowercase snake token: alphanumerics
/// kept, camel boundaries and separator runs become single underscores.
fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_lower = false;
    for ch in name.trim().chars() {
        if ch.is_alphanumeric() {
            if ch.is_uppercase() && prev_lower {
                out.push('_');
            }
            for low in ch.to_lowercase() {
                out.push(low);
            }
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
            prev_lower = false;
        }
    }
    out.trim_end_matches('_').to_string()
}

/// Converts a snake token to StudlyCase.
fn studly_case(token: &str) -> String {
    token
        .split(['_', ' ', '-'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// The generated unit source.
fn template(class_name: &str) -> String {
    format!(
        r#"use datapatch::{{Patch, PatchResult}};
use rusqlite::Connection;

pub struct {class_name};

impl Patch for {class_name} {{
    /// Apply the data patch.
    fn up(&self, _conn: &Connection) -> PatchResult {{
        Ok(())
    }}

    /// Revert the data patch.
    fn down(&self, _conn: &Connection) -> PatchResult {{
        Ok(())
    }}
}}
"#
    )
}
