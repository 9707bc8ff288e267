//! Destination naming: page renaming, folder derivation and natural ordering.
//!
//! Everything in here is a pure function of the destination root, the item's
//! own names and its position, so callers can resolve a [`Destination`] once
//! per submission and reuse it for the whole batch.

use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::Chars;
use std::sync::LazyLock;

use regex::Regex;

use crate::config::NamingConfig;

static IMAGE_EXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\.(jpg|jpeg|png|webp|gif)$").expect("image extension pattern is valid")
});

const DEFAULT_PAGE_EXTENSION: &str = "jpg";

/// Returns true if the name ends in one of the supported image extensions.
pub fn is_image_name(name: &str) -> bool {
    IMAGE_EXT_RE.is_match(name)
}

/// Numeric-aware, case-insensitive comparison (`page2` < `page10`).
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        let (l, r) = match (left.peek(), right.peek()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(&l), Some(&r)) => (l, r),
        };

        let ord = if l.is_ascii_digit() && r.is_ascii_digit() {
            let l_digits = take_digits(&mut left);
            let r_digits = take_digits(&mut right);
            compare_digit_runs(&l_digits, &r_digits)
        } else {
            left.next();
            right.next();
            l.to_lowercase().cmp(r.to_lowercase())
        };

        if ord != Ordering::Equal {
            return ord;
        }
    }
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.next_if(|c| c.is_ascii_digit()) {
        digits.push(c);
    }
    digits
}

fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Stable natural sort over any slice, keyed by a name.
pub fn natural_sort_by_key<T, F>(items: &mut [T], key: F)
where
    F: Fn(&T) -> &str,
{
    items.sort_by(|a, b| natural_cmp(key(a), key(b)));
}

/// Lower-cased extension of a name, if it has one.
pub fn extension_of(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() || ext.contains('/') {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Strips the last extension: `Vol1.cbz` -> `Vol1`.
pub fn strip_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() && !ext.contains('/') => stem,
        _ => name,
    }
}

/// `page_{index:03}_{suffix}.{ext}` with a 1-based index.
pub fn page_name(index: usize, extension: Option<&str>, locale_suffix: &str) -> String {
    let ext = extension
        .filter(|e| !e.is_empty())
        .map(|e| e.to_lowercase())
        .unwrap_or_else(|| DEFAULT_PAGE_EXTENSION.to_string());
    format!("page_{:03}_{}.{}", index, locale_suffix, ext)
}

/// Joins two path fragments with exactly one `/` between them.
pub fn join_path(root: &str, segment: &str) -> String {
    let root = root.trim_end_matches('/');
    let segment = segment.trim_start_matches('/');
    match (root.is_empty(), segment.is_empty()) {
        (true, _) => segment.to_string(),
        (false, true) => root.to_string(),
        (false, false) => format!("{}/{}", root, segment),
    }
}

/// How uploaded items are renamed under a destination root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingPolicy {
    /// Images become sequential pages; archives are unpacked.
    Paged,
    /// Names and relative folders are kept as they are.
    Generic,
}

impl NamingPolicy {
    pub fn select(root: &str, naming: &NamingConfig) -> Self {
        if root.starts_with(&naming.paged_prefix) {
            NamingPolicy::Paged
        } else {
            NamingPolicy::Generic
        }
    }
}

/// Final stored name and folder for one uploaded item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub filename: String,
    pub folder_path: String,
}

/// A destination root captured at submission time together with its policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    root: String,
    policy: NamingPolicy,
    locale_suffix: String,
}

impl Destination {
    pub fn resolve(root: impl Into<String>, naming: &NamingConfig) -> Self {
        let root = root.into();
        let policy = NamingPolicy::select(&root, naming);
        Self {
            root,
            policy,
            locale_suffix: naming.locale_suffix.clone(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn policy(&self) -> NamingPolicy {
        self.policy
    }

    pub fn is_paged(&self) -> bool {
        self.policy == NamingPolicy::Paged
    }

    /// Folder for a single file uploaded with its original name.
    pub fn single_file_folder(&self) -> String {
        join_path(&self.root, "")
    }

    /// Folder that receives the pages of an archive: `<root>/<archive stem>`.
    pub fn archive_folder(&self, archive_name: &str) -> String {
        join_path(&self.root, strip_extension(archive_name))
    }

    /// Page name for the `index`-th (1-based) decoded image.
    pub fn page_name(&self, index: usize, extension: Option<&str>) -> String {
        page_name(index, extension, &self.locale_suffix)
    }

    /// Target for the `index`-th (1-based) file of a folder batch.
    pub fn batch_target(&self, index: usize, file_name: &str, relative_path: &str) -> Target {
        match self.policy {
            NamingPolicy::Paged => {
                let folder = relative_path
                    .rsplit_once('/')
                    .map(|(dir, _)| dir)
                    .unwrap_or("");
                let filename = if is_image_name(file_name) {
                    self.page_name(index, extension_of(file_name).as_deref())
                } else {
                    file_name.to_string()
                };
                Target {
                    filename,
                    folder_path: join_path(&self.root, folder),
                }
            }
            NamingPolicy::Generic => {
                let full = join_path(&self.root, relative_path);
                let folder_path = full
                    .rsplit_once('/')
                    .map(|(dir, _)| dir.to_string())
                    .unwrap_or_default();
                Target {
                    filename: file_name.to_string(),
                    folder_path,
                }
            }
        }
    }
}
