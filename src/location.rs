//! View Locations - Where Template Source Comes From
//!
//! The locator is external. The engine only asks it to locate a view by
//! directory and name, or to enumerate everything it knows.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use crate::error::ContentError;

/// Opens a fresh stream over a view's source text.
pub type ContentReader = Arc<dyn Fn() -> io::Result<Box<dyn Read + Send>> + Send + Sync>;

/// Identity of one resolvable template.
#[derive(Clone)]
pub struct ViewLocation {
    pub location: String,
    pub name: String,
    pub extension: String,
    contents: ContentReader,
}

impl ViewLocation {
    pub fn new(
        location: impl Into<String>,
        name: impl Into<String>,
        extension: impl Into<String>,
        contents: ContentReader,
    ) -> Self {
        Self {
            location: location.into(),
            name: name.into(),
            extension: extension.into(),
            contents,
        }
    }

    /// A location whose source is held in memory.
    pub fn from_source(
        location: impl Into<String>,
        name: impl Into<String>,
        extension: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        let source: Arc<str> = Arc::from(source.into());
        let reader: ContentReader = Arc::new(move || {
            let bytes = source.as_bytes().to_vec();
            Ok(Box::new(Cursor::new(bytes)) as Box<dyn Read + Send>)
        });
        Self::new(location, name, extension, reader)
    }

    /// `location/name`, or just `name` at the root.
    pub fn logical_path(&self) -> String {
        join_path(&self.location, &self.name)
    }

    /// Logical path plus extension, as shown in diagnostics.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.logical_path(), self.extension)
    }

    pub fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        (self.contents)()
    }
}

impl fmt::Debug for ViewLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewLocation")
            .field("location", &self.location)
            .field("name", &self.name)
            .field("extension", &self.extension)
            .finish_non_exhaustive()
    }
}

/// The external content locator.
pub trait ViewLocationProvider: Send + Sync {
    /// Find the view `name` in directory `location`, trying `extensions` in order.
    fn locate(
        &self,
        extensions: &[String],
        location: &str,
        name: &str,
    ) -> Result<Option<ViewLocation>, ContentError>;

    /// Every view with one of `extensions`.
    fn located_views(&self, extensions: &[String]) -> Result<Vec<ViewLocation>, ContentError>;
}

pub(crate) fn join_path(location: &str, name: &str) -> String {
    if location.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", location, name)
    }
}

/// True for a segment naming an entry inside its own directory.
pub(crate) fn is_plain_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(|c: char| c == '/' || c == '\\')
}

/// Splits `a/b/c` into (`a/b`, `c`), ignoring empty segments and backslashes.
pub(crate) fn split_logical_path(path: &str) -> (String, String) {
    let segments: Vec<&str> = path
        .split(|c: char| c == '/' || c == '\\')
        .filter(|s| !s.is_empty())
        .collect();
    match segments.split_last() {
        Some((name, dirs)) => (dirs.join("/"), (*name).to_string()),
        None => (String::new(), String::new()),
    }
}

/// In-memory locator, keyed by `dir/name.ext`.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLocator {
    views: BTreeMap<(String, String, String), Arc<str>>,
}

impl InMemoryLocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `source` under a path such as `home/index.html`.
    pub fn insert(&mut self, path: &str, source: impl Into<String>) {
        let (location, file) = split_logical_path(path);
        let (name, extension) = match file.rsplit_once('.') {
            Some((stem, ext)) => (stem.to_string(), ext.to_string()),
            None => (file, String::new()),
        };
        self.views
            .insert((location, name, extension), Arc::from(source.into()));
    }

    pub fn with(mut self, path: &str, source: impl Into<String>) -> Self {
        self.insert(path, source);
        self
    }

    fn to_location(key: &(String, String, String), source: &Arc<str>) -> ViewLocation {
        ViewLocation::from_source(&*key.0, &*key.1, &*key.2, source.to_string())
    }
}

impl ViewLocationProvider for InMemoryLocator {
    fn locate(
        &self,
        extensions: &[String],
        location: &str,
        name: &str,
    ) -> Result<Option<ViewLocation>, ContentError> {
        for ext in extensions {
            let key = (location.to_string(), name.to_string(), ext.clone());
            if let Some(source) = self.views.get(&key) {
                return Ok(Some(Self::to_location(&key, source)));
            }
        }
        Ok(None)
    }

    fn located_views(&self, extensions: &[String]) -> Result<Vec<ViewLocation>, ContentError> {
        Ok(self
            .views
            .iter()
            .filter(|(key, _)| extensions.iter().any(|e| *e == key.2))
            .map(|(key, source)| Self::to_location(key, source))
            .collect())
    }
}

/// Locator backed by a directory tree.
#[derive(Debug, Clone)]
pub struct DirectoryLocator {
    root: PathBuf,
}

impl DirectoryLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_location(path: PathBuf, location: &str, name: &str, ext: &str) -> ViewLocation {
        let reader: ContentReader = Arc::new(move || {
            let file = fs::File::open(&path)?;
            Ok(Box::new(file) as Box<dyn Read + Send>)
        });
        ViewLocation::new(location, name, ext, reader)
    }
}

impl ViewLocationProvider for DirectoryLocator {
    fn locate(
        &self,
        extensions: &[String],
        location: &str,
        name: &str,
    ) -> Result<Option<ViewLocation>, ContentError> {
        let segments: Vec<&str> = location.split('/').filter(|s| !s.is_empty()).collect();
        // only names that stay under root
        if !is_plain_segment(name) || !segments.iter().all(|s| is_plain_segment(s)) {
            return Ok(None);
        }
        let dir = segments
            .iter()
            .fold(self.root.clone(), |acc, seg| acc.join(seg));

        for ext in extensions {
            let candidate = dir.join(format!("{}.{}", name, ext));
            match fs::metadata(&candidate) {
                Ok(meta) if meta.is_file() => {
                    return Ok(Some(Self::file_location(candidate, location, name, ext)));
                }
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(ContentError::unavailable(join_path(location, name), e));
                }
            }
        }
        Ok(None)
    }

    fn located_views(&self, extensions: &[String]) -> Result<Vec<ViewLocation>, ContentError> {
        let mut views = vec![];
        if !self.root.exists() {
            return Ok(views);
        }

        for entry in WalkDir::new(&self.root).follow_links(true).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                ContentError::unavailable(path, io::Error::new(io::ErrorKind::Other, e))
            })?;
            let path = entry.path();
            if !entry.file_type().is_file() {
                continue;
            }
            let (Some(stem), Some(ext)) = (
                path.file_stem().and_then(|s| s.to_str()),
                path.extension().and_then(|s| s.to_str()),
            ) else {
                continue;
            };
            if !extensions.iter().any(|e| e == ext) {
                continue;
            }

            let location = path
                .parent()
                .and_then(|p| p.strip_prefix(&self.root).ok())
                .map(|rel| {
                    rel.components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect::<Vec<_>>()
                        .join("/")
                })
                .unwrap_or_default();

            views.push(Self::file_location(path.to_path_buf(), &location, stem, ext));
        }

        Ok(views)
    }
}
