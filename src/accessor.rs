//! Content Accessor - File-Shaped Access Over the Locator
//!
//! Read-only from the engine's side. Absence is `Ok(None)` or
//! `ContentError::NotFound`, never a hard failure.

use std::io::Read;
use std::sync::Arc;

use crate::error::ContentError;
use crate::location::{is_plain_segment, split_logical_path, ViewLocation, ViewLocationProvider};

#[derive(Clone)]
pub struct ContentAccessor {
    provider: Arc<dyn ViewLocationProvider>,
    extensions: Vec<String>,
}

impl ContentAccessor {
    pub fn new(provider: Arc<dyn ViewLocationProvider>, extensions: Vec<String>) -> Self {
        Self { provider, extensions }
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Strip a supported extension from a caller-supplied name, if present.
    pub fn normalize<'a>(&self, logical_path: &'a str) -> &'a str {
        for ext in &self.extensions {
            if let Some(stem) = logical_path
                .strip_suffix(ext.as_str())
                .and_then(|s| s.strip_suffix('.'))
            {
                return stem;
            }
        }
        logical_path
    }

    pub fn locate(&self, logical_path: &str) -> Result<Option<ViewLocation>, ContentError> {
        let (location, name) = split_logical_path(self.normalize(logical_path));
        // `.` and `..` never name a view
        let plain = is_plain_segment(&name)
            && location.split('/').filter(|s| !s.is_empty()).all(is_plain_segment);
        if !plain {
            return Ok(None);
        }
        self.provider.locate(&self.extensions, &location, &name)
    }

    pub fn exists(&self, logical_path: &str) -> Result<bool, ContentError> {
        Ok(self.locate(logical_path)?.is_some())
    }

    pub fn read(&self, logical_path: &str) -> Result<String, ContentError> {
        let view = self
            .locate(logical_path)?
            .ok_or_else(|| ContentError::NotFound(logical_path.to_string()))?;
        read_source(&view)
    }

    /// Views whose directory is exactly `prefix`.
    pub fn list_under(&self, prefix: &str) -> Result<Vec<ViewLocation>, ContentError> {
        let prefix = prefix.trim_matches('/');
        Ok(self
            .provider
            .located_views(&self.extensions)?
            .into_iter()
            .filter(|v| v.location == prefix)
            .collect())
    }

    pub fn list_all(&self) -> Result<Vec<ViewLocation>, ContentError> {
        self.provider.located_views(&self.extensions)
    }
}

/// Read a location's whole stream as UTF-8 text.
pub fn read_source(view: &ViewLocation) -> Result<String, ContentError> {
    let mut text = String::new();
    view.open()
        .and_then(|mut reader| reader.read_to_string(&mut text))
        .map_err(|e| ContentError::unavailable(view.logical_path(), e))?;
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::InMemoryLocator;

    fn accessor() -> ContentAccessor {
        let locator = InMemoryLocator::new()
            .with("_ViewStart.html", "root")
            .with("home/index.html", "index")
            .with("home/about.html", "about")
            .with("home/deep/page.html", "deep");
        ContentAccessor::new(Arc::new(locator), vec!["html".to_string()])
    }

    #[test]
    fn test_exists_and_read() {
        let acc = accessor();
        assert!(acc.exists("home/index").unwrap());
        assert!(acc.exists("home/index.html").unwrap());
        assert!(!acc.exists("home/missing").unwrap());
        assert_eq!(acc.read("home/about").unwrap(), "about");
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let err = accessor().read("nope").unwrap_err();
        assert!(matches!(err, ContentError::NotFound(p) if p == "nope"));
    }

    #[test]
    fn test_relative_segments_are_absent() {
        let acc = accessor();
        assert!(!acc.exists("../home/index").unwrap());
        assert!(!acc.exists("home/../home/index").unwrap());
        assert!(!acc.exists("./home/index").unwrap());
        assert!(!acc.exists("home/..").unwrap());
        let err = acc.read("../secret").unwrap_err();
        assert!(matches!(err, ContentError::NotFound(p) if p == "../secret"));
    }

    #[test]
    fn test_list_under_is_one_level() {
        let acc = accessor();
        let mut names: Vec<_> = acc
            .list_under("home")
            .unwrap()
            .iter()
            .map(|v| v.name.clone())
            .collect();
        names.sort();
        assert_eq!(names, vec!["about", "index"]);
        assert_eq!(acc.list_under("").unwrap().len(), 1);
        assert_eq!(acc.list_all().unwrap().len(), 4);
    }
}
