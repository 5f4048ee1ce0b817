//! PAGE-XML documents.
//!
//! [`read_page`] loads a PAGE-XML file into a [`PageDocument`], which keeps
//! the source text so [`write_page`] can write it back with only the line
//! text changed.

mod reader;
mod writer;

pub use reader::{PageInfo, parse_page_xml};
pub use writer::{render_page, write_page};

use crate::core::errors::RecResult;
use crate::domain::LayoutDocument;
use crate::utils::resolve_image_path;
use std::path::{Path, PathBuf};

/// A PAGE-XML file together with its parsed layout.
#[derive(Debug, Clone)]
pub struct PageDocument {
    path: PathBuf,
    source: String,
    info: PageInfo,
    layout: LayoutDocument,
}

impl PageDocument {
    /// Parses `source`, read from `path`.
    pub fn parse(path: impl Into<PathBuf>, source: String) -> RecResult<Self> {
        let path = path.into();
        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let (info, layout) = parse_page_xml(&source, &id)?;
        Ok(Self {
            path,
            source,
            info,
            layout,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The XML text the document was read from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn info(&self) -> &PageInfo {
        &self.info
    }

    pub fn layout(&self) -> &LayoutDocument {
        &self.layout
    }

    pub fn layout_mut(&mut self) -> &mut LayoutDocument {
        &mut self.layout
    }

    /// The page image location, resolved relative to the document.
    pub fn image_path(&self) -> Option<PathBuf> {
        self.layout
            .image_ref()
            .map(|reference| resolve_image_path(&self.path, reference))
    }

    /// Writes the document with its current annotations to `out`.
    pub fn write(&self, out: &Path) -> RecResult<()> {
        write_page(&self.source, &self.layout, out)
    }
}

impl AsRef<LayoutDocument> for PageDocument {
    fn as_ref(&self) -> &LayoutDocument {
        &self.layout
    }
}

/// Reads and parses a PAGE-XML file.
pub fn read_page(path: &Path) -> RecResult<PageDocument> {
    let source = std::fs::read_to_string(path)?;
    PageDocument::parse(path, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::RecError;

    #[test]
    fn test_read_page_resolves_image_beside_document() -> RecResult<()> {
        let dir = tempfile::tempdir()?;
        let xml = r#"<PcGts><Page imageFilename="img/scan.png"><TextRegion id="r"><TextLine id="a"><Coords points="0,0 4,0 4,4"/></TextLine></TextRegion></Page></PcGts>"#;
        let path = dir.path().join("page_0001.xml");
        std::fs::write(&path, xml)?;

        let page = read_page(&path)?;
        assert_eq!(page.layout().id(), "page_0001");
        assert_eq!(page.image_path(), Some(dir.path().join("img/scan.png")));
        assert_eq!(page.source(), xml);
        Ok(())
    }

    #[test]
    fn test_missing_file_is_an_io_error() {
        let err = read_page(Path::new("/nonexistent/page.xml")).unwrap_err();
        assert!(matches!(err, RecError::Io(_)));
    }
}
