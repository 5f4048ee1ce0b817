//! PAGE-XML parsing.

use crate::core::errors::{RecError, RecResult};
use crate::domain::{LayoutDocument, Region, TextAnnotation, TextLine};
use crate::processors::{Point, Polygon};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, warn};

/// Attributes of the `Page` element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageInfo {
    pub image_filename: Option<String>,
    pub image_width: Option<u32>,
    pub image_height: Option<u32>,
}

/// Returns the value of the attribute with local name `name`.
pub(crate) fn attribute(e: &BytesStart<'_>, name: &[u8]) -> RecResult<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

struct LineBuilder {
    id: String,
    depth: usize,
    outline: Option<Polygon>,
    points: Vec<Point>,
    text: Option<String>,
    confidence: Option<f32>,
    equiv_seen: bool,
}

impl LineBuilder {
    fn finish(self) -> TextLine {
        let outline = self.outline.unwrap_or_else(|| Polygon::new(self.points));
        let line = TextLine::new(self.id, outline);
        match self.text {
            Some(text) => line.with_annotation(TextAnnotation::new(text, self.confidence)),
            None => line,
        }
    }
}

#[derive(Default)]
struct PageParser {
    page: Option<PageInfo>,
    regions: Vec<(String, Vec<TextLine>)>,
    open_regions: Vec<(usize, usize)>,
    line: Option<LineBuilder>,
    equiv_depth: Option<usize>,
    unicode_depth: Option<usize>,
}

impl PageParser {
    fn open(&mut self, e: &BytesStart<'_>, depth: usize) -> RecResult<()> {
        match e.local_name().as_ref() {
            b"Page" => {
                self.page = Some(PageInfo {
                    image_filename: attribute(e, b"imageFilename")?,
                    image_width: attribute(e, b"imageWidth")?.and_then(|v| v.parse().ok()),
                    image_height: attribute(e, b"imageHeight")?.and_then(|v| v.parse().ok()),
                });
            }
            b"TextRegion" => {
                let id = attribute(e, b"id")?
                    .ok_or_else(|| RecError::malformed_document("TextRegion without id"))?;
                self.regions.push((id, Vec::new()));
                self.open_regions.push((self.regions.len() - 1, depth));
            }
            b"TextLine" => {
                if self.open_regions.is_empty() {
                    return Err(RecError::malformed_document(
                        "TextLine outside of a TextRegion",
                    ));
                }
                let id = attribute(e, b"id")?
                    .ok_or_else(|| RecError::malformed_document("TextLine without id"))?;
                self.line = Some(LineBuilder {
                    id,
                    depth,
                    outline: None,
                    points: Vec::new(),
                    text: None,
                    confidence: None,
                    equiv_seen: false,
                });
            }
            b"Coords" => {
                if let Some(line) = self.line.as_mut()
                    && depth == line.depth + 1
                    && let Some(points) = attribute(e, b"points")?
                {
                    let outline = Polygon::parse_points(&points).map_err(|reason| {
                        RecError::malformed_document(format!(
                            "line '{}' has unparsable coordinates: {reason}",
                            line.id
                        ))
                    })?;
                    line.outline = Some(outline);
                }
            }
            b"Point" => {
                // Older PAGE versions list outline vertices as Point children of Coords.
                if let Some(line) = self.line.as_mut()
                    && depth == line.depth + 2
                {
                    let coord = |name: &[u8]| -> RecResult<f32> {
                        attribute(e, name)?
                            .and_then(|v| v.trim().parse().ok())
                            .ok_or_else(|| {
                                RecError::malformed_document(format!(
                                    "line '{}' has an invalid Point",
                                    line.id
                                ))
                            })
                    };
                    let point = Point::new(coord(&b"x"[..])?, coord(&b"y"[..])?);
                    line.points.push(point);
                }
            }
            b"TextEquiv" => {
                if let Some(line) = self.line.as_mut()
                    && depth == line.depth + 1
                    && !line.equiv_seen
                {
                    line.equiv_seen = true;
                    line.confidence = match attribute(e, b"conf")? {
                        Some(conf) => match conf.trim().parse::<f32>() {
                            Ok(value) => Some(value),
                            Err(_) => {
                                warn!("ignoring invalid conf '{}' on line '{}'", conf, line.id);
                                None
                            }
                        },
                        None => None,
                    };
                    self.equiv_depth = Some(depth);
                }
            }
            b"Unicode" => {
                if let Some(equiv) = self.equiv_depth
                    && depth == equiv + 1
                    && let Some(line) = self.line.as_mut()
                {
                    line.text.get_or_insert_with(String::new);
                    self.unicode_depth = Some(depth);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        if self.unicode_depth.is_some()
            && let Some(line) = self.line.as_mut()
        {
            line.text.get_or_insert_with(String::new).push_str(text);
        }
    }

    fn close(&mut self, local_name: &[u8], depth: usize) {
        match local_name {
            b"Unicode" if self.unicode_depth == Some(depth) => self.unicode_depth = None,
            b"TextEquiv" if self.equiv_depth == Some(depth) => self.equiv_depth = None,
            b"TextLine" => {
                if let Some(line) = self.line.take_if(|line| line.depth == depth)
                    && let Some(&(region, _)) = self.open_regions.last()
                {
                    self.regions[region].1.push(line.finish());
                }
            }
            b"TextRegion" => {
                if self.open_regions.last().is_some_and(|&(_, d)| d == depth) {
                    self.open_regions.pop();
                }
            }
            _ => {}
        }
    }
}

/// Parses PAGE-XML into page attributes and a layout document named `id`.
///
/// Regions are listed in document order, nested regions included. Only the
/// first `TextEquiv` directly under each `TextLine` is read.
pub fn parse_page_xml(xml: &str, id: &str) -> RecResult<(PageInfo, LayoutDocument)> {
    let mut reader = Reader::from_str(xml);
    let mut parser = PageParser::default();
    let mut depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                parser.open(&e, depth)?;
                depth += 1;
            }
            Event::Empty(e) => {
                parser.open(&e, depth)?;
                parser.close(e.local_name().as_ref(), depth);
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                parser.close(e.local_name().as_ref(), depth);
            }
            Event::Text(e) => parser.text(&e.unescape()?),
            Event::CData(e) => parser.text(&String::from_utf8_lossy(&e.into_inner())),
            Event::Eof => break,
            _ => {}
        }
    }

    let page = parser
        .page
        .ok_or_else(|| RecError::malformed_document("document has no Page element"))?;
    let regions: Vec<Region> = parser
        .regions
        .into_iter()
        .map(|(id, lines)| Region::new(id, lines))
        .collect();
    let mut document = LayoutDocument::new(id, regions)
        .map_err(|dup| RecError::malformed_document(format!("duplicate line id '{dup}'")))?;
    if let Some(filename) = &page.image_filename {
        document = document.with_image_ref(filename);
    }
    debug!(
        "parsed '{}': {} regions, {} lines",
        id,
        document.regions().len(),
        document.line_count()
    );
    Ok((page, document))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LineId;

    const PAGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<PcGts xmlns="http://schema.primaresearch.org/PAGE/gts/pagecontent/2019-07-15">
  <Page imageFilename="scan.png" imageWidth="800" imageHeight="600">
    <TextRegion id="r1">
      <Coords points="0,0 800,0 800,300 0,300"/>
      <TextLine id="l1">
        <Coords points="10,10 400,10 400,40 10,40"/>
        <Word id="w1"><TextEquiv><Unicode>word</Unicode></TextEquiv></Word>
        <TextEquiv conf="0.75"><Unicode>Hello &amp; world</Unicode></TextEquiv>
      </TextLine>
      <TextRegion id="r1.1">
        <TextLine id="l2"><Coords points="10,50 400,50 400,80 10,80"/></TextLine>
      </TextRegion>
      <TextLine id="l3"><Coords><Point x="1" y="1"/><Point x="9" y="1"/><Point x="9" y="5"/></Coords></TextLine>
      <TextEquiv><Unicode>region text</Unicode></TextEquiv>
    </TextRegion>
  </Page>
</PcGts>"#;

    #[test]
    fn test_parses_regions_lines_and_text() -> RecResult<()> {
        let (page, doc) = parse_page_xml(PAGE, "page")?;
        assert_eq!(page.image_filename.as_deref(), Some("scan.png"));
        assert_eq!(page.image_width, Some(800));
        assert_eq!(doc.image_ref().and_then(|p| p.to_str()), Some("scan.png"));

        let region_ids: Vec<&str> = doc.regions().iter().map(|r| r.id().as_str()).collect();
        assert_eq!(region_ids, vec!["r1", "r1.1"]);
        let line_ids: Vec<&str> = doc.lines().map(|(_, l)| l.id().as_str()).collect();
        assert_eq!(line_ids, vec!["l1", "l3", "l2"]);

        let l1 = doc.line(&LineId::new("l1")).unwrap();
        let annotation = l1.annotation().unwrap();
        assert_eq!(annotation.text, "Hello & world");
        assert_eq!(annotation.confidence, Some(0.75));
        assert_eq!(l1.outline().len(), 4);

        assert!(doc.line(&LineId::new("l2")).unwrap().annotation().is_none());
        assert_eq!(doc.line(&LineId::new("l3")).unwrap().outline().len(), 3);
        Ok(())
    }

    #[test]
    fn test_prefixed_namespace() -> RecResult<()> {
        let xml = r#"<pc:PcGts xmlns:pc="http://schema.primaresearch.org/PAGE/gts/pagecontent/2019-07-15"><pc:Page imageFilename="a.png"><pc:TextRegion id="r"><pc:TextLine id="x"><pc:Coords points="0,0 5,0 5,5"/></pc:TextLine></pc:TextRegion></pc:Page></pc:PcGts>"#;
        let (_, doc) = parse_page_xml(xml, "p")?;
        assert_eq!(doc.line_count(), 1);
        Ok(())
    }

    #[test]
    fn test_malformed_documents() {
        let no_page = r#"<PcGts><Metadata/></PcGts>"#;
        assert!(matches!(
            parse_page_xml(no_page, "p"),
            Err(RecError::MalformedDocument { .. })
        ));

        let duplicate = r#"<PcGts><Page><TextRegion id="r"><TextLine id="a"/><TextLine id="a"/></TextRegion></Page></PcGts>"#;
        assert!(matches!(
            parse_page_xml(duplicate, "p"),
            Err(RecError::MalformedDocument { .. })
        ));

        let bad_points = r#"<PcGts><Page><TextRegion id="r"><TextLine id="a"><Coords points="1,2 x,4"/></TextLine></TextRegion></Page></PcGts>"#;
        assert!(matches!(
            parse_page_xml(bad_points, "p"),
            Err(RecError::MalformedDocument { .. })
        ));

        let missing_id = r#"<PcGts><Page><TextRegion id="r"><TextLine/></TextRegion></Page></PcGts>"#;
        assert!(parse_page_xml(missing_id, "p").is_err());
    }

    #[test]
    fn test_line_without_coords_is_kept_with_empty_outline() -> RecResult<()> {
        let xml = r#"<PcGts><Page><TextRegion id="r"><TextLine id="a"/></TextRegion></Page></PcGts>"#;
        let (_, doc) = parse_page_xml(xml, "p")?;
        let line = doc.line(&LineId::new("a")).unwrap();
        assert!(line.outline().is_empty());
        assert!(!line.outline().is_valid());
        Ok(())
    }
}
