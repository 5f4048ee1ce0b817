//! PAGE-XML output.
//!
//! The source document is streamed event by event. Only lines whose
//! annotation differs from the source get a new `TextEquiv`; everything else
//! is copied as read.

use super::reader::{attribute, parse_page_xml};
use crate::core::errors::RecResult;
use crate::domain::{LayoutDocument, LineId, TextAnnotation};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Elements that follow `TextEquiv` inside a `TextLine`.
const AFTER_TEXT_EQUIV: [&[u8]; 3] = [b"TextStyle", b"UserDefined", b"Labels"];

struct OpenLine {
    depth: usize,
    prefix: Option<String>,
    annotation: TextAnnotation,
    written: bool,
}

impl OpenLine {
    fn qualified(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}:{name}"),
            None => name.to_string(),
        }
    }

    fn write_text_equiv(&mut self, writer: &mut Writer<Vec<u8>>) -> RecResult<()> {
        if self.written {
            return Ok(());
        }
        let equiv_name = self.qualified("TextEquiv");
        let unicode_name = self.qualified("Unicode");
        let mut equiv = BytesStart::new(equiv_name.as_str());
        let conf = self.annotation.confidence.map(|c| format!("{c:.4}"));
        if let Some(conf) = &conf {
            equiv.push_attribute(("conf", conf.as_str()));
        }
        writer.write_event(Event::Start(equiv))?;
        writer.write_event(Event::Start(BytesStart::new(unicode_name.as_str())))?;
        writer.write_event(Event::Text(BytesText::new(&self.annotation.text)))?;
        writer.write_event(Event::End(BytesEnd::new(unicode_name.as_str())))?;
        writer.write_event(Event::End(BytesEnd::new(equiv_name.as_str())))?;
        self.written = true;
        Ok(())
    }
}

/// Lines of `doc` whose annotation is new or differs from `source_xml`.
fn changed_lines(
    source_xml: &str,
    doc: &LayoutDocument,
) -> RecResult<HashMap<LineId, TextAnnotation>> {
    let (_, original) = parse_page_xml(source_xml, doc.id())?;
    Ok(doc
        .lines()
        .filter_map(|(_, line)| {
            let annotation = line.annotation()?;
            let before = original.line(line.id()).and_then(|l| l.annotation());
            (before != Some(annotation)).then(|| (line.id().clone(), annotation.clone()))
        })
        .collect())
}

fn open_line(
    e: &BytesStart<'_>,
    depth: usize,
    changed: &mut HashMap<LineId, TextAnnotation>,
) -> RecResult<Option<OpenLine>> {
    let Some(id) = attribute(e, b"id")? else {
        return Ok(None);
    };
    Ok(changed.remove(&LineId::new(id)).map(|annotation| OpenLine {
        depth,
        prefix: e
            .name()
            .prefix()
            .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned()),
        annotation,
        written: false,
    }))
}

/// Renders `source_xml` with the annotations of `doc` applied.
pub fn render_page(source_xml: &str, doc: &LayoutDocument) -> RecResult<String> {
    let mut changed = changed_lines(source_xml, doc)?;
    let updated = changed.len();

    let mut reader = Reader::from_str(source_xml);
    let mut writer = Writer::new(Vec::with_capacity(source_xml.len() + 256));
    let mut depth = 0usize;
    let mut line: Option<OpenLine> = None;
    let mut skip_to: Option<usize> = None;

    loop {
        let event = reader.read_event()?;
        if let Some(target) = skip_to {
            match event {
                Event::Start(_) => depth += 1,
                Event::End(_) => {
                    depth -= 1;
                    if depth == target {
                        skip_to = None;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            continue;
        }

        match &event {
            Event::Start(e) => {
                let local = e.local_name();
                let name = local.as_ref();
                let element_depth = depth;
                depth += 1;
                if name == b"TextLine" && line.is_none() {
                    line = open_line(e, element_depth, &mut changed)?;
                } else if let Some(open) = line.as_mut()
                    && element_depth == open.depth + 1
                {
                    if name == b"TextEquiv" {
                        open.write_text_equiv(&mut writer)?;
                        skip_to = Some(element_depth);
                        continue;
                    }
                    if AFTER_TEXT_EQUIV.contains(&name) {
                        open.write_text_equiv(&mut writer)?;
                    }
                }
                writer.write_event(&event)?;
            }
            Event::Empty(e) => {
                let local = e.local_name();
                let name = local.as_ref();
                if name == b"TextLine" && line.is_none() {
                    if let Some(mut open) = open_line(e, depth, &mut changed)? {
                        let qname = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                        writer.write_event(Event::Start(e.clone()))?;
                        open.write_text_equiv(&mut writer)?;
                        writer.write_event(Event::End(BytesEnd::new(qname)))?;
                        continue;
                    }
                } else if let Some(open) = line.as_mut()
                    && depth == open.depth + 1
                {
                    if name == b"TextEquiv" {
                        open.write_text_equiv(&mut writer)?;
                        continue;
                    }
                    if AFTER_TEXT_EQUIV.contains(&name) {
                        open.write_text_equiv(&mut writer)?;
                    }
                }
                writer.write_event(&event)?;
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                if e.local_name().as_ref() == b"TextLine"
                    && let Some(mut open) = line.take_if(|open| open.depth == depth)
                {
                    open.write_text_equiv(&mut writer)?;
                }
                writer.write_event(&event)?;
            }
            Event::Eof => break,
            _ => writer.write_event(&event)?,
        }
    }

    debug!("rewrote {} line annotations in '{}'", updated, doc.id());
    Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
}

/// Writes `source_xml` with the annotations of `doc` applied to `out`.
pub fn write_page(source_xml: &str, doc: &LayoutDocument, out: &Path) -> RecResult<()> {
    let rendered = render_page(source_xml, doc)?;
    std::fs::write(out, rendered)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RecognitionResult;
    use crate::pipeline::ResultWriter;

    const PAGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<pc:PcGts xmlns:pc="http://schema.primaresearch.org/PAGE/gts/pagecontent/2019-07-15">
  <!-- kept -->
  <pc:Page imageFilename="scan.png">
    <pc:TextRegion id="r1">
      <pc:TextLine id="l1" custom="x">
        <pc:Coords points="0,0 10,0 10,5 0,5"/>
        <pc:TextEquiv index="1"><pc:Unicode>old</pc:Unicode></pc:TextEquiv>
        <pc:TextEquiv index="2"><pc:Unicode>alternative</pc:Unicode></pc:TextEquiv>
        <pc:TextStyle fontSize="10"/>
      </pc:TextLine>
      <pc:TextLine id="l2">
        <pc:Coords points="0,10 10,10 10,15 0,15"/>
        <pc:TextStyle fontSize="10"/>
      </pc:TextLine>
      <pc:TextLine id="l3"><pc:Coords points="0,20 10,20 10,25 0,25"/><pc:TextEquiv><pc:Unicode>keep me</pc:Unicode></pc:TextEquiv></pc:TextLine>
      <pc:TextLine id="l4"/>
    </pc:TextRegion>
  </pc:Page>
</pc:PcGts>"#;

    fn updated(results: Vec<(&str, &str, Option<f32>)>) -> LayoutDocument {
        let (_, mut doc) = parse_page_xml(PAGE, "page").unwrap();
        ResultWriter::apply(
            &mut doc,
            results
                .into_iter()
                .map(|(id, text, conf)| RecognitionResult::new(LineId::new(id), text, conf)),
        );
        doc
    }

    #[test]
    fn test_unchanged_document_is_copied_verbatim() -> RecResult<()> {
        let (_, doc) = parse_page_xml(PAGE, "page")?;
        assert_eq!(render_page(PAGE, &doc)?, PAGE);
        Ok(())
    }

    #[test]
    fn test_replaces_all_direct_text_equivs() -> RecResult<()> {
        let doc = updated(vec![("l1", "new & better", Some(0.5))]);
        let xml = render_page(PAGE, &doc)?;
        assert!(xml.contains(
            r#"<pc:TextEquiv conf="0.5000"><pc:Unicode>new &amp; better</pc:Unicode></pc:TextEquiv>"#
        ));
        assert!(!xml.contains("alternative"));
        assert!(!xml.contains(">old<"));
        assert!(xml.contains(r#"custom="x""#));
        assert!(xml.contains("<!-- kept -->"));
        assert!(xml.contains("keep me"));

        let (_, reread) = parse_page_xml(&xml, "page")?;
        let annotation = reread.line(&LineId::new("l1")).unwrap().annotation().unwrap();
        assert_eq!(annotation.text, "new & better");
        assert_eq!(annotation.confidence, Some(0.5));
        Ok(())
    }

    #[test]
    fn test_inserts_before_text_style_and_expands_empty_lines() -> RecResult<()> {
        let doc = updated(vec![("l2", "second", None), ("l4", "fourth", Some(1.0))]);
        let xml = render_page(PAGE, &doc)?;
        let equiv = xml
            .find("<pc:TextEquiv><pc:Unicode>second")
            .expect("l2 text inserted");
        let style = xml[equiv..].find("<pc:TextStyle").expect("style kept");
        assert!(style > 0);
        assert!(xml.contains(
            r#"<pc:TextLine id="l4"><pc:TextEquiv conf="1.0000"><pc:Unicode>fourth</pc:Unicode></pc:TextEquiv></pc:TextLine>"#
        ));

        let (_, reread) = parse_page_xml(&xml, "page")?;
        assert_eq!(
            reread.line(&LineId::new("l3")).unwrap().annotation().unwrap().text,
            "keep me"
        );
        Ok(())
    }
}
