// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Minimal hOCR writer for layouts that do not come from tesseract: DICOM
// pages (no text geometry at all) and the in-process OCR engine.

use std::io::Cursor;

use papyrus_core::error::{PapyrusError, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

const XHTML_DOCTYPE: &str = concat!(
    "html PUBLIC \"-//W3C//DTD XHTML 1.0 Transitional//EN\" ",
    "\"http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd\""
);

/// A recognised line with its pixel bounding box `(x0, y0, x1, y1)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HocrLine {
    pub text: String,
    pub bbox: (u32, u32, u32, u32),
}

/// A valid hOCR document with one page area and no text.
pub fn empty_document(width: u32, height: u32) -> Result<String> {
    document(width, height, &[])
}

/// An hOCR document with one `ocr_line` per entry.
pub fn document(width: u32, height: u32, lines: &[HocrLine]) -> Result<String> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 1);
    write_document(&mut writer, width, height, lines).map_err(xml_error)?;

    String::from_utf8(writer.into_inner().into_inner())
        .map_err(|err| PapyrusError::ExtractionFailure(format!("hOCR is not UTF-8: {err}")))
}

fn write_document(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    width: u32,
    height: u32,
    lines: &[HocrLine],
) -> quick_xml::Result<()> {
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::DocType(BytesText::from_escaped(XHTML_DOCTYPE)))?;

    let mut html = BytesStart::new("html");
    html.push_attribute(("xmlns", "http://www.w3.org/1999/xhtml"));
    html.push_attribute(("xml:lang", "en"));
    html.push_attribute(("lang", "en"));
    writer.write_event(Event::Start(html))?;

    writer.write_event(Event::Start(BytesStart::new("head")))?;
    writer.write_event(Event::Start(BytesStart::new("title")))?;
    writer.write_event(Event::End(BytesEnd::new("title")))?;
    let mut content_type = BytesStart::new("meta");
    content_type.push_attribute(("http-equiv", "Content-Type"));
    content_type.push_attribute(("content", "text/html;charset=utf-8"));
    writer.write_event(Event::Empty(content_type))?;
    write_meta(writer, "ocr-system", "papyrus")?;
    write_meta(
        writer,
        "ocr-capabilities",
        "ocr_page ocr_carea ocr_par ocr_line",
    )?;
    writer.write_event(Event::End(BytesEnd::new("head")))?;

    writer.write_event(Event::Start(BytesStart::new("body")))?;
    let page_box = bbox(0, 0, width, height);
    writer.write_event(Event::Start(element("div", "ocr_page", "page_1", &page_box)))?;
    if !lines.is_empty() {
        writer.write_event(Event::Start(element(
            "div",
            "ocr_carea",
            "block_1_1",
            &page_box,
        )))?;
        let mut par = BytesStart::new("p");
        par.push_attribute(("class", "ocr_par"));
        par.push_attribute(("id", "par_1_1"));
        writer.write_event(Event::Start(par))?;

        for (index, line) in lines.iter().enumerate() {
            let (x0, y0, x1, y1) = line.bbox;
            let id = format!("line_1_{}", index + 1);
            writer.write_event(Event::Start(element(
                "span",
                "ocr_line",
                &id,
                &bbox(x0, y0, x1, y1),
            )))?;
            writer.write_event(Event::Text(BytesText::new(&line.text)))?;
            writer.write_event(Event::End(BytesEnd::new("span")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("p")))?;
        writer.write_event(Event::End(BytesEnd::new("div")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("div")))?;
    writer.write_event(Event::End(BytesEnd::new("body")))?;
    writer.write_event(Event::End(BytesEnd::new("html")))?;
    Ok(())
}

fn write_meta(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    name: &str,
    content: &str,
) -> quick_xml::Result<()> {
    let mut meta = BytesStart::new("meta");
    meta.push_attribute(("name", name));
    meta.push_attribute(("content", content));
    writer.write_event(Event::Empty(meta))
}

fn element<'a>(tag: &'a str, class: &str, id: &str, title: &str) -> BytesStart<'a> {
    let mut start = BytesStart::new(tag);
    start.push_attribute(("class", class));
    start.push_attribute(("id", id));
    start.push_attribute(("title", title));
    start
}

fn bbox(x0: u32, y0: u32, x1: u32, y1: u32) -> String {
    format!("bbox {x0} {y0} {x1} {y1}")
}

fn xml_error(err: quick_xml::Error) -> PapyrusError {
    PapyrusError::ExtractionFailure(format!("cannot write hOCR: {err}"))
}

/// The `bbox` of the first `ocr_page` element.
pub fn page_bbox(hocr: &str) -> Option<(u32, u32, u32, u32)> {
    let mut reader = Reader::from_str(hocr);
    loop {
        match reader.read_event().ok()? {
            Event::Start(element) | Event::Empty(element) => {
                let class = element.try_get_attribute("class").ok()??;
                let class = class.unescape_value().ok()?;
                if class.split_whitespace().any(|c| c == "ocr_page") {
                    let title = element.try_get_attribute("title").ok()??;
                    return parse_bbox(&title.unescape_value().ok()?);
                }
            }
            Event::Eof => return None,
            _ => {}
        }
    }
}

/// Find `bbox x0 y0 x1 y1` among the `;`-separated properties of a title.
fn parse_bbox(title: &str) -> Option<(u32, u32, u32, u32)> {
    let property = title
        .split(';')
        .map(str::trim)
        .find_map(|property| property.strip_prefix("bbox "))?;
    let mut numbers = property.split_whitespace().map(|n| n.parse::<u32>().ok());
    Some((
        numbers.next()??,
        numbers.next()??,
        numbers.next()??,
        numbers.next()??,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &str) -> HocrLine {
        HocrLine {
            text: text.into(),
            bbox: (1, 2, 30, 12),
        }
    }

    #[test]
    fn empty_document_declares_page_size() {
        let hocr = empty_document(800, 1131).expect("hocr");
        assert_eq!(page_bbox(&hocr), Some((0, 0, 800, 1131)));
        assert!(!hocr.contains("class=\"ocr_line\""));
        assert!(hocr.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
    }

    #[test]
    fn lines_are_escaped() {
        let hocr = document(100, 50, &[line("a < b & c")]).expect("hocr");
        assert!(hocr.contains("title=\"bbox 1 2 30 12\">a &lt; b &amp; c</span>"));
    }

    #[test]
    fn quotes_in_text_stay_well_formed() {
        let hocr = document(100, 50, &[line("it's \"quoted\"")]).expect("hocr");
        assert!(!hocr.contains("it's"));

        let mut reader = Reader::from_str(&hocr);
        let mut text = String::new();
        loop {
            match reader.read_event().expect("well-formed") {
                Event::Text(t) => text.push_str(&t.unescape().expect("unescape")),
                Event::Eof => break,
                _ => {}
            }
        }
        assert!(text.contains("it's \"quoted\""));
    }

    #[test]
    fn tesseract_style_bbox_is_parsed() {
        let hocr = "<div class='ocr_page' id='page_1' title='image \"x.png\"; bbox 0 0 640 480; ppageno 0'>";
        // The image name comes first; only the bbox numbers matter.
        assert_eq!(page_bbox(hocr), Some((0, 0, 640, 480)));
    }

    #[test]
    fn page_without_bbox_has_none() {
        let hocr = "<div class='ocr_page' title='ppageno 0'></div>";
        assert_eq!(page_bbox(hocr), None);
    }
}
