//! PowerPoint (PPTX) writer.
//!
//! A `.pptx` file is an OPC package: a zip archive of XML parts tied
//! together by relationship files. The package written here is the smallest
//! one PowerPoint, LibreOffice and Keynote all open without repair:
//!
//! ```text
//! [Content_Types].xml
//! _rels/.rels
//! docProps/{core,app}.xml
//! ppt/presentation.xml            + _rels
//! ppt/slideMasters/slideMaster1   + _rels
//! ppt/slideLayouts/slideLayout1   + _rels   (blank)
//! ppt/theme/theme1.xml
//! ppt/slides/slideN.xml           + _rels
//! ppt/media/imageN.png
//! ```
//!
//! Every shape is positioned explicitly, so the single blank layout is all
//! the master needs. Zip entries carry a fixed timestamp and are written in
//! a fixed order, so the same deck always produces the same bytes.

use crate::error::SlideGenError;
use crate::model::{MediaAsset, Slide, SlideDeck, SlideItem, SlideKind, TableGrid, Visual, VisualContent};
use std::fmt::Write as _;
use std::io::{Cursor, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

// ── Geometry (EMU; 914 400 per inch) ────────────────────────────────────────

const SLIDE_CX: i64 = 12_192_000;
const SLIDE_CY: i64 = 6_858_000;
const MARGIN: i64 = 457_200;
const TITLE_Y: i64 = 274_320;
const TITLE_CY: i64 = 914_400;
const BODY_Y: i64 = 1_325_880;
const BODY_CY: i64 = SLIDE_CY - BODY_Y - MARGIN;
const GAP: i64 = 228_600;
const CAPTION_CY: i64 = 365_760;
/// Share of the content width given to bullets when a slide has visuals.
const TEXT_SHARE: f64 = 0.52;

const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_P: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
const REL_PKG: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

/// Serialise `deck` as a PPTX package.
pub fn write_pptx(deck: &SlideDeck) -> Result<Vec<u8>, SlideGenError> {
    let mut pkg = Package::new();
    let mut image_counter = 0usize;
    let mut slide_parts = Vec::with_capacity(deck.slides.len());

    for (i, slide) in deck.slides.iter().enumerate() {
        let number = i + 1;
        let mut images: Vec<(String, &MediaAsset)> = Vec::new();
        for visual in &slide.visuals {
            if let VisualContent::Image(media) = &visual.content {
                image_counter += 1;
                images.push((format!("image{image_counter}.png"), media));
            }
        }
        let xml = slide_xml(slide);
        let rels = slide_rels(images.iter().map(|(name, _)| name.as_str()));
        slide_parts.push((number, xml, rels, images));
    }

    pkg.add("[Content_Types].xml", content_types(deck.slides.len()).as_bytes())?;
    pkg.add("_rels/.rels", ROOT_RELS.as_bytes())?;
    pkg.add("docProps/core.xml", core_props(deck).as_bytes())?;
    pkg.add("docProps/app.xml", app_props(deck.slides.len()).as_bytes())?;
    pkg.add("ppt/presentation.xml", presentation_xml(deck.slides.len()).as_bytes())?;
    pkg.add(
        "ppt/_rels/presentation.xml.rels",
        presentation_rels(deck.slides.len()).as_bytes(),
    )?;
    pkg.add("ppt/slideMasters/slideMaster1.xml", slide_master_xml().as_bytes())?;
    pkg.add(
        "ppt/slideMasters/_rels/slideMaster1.xml.rels",
        MASTER_RELS.as_bytes(),
    )?;
    pkg.add("ppt/slideLayouts/slideLayout1.xml", slide_layout_xml().as_bytes())?;
    pkg.add(
        "ppt/slideLayouts/_rels/slideLayout1.xml.rels",
        LAYOUT_RELS.as_bytes(),
    )?;
    pkg.add("ppt/theme/theme1.xml", THEME_XML.as_bytes())?;

    for (number, xml, rels, images) in &slide_parts {
        pkg.add(&format!("ppt/slides/slide{number}.xml"), xml.as_bytes())?;
        pkg.add(&format!("ppt/slides/_rels/slide{number}.xml.rels"), rels.as_bytes())?;
        for (name, media) in images {
            pkg.add(&format!("ppt/media/{name}"), &media.png)?;
        }
    }

    let bytes = pkg.finish()?;
    debug!(
        "PPTX: {} slides, {} images, {} bytes",
        deck.slides.len(),
        image_counter,
        bytes.len()
    );
    Ok(bytes)
}

/// Zip writer with fixed entry options.
struct Package {
    zip: ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
}

impl Package {
    fn new() -> Self {
        Self {
            zip: ZipWriter::new(Cursor::new(Vec::new())),
            options: SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .last_modified_time(zip::DateTime::default()),
        }
    }

    fn add(&mut self, name: &str, data: &[u8]) -> Result<(), SlideGenError> {
        self.zip
            .start_file(name, self.options)
            .map_err(|e| pptx_error(format!("{name}: {e}")))?;
        self.zip
            .write_all(data)
            .map_err(|e| pptx_error(format!("{name}: {e}")))
    }

    fn finish(self) -> Result<Vec<u8>, SlideGenError> {
        self.zip
            .finish()
            .map(Cursor::into_inner)
            .map_err(|e| pptx_error(e.to_string()))
    }
}

fn pptx_error(detail: String) -> SlideGenError {
    SlideGenError::SerializationFailed {
        format: "pptx".to_string(),
        detail,
    }
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // Control characters are not allowed in XML 1.0.
            c if (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r') => {}
            c => out.push(c),
        }
    }
    out
}

// ── Package-level parts ─────────────────────────────────────────────────────

fn content_types(slides: usize) -> String {
    let mut xml = format!(
        "{XML_DECL}<Types xmlns=\"http://schemas.openxmlformats.org/package/2006/content-types\">\
<Default Extension=\"rels\" ContentType=\"application/vnd.openxmlformats-package.relationships+xml\"/>\
<Default Extension=\"xml\" ContentType=\"application/xml\"/>\
<Default Extension=\"png\" ContentType=\"image/png\"/>\
<Override PartName=\"/ppt/presentation.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml\"/>\
<Override PartName=\"/ppt/slideMasters/slideMaster1.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml\"/>\
<Override PartName=\"/ppt/slideLayouts/slideLayout1.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml\"/>\
<Override PartName=\"/ppt/theme/theme1.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.theme+xml\"/>\
<Override PartName=\"/docProps/core.xml\" ContentType=\"application/vnd.openxmlformats-package.core-properties+xml\"/>\
<Override PartName=\"/docProps/app.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.extended-properties+xml\"/>"
    );
    for n in 1..=slides {
        let _ = write!(
            xml,
            "<Override PartName=\"/ppt/slides/slide{n}.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.presentationml.slide+xml\"/>"
        );
    }
    xml.push_str("</Types>");
    xml
}

const ROOT_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="ppt/presentation.xml"/>"#,
    r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>"#,
    r#"<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties" Target="docProps/app.xml"/>"#,
    r#"</Relationships>"#
);

/// Core properties. No timestamps, so output stays byte-stable.
fn core_props(deck: &SlideDeck) -> String {
    let mut xml = format!(
        "{XML_DECL}<cp:coreProperties xmlns:cp=\"http://schemas.openxmlformats.org/package/2006/metadata/core-properties\" \
xmlns:dc=\"http://purl.org/dc/elements/1.1/\" xmlns:dcterms=\"http://purl.org/dc/terms/\" \
xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\"><dc:title>{}</dc:title>",
        escape_xml(&deck.title)
    );
    if let Some(author) = &deck.author {
        let _ = write!(xml, "<dc:creator>{}</dc:creator>", escape_xml(author));
    }
    xml.push_str("</cp:coreProperties>");
    xml
}

fn app_props(slides: usize) -> String {
    format!(
        "{XML_DECL}<Properties xmlns=\"http://schemas.openxmlformats.org/officeDocument/2006/extended-properties\">\
<Application>{}</Application><Slides>{slides}</Slides></Properties>",
        env!("CARGO_PKG_NAME")
    )
}

// ── Presentation, master, layout ────────────────────────────────────────────

fn presentation_xml(slides: usize) -> String {
    let mut xml = format!(
        "{XML_DECL}<p:presentation xmlns:a=\"{NS_A}\" xmlns:r=\"{NS_R}\" xmlns:p=\"{NS_P}\" saveSubsetFonts=\"1\">\
<p:sldMasterIdLst><p:sldMasterId id=\"2147483648\" r:id=\"rId1\"/></p:sldMasterIdLst>"
    );
    if slides > 0 {
        xml.push_str("<p:sldIdLst>");
        for n in 0..slides {
            let _ = write!(xml, "<p:sldId id=\"{}\" r:id=\"rId{}\"/>", 256 + n, n + 3);
        }
        xml.push_str("</p:sldIdLst>");
    }
    let _ = write!(
        xml,
        "<p:sldSz cx=\"{SLIDE_CX}\" cy=\"{SLIDE_CY}\"/><p:notesSz cx=\"6858000\" cy=\"9144000\"/>\
<p:defaultTextStyle/></p:presentation>"
    );
    xml
}

fn presentation_rels(slides: usize) -> String {
    let mut xml = format!(
        "{XML_DECL}<Relationships xmlns=\"{REL_PKG}\">\
<Relationship Id=\"rId1\" Type=\"{NS_R}/slideMaster\" Target=\"slideMasters/slideMaster1.xml\"/>\
<Relationship Id=\"rId2\" Type=\"{NS_R}/theme\" Target=\"theme/theme1.xml\"/>"
    );
    for n in 1..=slides {
        let _ = write!(
            xml,
            "<Relationship Id=\"rId{}\" Type=\"{NS_R}/slide\" Target=\"slides/slide{n}.xml\"/>",
            n + 2
        );
    }
    xml.push_str("</Relationships>");
    xml
}

const EMPTY_TREE: &str = "<p:nvGrpSpPr><p:cNvPr id=\"1\" name=\"\"/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>\
<p:grpSpPr><a:xfrm><a:off x=\"0\" y=\"0\"/><a:ext cx=\"0\" cy=\"0\"/><a:chOff x=\"0\" y=\"0\"/><a:chExt cx=\"0\" cy=\"0\"/></a:xfrm></p:grpSpPr>";

fn slide_master_xml() -> String {
    format!(
        "{XML_DECL}<p:sldMaster xmlns:a=\"{NS_A}\" xmlns:r=\"{NS_R}\" xmlns:p=\"{NS_P}\">\
<p:cSld><p:bg><p:bgRef idx=\"1001\"><a:schemeClr val=\"bg1\"/></p:bgRef></p:bg><p:spTree>{EMPTY_TREE}</p:spTree></p:cSld>\
<p:clrMap bg1=\"lt1\" tx1=\"dk1\" bg2=\"lt2\" tx2=\"dk2\" accent1=\"accent1\" accent2=\"accent2\" accent3=\"accent3\" \
accent4=\"accent4\" accent5=\"accent5\" accent6=\"accent6\" hlink=\"hlink\" folHlink=\"folHlink\"/>\
<p:sldLayoutIdLst><p:sldLayoutId id=\"2147483649\" r:id=\"rId1\"/></p:sldLayoutIdLst>\
<p:txStyles><p:titleStyle/><p:bodyStyle/><p:otherStyle/></p:txStyles></p:sldMaster>"
    )
}

const MASTER_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout" Target="../slideLayouts/slideLayout1.xml"/>"#,
    r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/theme" Target="../theme/theme1.xml"/>"#,
    r#"</Relationships>"#
);

fn slide_layout_xml() -> String {
    format!(
        "{XML_DECL}<p:sldLayout xmlns:a=\"{NS_A}\" xmlns:r=\"{NS_R}\" xmlns:p=\"{NS_P}\" type=\"blank\" preserve=\"1\">\
<p:cSld name=\"Blank\"><p:spTree>{EMPTY_TREE}</p:spTree></p:cSld>\
<p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sldLayout>"
    )
}

const LAYOUT_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster" Target="../slideMasters/slideMaster1.xml"/>"#,
    r#"</Relationships>"#
);

const THEME_XML: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Paper">"#,
    r#"<a:themeElements>"#,
    r#"<a:clrScheme name="Paper">"#,
    r#"<a:dk1><a:srgbClr val="1F2328"/></a:dk1><a:lt1><a:srgbClr val="FFFFFF"/></a:lt1>"#,
    r#"<a:dk2><a:srgbClr val="24292F"/></a:dk2><a:lt2><a:srgbClr val="F6F8FA"/></a:lt2>"#,
    r#"<a:accent1><a:srgbClr val="1F6FEB"/></a:accent1><a:accent2><a:srgbClr val="2DA44E"/></a:accent2>"#,
    r#"<a:accent3><a:srgbClr val="BF8700"/></a:accent3><a:accent4><a:srgbClr val="CF222E"/></a:accent4>"#,
    r#"<a:accent5><a:srgbClr val="8250DF"/></a:accent5><a:accent6><a:srgbClr val="57606A"/></a:accent6>"#,
    r#"<a:hlink><a:srgbClr val="0969DA"/></a:hlink><a:folHlink><a:srgbClr val="8250DF"/></a:folHlink>"#,
    r#"</a:clrScheme>"#,
    r#"<a:fontScheme name="Paper">"#,
    r#"<a:majorFont><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/></a:majorFont>"#,
    r#"<a:minorFont><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/></a:minorFont>"#,
    r#"</a:fontScheme>"#,
    r#"<a:fmtScheme name="Paper">"#,
    r#"<a:fillStyleLst><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:fillStyleLst>"#,
    r#"<a:lnStyleLst><a:ln w="6350"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln><a:ln w="12700"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln><a:ln w="19050"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln></a:lnStyleLst>"#,
    r#"<a:effectStyleLst><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle></a:effectStyleLst>"#,
    r#"<a:bgFillStyleLst><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:bgFillStyleLst>"#,
    r#"</a:fmtScheme>"#,
    r#"</a:themeElements>"#,
    r#"</a:theme>"#
);

// ── Slides ──────────────────────────────────────────────────────────────────

fn slide_rels<'a>(images: impl Iterator<Item = &'a str>) -> String {
    let mut xml = format!(
        "{XML_DECL}<Relationships xmlns=\"{REL_PKG}\">\
<Relationship Id=\"rId1\" Type=\"{NS_R}/slideLayout\" Target=\"../slideLayouts/slideLayout1.xml\"/>"
    );
    for (i, name) in images.enumerate() {
        let _ = write!(
            xml,
            "<Relationship Id=\"rId{}\" Type=\"{NS_R}/image\" Target=\"../media/{name}\"/>",
            i + 2
        );
    }
    xml.push_str("</Relationships>");
    xml
}

#[derive(Clone, Copy)]
struct Rect {
    x: i64,
    y: i64,
    cx: i64,
    cy: i64,
}

/// Shape XML accumulator; hands out shape ids.
struct SpTree {
    xml: String,
    next_id: u32,
}

impl SpTree {
    fn new() -> Self {
        Self {
            xml: String::new(),
            next_id: 2,
        }
    }

    fn id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn text_box(&mut self, name: &str, rect: Rect, anchor: &str, paragraphs: &str) {
        let id = self.id();
        let _ = write!(
            self.xml,
            "<p:sp><p:nvSpPr><p:cNvPr id=\"{id}\" name=\"{name} {id}\"/><p:cNvSpPr txBox=\"1\"/><p:nvPr/></p:nvSpPr>\
<p:spPr>{}<a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom><a:noFill/></p:spPr>\
<p:txBody><a:bodyPr wrap=\"square\" anchor=\"{anchor}\"><a:normAutofit/></a:bodyPr><a:lstStyle/>{paragraphs}</p:txBody></p:sp>",
            xfrm("a", rect)
        );
    }

    fn picture(&mut self, rel_id: &str, rect: Rect, descr: &str) {
        let id = self.id();
        let _ = write!(
            self.xml,
            "<p:pic><p:nvPicPr><p:cNvPr id=\"{id}\" name=\"Picture {id}\" descr=\"{}\"/>\
<p:cNvPicPr><a:picLocks noChangeAspect=\"1\"/></p:cNvPicPr><p:nvPr/></p:nvPicPr>\
<p:blipFill><a:blip r:embed=\"{rel_id}\"/><a:stretch><a:fillRect/></a:stretch></p:blipFill>\
<p:spPr>{}<a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom></p:spPr></p:pic>",
            escape_xml(descr),
            xfrm("a", rect)
        );
    }

    fn table(&mut self, grid: &TableGrid, rect: Rect) {
        let cols = grid.column_count().max(1);
        let rows = grid.rows.len().max(1);
        let col_w = rect.cx / cols as i64;
        let row_h = (rect.cy / rows as i64).min(370_840);
        let font = if rows > 8 || cols > 5 { 1000 } else { 1200 };

        let id = self.id();
        let _ = write!(
            self.xml,
            "<p:graphicFrame><p:nvGraphicFramePr><p:cNvPr id=\"{id}\" name=\"Table {id}\"/>\
<p:cNvGraphicFramePr><a:graphicFrameLocks noGrp=\"1\"/></p:cNvGraphicFramePr><p:nvPr/></p:nvGraphicFramePr>\
{}<a:graphic><a:graphicData uri=\"http://schemas.openxmlformats.org/drawingml/2006/table\">\
<a:tbl><a:tblPr firstRow=\"1\" bandRow=\"1\"/><a:tblGrid>",
            xfrm("p", rect)
        );
        for _ in 0..cols {
            let _ = write!(self.xml, "<a:gridCol w=\"{col_w}\"/>");
        }
        self.xml.push_str("</a:tblGrid>");
        for (r, row) in grid.rows.iter().enumerate() {
            let _ = write!(self.xml, "<a:tr h=\"{row_h}\">");
            for c in 0..cols {
                let text = row.get(c).map(String::as_str).unwrap_or("");
                let bold = if r == 0 { " b=\"1\"" } else { "" };
                let _ = write!(
                    self.xml,
                    "<a:tc><a:txBody><a:bodyPr/><a:lstStyle/><a:p><a:r><a:rPr lang=\"en-US\" sz=\"{font}\"{bold} dirty=\"0\"/>\
<a:t>{}</a:t></a:r></a:p></a:txBody><a:tcPr/></a:tc>",
                    escape_xml(text)
                );
            }
            self.xml.push_str("</a:tr>");
        }
        self.xml.push_str("</a:tbl></a:graphicData></a:graphic></p:graphicFrame>");
    }
}

fn xfrm(prefix: &str, r: Rect) -> String {
    format!(
        "<{prefix}:xfrm><a:off x=\"{}\" y=\"{}\"/><a:ext cx=\"{}\" cy=\"{}\"/></{prefix}:xfrm>",
        r.x, r.y, r.cx, r.cy
    )
}

fn run(text: &str, size: u32, extra: &str) -> String {
    format!(
        "<a:r><a:rPr lang=\"en-US\" sz=\"{size}\"{extra} dirty=\"0\"/><a:t>{}</a:t></a:r>",
        escape_xml(text)
    )
}

/// Run in a fixed colour (`RRGGBB`).
fn colored_run(text: &str, size: u32, extra: &str, rgb: &str) -> String {
    format!(
        "<a:r><a:rPr lang=\"en-US\" sz=\"{size}\"{extra} dirty=\"0\"><a:solidFill><a:srgbClr val=\"{rgb}\"/></a:solidFill></a:rPr>\
<a:t>{}</a:t></a:r>",
        escape_xml(text)
    )
}

fn bullet_paragraphs(items: &[SlideItem], size: u32) -> String {
    let mut xml = String::new();
    for item in items {
        match item {
            SlideItem::Bullet(t) => {
                let _ = write!(
                    xml,
                    "<a:p><a:pPr marL=\"342900\" indent=\"-342900\"><a:spcBef><a:spcPts val=\"600\"/></a:spcBef>\
<a:buFont typeface=\"Arial\"/><a:buChar char=\"&#8226;\"/></a:pPr>{}</a:p>",
                    run(t, size, "")
                );
            }
            SlideItem::Placeholder(t) => {
                let _ = write!(
                    xml,
                    "<a:p><a:pPr><a:buNone/></a:pPr>{}</a:p>",
                    colored_run(t, size, " i=\"1\"", "8C959F")
                );
            }
            SlideItem::Equation(t) => {
                let _ = write!(
                    xml,
                    "<a:p><a:pPr marL=\"685800\" algn=\"l\"><a:spcBef><a:spcPts val=\"300\"/></a:spcBef><a:buNone/></a:pPr>{}</a:p>",
                    colored_run(t, size.saturating_sub(200), " i=\"1\"", "1F4E79")
                );
            }
        }
    }
    if xml.is_empty() {
        xml.push_str("<a:p><a:endParaRPr lang=\"en-US\"/></a:p>");
    }
    xml
}

fn slide_xml(slide: &Slide) -> String {
    let mut tree = SpTree::new();

    match slide.kind {
        SlideKind::Title => {
            tree.text_box(
                "Title",
                Rect { x: MARGIN * 2, y: 2_286_000, cx: SLIDE_CX - MARGIN * 4, cy: 1_371_600 },
                "b",
                &format!("<a:p><a:pPr algn=\"ctr\"/>{}</a:p>", run(&slide.title, 4000, " b=\"1\"")),
            );
            if let Some(sub) = &slide.subtitle {
                tree.text_box(
                    "Subtitle",
                    Rect { x: MARGIN * 2, y: 3_749_040, cx: SLIDE_CX - MARGIN * 4, cy: 914_400 },
                    "t",
                    &format!("<a:p><a:pPr algn=\"ctr\"/>{}</a:p>", run(sub, 2000, "")),
                );
            }
        }
        SlideKind::Content => {
            tree.text_box(
                "Title",
                Rect { x: MARGIN, y: TITLE_Y, cx: SLIDE_CX - MARGIN * 2, cy: TITLE_CY },
                "b",
                &format!("<a:p>{}</a:p>", run(&slide.title, 3200, " b=\"1\"")),
            );

            let content_cx = SLIDE_CX - MARGIN * 2;
            let (text_cx, media_rect) = if slide.visuals.is_empty() {
                (content_cx, None)
            } else if slide.items.is_empty() {
                (0, Some(Rect { x: MARGIN, y: BODY_Y, cx: content_cx, cy: BODY_CY }))
            } else {
                let text_cx = (content_cx as f64 * TEXT_SHARE) as i64;
                let x = MARGIN + text_cx + GAP;
                (
                    text_cx,
                    Some(Rect { x, y: BODY_Y, cx: SLIDE_CX - MARGIN - x, cy: BODY_CY }),
                )
            };

            if text_cx > 0 {
                let size = if slide.visuals.is_empty() { 2000 } else { 1800 };
                tree.text_box(
                    "Body",
                    Rect { x: MARGIN, y: BODY_Y, cx: text_cx, cy: BODY_CY },
                    "t",
                    &bullet_paragraphs(&slide.items, size),
                );
            }

            if let Some(area) = media_rect {
                place_visuals(&mut tree, &slide.visuals, area);
            }
        }
    }

    format!(
        "{XML_DECL}<p:sld xmlns:a=\"{NS_A}\" xmlns:r=\"{NS_R}\" xmlns:p=\"{NS_P}\">\
<p:cSld><p:spTree>{EMPTY_TREE}{}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>",
        tree.xml
    )
}

/// Stack visuals vertically in `area`, each with its caption underneath.
fn place_visuals(tree: &mut SpTree, visuals: &[Visual], area: Rect) {
    let n = visuals.len().max(1) as i64;
    let slot_cy = (area.cy - GAP * (n - 1)) / n;
    let mut image_rel = 2;

    for (i, visual) in visuals.iter().enumerate() {
        let slot_y = area.y + i as i64 * (slot_cy + GAP);
        let caption = visual.display_caption();
        let content_cy = if caption.is_some() {
            (slot_cy - CAPTION_CY).max(slot_cy / 2)
        } else {
            slot_cy
        };
        let slot = Rect { x: area.x, y: slot_y, cx: area.cx, cy: content_cy };

        match &visual.content {
            VisualContent::Image(media) => {
                let rect = fit(media.width, media.height, slot);
                tree.picture(&format!("rId{image_rel}"), rect, caption.unwrap_or(""));
                image_rel += 1;
            }
            VisualContent::Table(grid) => tree.table(grid, slot),
        }

        if let Some(text) = caption {
            tree.text_box(
                "Caption",
                Rect { x: area.x, y: slot_y + content_cy, cx: area.cx, cy: CAPTION_CY },
                "t",
                &format!("<a:p><a:pPr algn=\"ctr\"/>{}</a:p>", run(text, 1100, " i=\"1\"")),
            );
        }
    }
}

/// Largest rectangle with the image's aspect ratio, centred in `slot`.
fn fit(width: u32, height: u32, slot: Rect) -> Rect {
    if width == 0 || height == 0 || slot.cx <= 0 || slot.cy <= 0 {
        return slot;
    }
    let aspect = width as f64 / height as f64;
    let (cx, cy) = if slot.cx as f64 / slot.cy as f64 > aspect {
        ((slot.cy as f64 * aspect) as i64, slot.cy)
    } else {
        (slot.cx, (slot.cx as f64 / aspect) as i64)
    };
    Rect {
        x: slot.x + (slot.cx - cx) / 2,
        y: slot.y + (slot.cy - cy) / 2,
        cx,
        cy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn sample_deck() -> SlideDeck {
        SlideDeck {
            title: "Attention & Transformers".into(),
            author: Some("A. Author".into()),
            slides: vec![
                Slide {
                    index: 0,
                    kind: SlideKind::Title,
                    title: "Attention & Transformers".into(),
                    subtitle: Some("A. Author".into()),
                    items: vec![],
                    visuals: vec![],
                    source_pages: vec![],
                    source_units: vec![],
                    has_missing_content: false,
                },
                Slide {
                    index: 1,
                    kind: SlideKind::Content,
                    title: "Model <overview>".into(),
                    subtitle: None,
                    items: vec![
                        SlideItem::Bullet("Six layers".into()),
                        SlideItem::Placeholder("[Summary unavailable]".into()),
                    ],
                    visuals: vec![
                        Visual {
                            block: 2,
                            page: 1,
                            caption: Some("Figure 1: Architecture.".into()),
                            label: None,
                            content: VisualContent::Image(MediaAsset {
                                png: b"\x89PNG fake".to_vec(),
                                width: 400,
                                height: 200,
                            }),
                        },
                        Visual {
                            block: 3,
                            page: 1,
                            caption: None,
                            label: None,
                            content: VisualContent::Table(TableGrid {
                                rows: vec![vec!["a".into(), "b".into()], vec!["1".into(), "2".into()]],
                            }),
                        },
                    ],
                    source_pages: vec![1],
                    source_units: vec![0, 1, 2],
                    has_missing_content: true,
                },
            ],
        }
    }

    fn entry(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut file = archive.by_name(name).unwrap();
        let mut s = String::new();
        file.read_to_string(&mut s).unwrap();
        s
    }

    #[test]
    fn package_has_required_parts() {
        let bytes = write_pptx(&sample_deck()).unwrap();
        let archive = zip::ZipArchive::new(Cursor::new(bytes.as_slice())).unwrap();
        let names: Vec<&str> = archive.file_names().collect();
        for part in [
            "[Content_Types].xml",
            "_rels/.rels",
            "ppt/presentation.xml",
            "ppt/slides/slide1.xml",
            "ppt/slides/slide2.xml",
            "ppt/slides/_rels/slide2.xml.rels",
            "ppt/media/image1.png",
            "ppt/theme/theme1.xml",
        ] {
            assert!(names.contains(&part), "missing {part}");
        }
    }

    #[test]
    fn slide_xml_escapes_and_embeds() {
        let bytes = write_pptx(&sample_deck()).unwrap();
        let slide = entry(&bytes, "ppt/slides/slide2.xml");
        assert!(slide.contains("Model &lt;overview&gt;"));
        assert!(slide.contains("r:embed=\"rId2\""));
        assert!(slide.contains("<a:tbl>"));
        assert!(slide.contains("[Summary unavailable]"));

        let rels = entry(&bytes, "ppt/slides/_rels/slide2.xml.rels");
        assert!(rels.contains("Target=\"../media/image1.png\""));

        let ct = entry(&bytes, "[Content_Types].xml");
        assert!(ct.contains("/ppt/slides/slide2.xml"));
        assert!(entry(&bytes, "docProps/core.xml").contains("Attention &amp; Transformers"));
    }

    #[test]
    fn equations_and_slide_captions_are_rendered() {
        let mut deck = sample_deck();
        let slide = &mut deck.slides[1];
        slide.items.insert(1, SlideItem::Equation("softmax(QK^T / sqrt(d_k)) V".into()));
        slide.visuals[0].label = Some("Encoder and decoder stacks side by side".into());
        let bytes = write_pptx(&deck).unwrap();
        let xml = entry(&bytes, "ppt/slides/slide2.xml");
        assert!(xml.contains("marL=\"685800\""));
        assert!(xml.contains("softmax(QK^T / sqrt(d_k)) V"));
        assert!(xml.contains("Encoder and decoder stacks side by side"));
        assert!(!xml.contains("Figure 1: Architecture."));
    }

    #[test]
    fn output_is_byte_identical() {
        let a = write_pptx(&sample_deck()).unwrap();
        let b = write_pptx(&sample_deck()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fit_keeps_aspect_ratio() {
        let slot = Rect { x: 0, y: 0, cx: 1000, cy: 1000 };
        let r = fit(400, 200, slot);
        assert_eq!((r.cx, r.cy), (1000, 500));
        assert_eq!(r.y, 250);
    }

    #[test]
    fn escape_drops_control_chars() {
        assert_eq!(escape_xml("a\u{0001}b & \"c\""), "ab &amp; &quot;c&quot;");
    }
}
