#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};

use qadoc_model::CellRef;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";

pub const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="1"><font><sz val="11"/><name val="Malgun Gothic"/></font></fonts><fills count="1"><fill><patternFill patternType="none"/></fill></fills><borders count="2"><border/><border><left style="thin"/><right style="thin"/><top style="thin"/><bottom style="thin"/></border></borders><cellXfs count="4"><xf/><xf borderId="1"/><xf borderId="1" applyAlignment="1"><alignment wrapText="1"/></xf><xf borderId="1"/></cellXfs></styleSheet>"#;

pub const THEME_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Office Theme"><a:themeElements><a:clrScheme name="Office"><a:dk1><a:sysClr val="windowText" lastClr="000000"/></a:dk1></a:clrScheme></a:themeElements></a:theme>"#;

/// Minimal worksheet markup built cell by cell.
#[derive(Default)]
pub struct SheetXml {
    rows: BTreeMap<u32, (String, BTreeMap<u32, String>)>,
    merges: Vec<String>,
    dimension: Option<String>,
}

impl SheetXml {
    pub fn new() -> Self {
        Self::default()
    }

    fn put(mut self, a1: &str, cell: String) -> Self {
        let at = CellRef::from_a1(a1).expect("valid cell reference");
        self.rows
            .entry(at.row)
            .or_default()
            .1
            .insert(at.col, cell);
        self
    }

    pub fn row_attrs(mut self, row: u32, attrs: &str) -> Self {
        self.rows.entry(row).or_default().0 = attrs.to_string();
        self
    }

    /// Inline string cell.
    pub fn text(self, a1: &str, text: &str) -> Self {
        let cell = format!(r#"<c r="{a1}" t="inlineStr"><is><t>{text}</t></is></c>"#);
        self.put(a1, cell)
    }

    /// Shared string cell.
    pub fn shared(self, a1: &str, idx: u32, style: u32) -> Self {
        let cell = format!(r#"<c r="{a1}" s="{style}" t="s"><v>{idx}</v></c>"#);
        self.put(a1, cell)
    }

    /// Empty cell carrying only a style.
    pub fn styled(self, a1: &str, style: u32) -> Self {
        let cell = format!(r#"<c r="{a1}" s="{style}"/>"#);
        self.put(a1, cell)
    }

    pub fn merge(mut self, range: &str) -> Self {
        self.merges.push(range.to_string());
        self
    }

    pub fn dimension(mut self, range: &str) -> Self {
        self.dimension = Some(range.to_string());
        self
    }

    pub fn build(&self) -> String {
        let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#);
        xml.push('\n');
        xml.push_str(&format!(
            r#"<worksheet xmlns="{MAIN_NS}" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#
        ));
        if let Some(dim) = &self.dimension {
            xml.push_str(&format!(r#"<dimension ref="{dim}"/>"#));
        }
        xml.push_str(r#"<sheetViews><sheetView workbookViewId="0"/></sheetViews>"#);
        xml.push_str(r#"<sheetFormatPr defaultRowHeight="16.5"/>"#);
        xml.push_str(r#"<cols><col min="1" max="4" width="18" customWidth="1"/></cols>"#);
        xml.push_str("<sheetData>");
        for (row, (attrs, cells)) in &self.rows {
            if attrs.is_empty() {
                xml.push_str(&format!(r#"<row r="{row}">"#));
            } else {
                xml.push_str(&format!(r#"<row r="{row}" {attrs}>"#));
            }
            for cell in cells.values() {
                xml.push_str(cell);
            }
            xml.push_str("</row>");
        }
        xml.push_str("</sheetData>");
        if !self.merges.is_empty() {
            xml.push_str(&format!(r#"<mergeCells count="{}">"#, self.merges.len()));
            for merge in &self.merges {
                xml.push_str(&format!(r#"<mergeCell ref="{merge}"/>"#));
            }
            xml.push_str("</mergeCells>");
        }
        xml.push_str(
            r#"<pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/>"#,
        );
        xml.push_str("</worksheet>");
        xml
    }
}

/// A workbook package with styles, a theme, a shared-string table and the given sheets.
pub struct WorkbookBuilder {
    sheets: Vec<(String, String)>,
    shared_strings: Vec<String>,
}

impl WorkbookBuilder {
    pub fn new() -> Self {
        Self {
            sheets: Vec::new(),
            shared_strings: Vec::new(),
        }
    }

    pub fn sheet(mut self, name: &str, xml: String) -> Self {
        self.sheets.push((name.to_string(), xml));
        self
    }

    pub fn shared_strings(mut self, values: &[&str]) -> Self {
        self.shared_strings = values.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut content_types = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
        );
        let mut workbook = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
        );
        let mut rels = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        for (idx, (name, _)) in self.sheets.iter().enumerate() {
            let n = idx + 1;
            workbook.push_str(&format!(
                r#"<sheet name="{name}" sheetId="{n}" r:id="rId{n}"/>"#
            ));
            rels.push_str(&format!(
                r#"<Relationship Id="rId{n}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{n}.xml"/>"#
            ));
            content_types.push_str(&format!(
                r#"<Override PartName="/xl/worksheets/sheet{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#
            ));
        }
        workbook.push_str("</sheets></workbook>");
        rels.push_str(
            r#"<Relationship Id="rId100" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/><Relationship Id="rId101" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/theme" Target="theme/theme1.xml"/><Relationship Id="rId102" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/></Relationships>"#,
        );
        content_types.push_str("</Types>");

        let mut sst = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="{MAIN_NS}" count="{0}" uniqueCount="{0}">"#,
            self.shared_strings.len()
        );
        for value in &self.shared_strings {
            sst.push_str(&format!("<si><t>{value}</t></si>"));
        }
        sst.push_str("</sst>");

        let root_rels = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::<()>::default().compression_method(CompressionMethod::Deflated);
        let mut add = |name: &str, bytes: &[u8]| {
            zip.start_file(name, options).unwrap();
            zip.write_all(bytes).unwrap();
        };
        add("[Content_Types].xml", content_types.as_bytes());
        add("_rels/.rels", root_rels.as_bytes());
        add("xl/workbook.xml", workbook.as_bytes());
        add("xl/_rels/workbook.xml.rels", rels.as_bytes());
        add("xl/styles.xml", STYLES_XML.as_bytes());
        add("xl/theme/theme1.xml", THEME_XML.as_bytes());
        add("xl/sharedStrings.xml", sst.as_bytes());
        for (idx, (_, xml)) in self.sheets.iter().enumerate() {
            add(format!("xl/worksheets/sheet{}.xml", idx + 1).as_str(), xml.as_bytes());
        }
        zip.finish().unwrap().into_inner()
    }
}

/// The feature-list template: title merge, overview label, shared-string header on row 7 and a
/// styled blank data row 8, plus an unrelated second sheet.
pub fn feature_list_template() -> Vec<u8> {
    let sheet = SheetXml::new()
        .text("A1", "기능리스트")
        .text("A4", "개요")
        .text("B4", "기존 개요")
        .shared("A7", 0, 1)
        .shared("B7", 1, 1)
        .shared("C7", 2, 1)
        .shared("D7", 3, 1)
        .row_attrs(8, r#"ht="24" customHeight="1""#)
        .styled("A8", 2)
        .styled("B8", 2)
        .styled("C8", 2)
        .styled("D8", 3)
        .merge("A1:D1")
        .merge("B4:D4")
        .dimension("A1:D8");
    let notes = SheetXml::new().text("A1", "참고 자료").dimension("A1");
    WorkbookBuilder::new()
        .shared_strings(&["대분류", "중분류", "소분류", "기능 설명"])
        .sheet("기능리스트", sheet.build())
        .sheet("참고", notes.build())
        .build()
}

pub fn zip_part(zip_bytes: &[u8], name: &str) -> Vec<u8> {
    let mut archive = ZipArchive::new(Cursor::new(zip_bytes)).expect("open zip");
    let mut file = archive.by_name(name).expect("part exists");
    let mut buf = Vec::new();
    file.read_to_end(&mut buf).expect("read part");
    buf
}

pub fn part_names(zip_bytes: &[u8]) -> Vec<String> {
    let archive = ZipArchive::new(Cursor::new(zip_bytes)).expect("open zip");
    archive.file_names().map(str::to_string).collect()
}

fn is_main(node: roxmltree::Node<'_, '_>, local: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == local
        && node.tag_name().namespace() == Some(MAIN_NS)
}

/// `(ref, text)` of every cell with a value, and every merge ref, of a worksheet part.
pub struct SheetView {
    pub cells: BTreeMap<CellRef, String>,
    pub merges: Vec<String>,
    pub dimension: Option<String>,
}

impl SheetView {
    pub fn read(zip_bytes: &[u8], part: &str) -> Self {
        let xml = String::from_utf8(zip_part(zip_bytes, part)).expect("utf-8 worksheet");
        let doc = roxmltree::Document::parse(&xml).expect("valid worksheet xml");
        let mut cells = BTreeMap::new();
        for c in doc.descendants().filter(|n| is_main(*n, "c")) {
            let at = CellRef::from_a1(c.attribute("r").expect("cell ref")).expect("valid ref");
            let text: String = c
                .descendants()
                .filter(|n| is_main(*n, "t") || is_main(*n, "v"))
                .filter_map(|n| n.text())
                .collect();
            if !text.is_empty() {
                cells.insert(at, text);
            }
        }
        let mut merges: Vec<String> = doc
            .descendants()
            .filter(|n| is_main(*n, "mergeCell"))
            .filter_map(|n| n.attribute("ref").map(str::to_string))
            .collect();
        merges.sort();
        let dimension = doc
            .descendants()
            .find(|n| is_main(*n, "dimension"))
            .and_then(|n| n.attribute("ref").map(str::to_string));
        Self {
            cells,
            merges,
            dimension,
        }
    }

    pub fn text(&self, a1: &str) -> &str {
        let at = CellRef::from_a1(a1).expect("valid ref");
        self.cells.get(&at).map(String::as_str).unwrap_or("")
    }
}
