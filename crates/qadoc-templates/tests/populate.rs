mod support;

use pretty_assertions::assert_eq;
use qadoc_templates::{
    DataRecord, MergePolicy, RecordsError, TemplateEngine, TemplateError, TemplateKind, XlsxError,
};

use support::{feature_list_template, part_names, zip_part, SheetView, SheetXml, WorkbookBuilder};

const SHEET1: &str = "xl/worksheets/sheet1.xml";

fn engine() -> TemplateEngine {
    TemplateEngine::new().expect("deflate support is enabled in tests")
}

fn populate(workbook: &[u8], csv: &str) -> Vec<u8> {
    engine()
        .populate(TemplateKind::FeatureList, workbook, csv, None)
        .expect("populate")
}

#[test]
fn hierarchy_columns_merge_across_shared_values() {
    let csv = "대분류,중분류,소분류,기능 설명\n대1,중1,,desc1\n대1,중1,,desc2\n";
    let out = populate(&feature_list_template(), csv);
    let view = SheetView::read(&out, SHEET1);

    assert_eq!(view.merges, vec!["A1:D1", "A8:A9", "B4:D4", "B8:B9"]);
    assert_eq!(view.text("A8"), "대1");
    assert_eq!(view.text("A9"), "");
    assert_eq!(view.text("B8"), "중1");
    assert_eq!(view.text("B9"), "");
    assert_eq!(view.text("C8"), "");
    assert_eq!(view.text("D8"), "desc1");
    assert_eq!(view.text("D9"), "desc2");
    assert_eq!(view.dimension.as_deref(), Some("A1:D9"));
}

#[test]
fn parent_change_splits_child_groups() {
    let csv = "대분류,중분류,소분류,기능 설명\nA,1,,a\nA,1,,b\nA,2,,c\nB,3,,d\n";
    let out = populate(&feature_list_template(), csv);
    let view = SheetView::read(&out, SHEET1);

    assert_eq!(view.merges, vec!["A1:D1", "A8:A10", "B4:D4", "B8:B9"]);
    assert_eq!(view.text("A11"), "B");
    assert_eq!(view.text("B10"), "2");
    assert_eq!(view.text("B11"), "3");
}

#[test]
fn new_rows_copy_template_row_formatting() {
    let csv = "대분류,중분류,소분류,기능 설명\nA,1,x,a\nB,2,y,b\nC,3,z,c\n";
    let out = populate(&feature_list_template(), csv);
    let xml = String::from_utf8(zip_part(&out, SHEET1)).unwrap();

    assert!(xml.contains(r#"<row r="10" ht="24" customHeight="1">"#), "{xml}");
    assert!(xml.contains(r#"<c r="C10" s="2" t="inlineStr"><is><t>z</t></is></c>"#), "{xml}");
    assert!(xml.contains(r#"<c r="D10" s="3" t="inlineStr"><is><t>c</t></is></c>"#), "{xml}");
    // Header cells still point at the untouched shared-string table.
    assert!(xml.contains(r#"<c r="A7" s="1" t="s"><v>0</v></c>"#), "{xml}");
}

#[test]
fn shorter_input_clears_stale_rows_and_merges() {
    let long = "대분류,중분류,소분류,기능 설명\nA,1,,a\nA,1,,b\nA,2,,c\nB,3,,d\n";
    let short = "대분류,중분류,소분류,기능 설명\nZ,9,,only\n";
    let first = populate(&feature_list_template(), long);
    let second = populate(&first, short);
    let view = SheetView::read(&second, SHEET1);

    assert_eq!(view.merges, vec!["A1:D1", "B4:D4"]);
    assert_eq!(view.text("A8"), "Z");
    assert_eq!(view.text("D8"), "only");
    for row in 9..=11 {
        for col in ["A", "B", "C", "D"] {
            assert_eq!(view.text(&format!("{col}{row}")), "", "{col}{row}");
        }
    }
}

#[test]
fn populate_is_deterministic_and_repopulation_is_stable() {
    let csv = "대분류,중분류,소분류,기능 설명\n회원,가입,이메일,이메일 가입\n회원,가입,소셜,소셜 로그인\n";
    let template = feature_list_template();
    let a = engine()
        .populate(TemplateKind::FeatureList, &template, csv, Some("개요 텍스트"))
        .unwrap();
    let b = engine()
        .populate(TemplateKind::FeatureList, &template, csv, Some("개요 텍스트"))
        .unwrap();
    assert_eq!(a, b);

    let again = engine()
        .populate(TemplateKind::FeatureList, &a, csv, Some("개요 텍스트"))
        .unwrap();
    assert_eq!(
        String::from_utf8(zip_part(&again, SHEET1)).unwrap(),
        String::from_utf8(zip_part(&a, SHEET1)).unwrap()
    );
}

#[test]
fn untouched_parts_are_byte_identical() {
    let template = feature_list_template();
    let out = populate(&template, "대분류,중분류,소분류,기능 설명\nA,1,x,a\n");

    assert_eq!(part_names(&out), part_names(&template));
    for part in [
        "[Content_Types].xml",
        "_rels/.rels",
        "xl/workbook.xml",
        "xl/_rels/workbook.xml.rels",
        "xl/styles.xml",
        "xl/theme/theme1.xml",
        "xl/sharedStrings.xml",
        "xl/worksheets/sheet2.xml",
    ] {
        assert_eq!(zip_part(&out, part), zip_part(&template, part), "{part}");
    }
    assert_ne!(zip_part(&out, SHEET1), zip_part(&template, SHEET1));
}

#[test]
fn fully_empty_rows_are_dropped() {
    let csv = "대분류,중분류,소분류,기능 설명\nA,1,x,a\n,,,\n\nB,2,y,b\n";
    let out = populate(&feature_list_template(), csv);
    let view = SheetView::read(&out, SHEET1);
    assert_eq!(view.text("A9"), "B");
    assert_eq!(view.text("A10"), "");

    let parsed = engine().parse_rows(TemplateKind::FeatureList, &out).unwrap();
    assert_eq!(parsed.records.len(), 2);
}

#[test]
fn blank_hierarchy_values_do_not_merge_by_default() {
    let csv = "대분류,중분류,소분류,기능 설명\n,,,a\n,,,b\n";
    let out = populate(&feature_list_template(), csv);
    let view = SheetView::read(&out, SHEET1);
    assert_eq!(view.merges, vec!["A1:D1", "B4:D4"]);

    let merging = engine().with_merge_policy(MergePolicy {
        merge_blank_values: true,
    });
    let out = merging
        .populate(TemplateKind::FeatureList, &feature_list_template(), csv, None)
        .unwrap();
    let view = SheetView::read(&out, SHEET1);
    assert_eq!(
        view.merges,
        vec!["A1:D1", "A8:A9", "B4:D4", "B8:B9", "C8:C9"]
    );
}

#[test]
fn overview_round_trips_verbatim() {
    let overview = "  첫 줄 <tag> & \"quoted\"\n둘째 줄  ";
    let out = engine()
        .populate(
            TemplateKind::FeatureList,
            &feature_list_template(),
            "대분류,중분류,소분류,기능 설명\nA,1,x,a\n",
            Some(overview),
        )
        .unwrap();
    assert_eq!(engine().extract_overview(&out).unwrap(), overview);

    let parsed = engine().parse_rows(TemplateKind::FeatureList, &out).unwrap();
    assert_eq!(parsed.context.project_overview.as_deref(), Some(overview));
    assert_eq!(parsed.context.overview_sheet_name.as_deref(), Some("기능리스트"));
}

#[test]
fn overview_is_left_alone_when_not_given() {
    let out = populate(&feature_list_template(), "대분류,중분류,소분류,기능 설명\nA,1,x,a\n");
    assert_eq!(engine().extract_overview(&out).unwrap(), "기존 개요");
}

#[test]
fn overview_prefers_a_dedicated_sheet() {
    let main = SheetXml::new()
        .text("A7", "대분류")
        .text("B7", "중분류")
        .text("C7", "소분류")
        .text("D7", "기능 설명");
    let cover = SheetXml::new().text("A4", "개요");
    let workbook = WorkbookBuilder::new()
        .sheet("기능리스트", main.build())
        .sheet("개요", cover.build())
        .build();

    let out = engine()
        .populate(
            TemplateKind::FeatureList,
            &workbook,
            "대분류,중분류,소분류,기능 설명\nA,1,x,a\n",
            Some("새 개요"),
        )
        .unwrap();
    let cover = SheetView::read(&out, "xl/worksheets/sheet2.xml");
    assert_eq!(cover.text("B4"), "새 개요");
    assert_eq!(cover.dimension.as_deref(), Some("B4"));
    let main = SheetView::read(&out, SHEET1);
    assert_eq!(main.text("B4"), "");
    assert_eq!(main.text("A8"), "A");
}

fn testcase_template() -> Vec<u8> {
    let labels = [
        "대분류",
        "중분류",
        "소분류",
        "테스트 케이스 ID",
        "테스트 시나리오",
        "입력(사전조건 포함)",
        "기대 출력(사후조건 포함)",
        "테스트 결과",
        "상세 테스트 결과",
        "비고",
    ];
    let mut sheet = SheetXml::new().text("A1", "테스트케이스").text("B4", "unchanged");
    for (idx, label) in labels.iter().enumerate() {
        let col = qadoc_model::col_to_name(idx as u32);
        sheet = sheet.text(&format!("{col}5"), label);
    }
    WorkbookBuilder::new()
        .sheet("테스트케이스", sheet.build())
        .build()
}

#[test]
fn testcase_template_ignores_overview_and_accepts_synonym_headers() {
    let csv = "대분류,중분류,소분류,TC_ID,테스트 시나리오(상세),입력(사전조건 포함),기대 출력(사후조건 포함),테스트 결과,상세 테스트 결과,비고\n\
               로그인,정상,,TC-001,올바른 계정,id/pw,성공,,,\n\
               로그인,정상,,TC-002,자동 로그인,token,성공,,,\n";
    let out = engine()
        .populate(TemplateKind::Testcase, &testcase_template(), csv, Some("ignored"))
        .unwrap();
    let view = SheetView::read(&out, SHEET1);

    assert_eq!(view.text("B4"), "unchanged");
    assert_eq!(view.merges, vec!["A6:A7", "B6:B7"]);
    assert_eq!(view.text("D6"), "TC-001");
    assert_eq!(view.text("E7"), "자동 로그인");
    assert_eq!(view.text("G6"), "성공");
}

fn report_template() -> Vec<u8> {
    let labels = [
        "순번",
        "시험환경 OS",
        "결함 요약",
        "결함 정도",
        "발생 빈도",
        "품질 특성",
        "결함 설명",
        "업체 응답",
        "수정여부",
        "비고",
    ];
    let mut sheet = SheetXml::new();
    for (idx, label) in labels.iter().enumerate() {
        let col = qadoc_model::col_to_name(idx as u32);
        sheet = sheet.text(&format!("{col}5"), label);
    }
    WorkbookBuilder::new()
        .sheet("결함리포트", sheet.build())
        .build()
}

#[test]
fn security_report_renumbers_rows_and_never_merges() {
    let csv = "순번,시험환경 OS,결함 요약,결함 정도\n9,Windows,a,H\n9,Windows,b,H\n";
    let out = engine()
        .populate(TemplateKind::SecurityReport, &report_template(), csv, None)
        .unwrap();
    let view = SheetView::read(&out, SHEET1);
    assert_eq!(view.text("A6"), "1");
    assert_eq!(view.text("A7"), "2");
    assert_eq!(view.text("B7"), "Windows");
    assert!(view.merges.is_empty());

    let out = engine()
        .populate(TemplateKind::DefectReport, &report_template(), csv, None)
        .unwrap();
    let view = SheetView::read(&out, SHEET1);
    assert_eq!(view.text("A6"), "9");
    assert_eq!(view.text("A7"), "9");
}

#[test]
fn header_with_one_damaged_label_is_still_found() {
    let sheet = SheetXml::new()
        .text("A3", "대분류")
        .text("B3", "중분류 (2단계)")
        .text("C3", "---")
        .text("D3", "기능 설명");
    let workbook = WorkbookBuilder::new().sheet("기능리스트", sheet.build()).build();
    let out = populate(&workbook, "대분류,중분류,소분류,기능 설명\nA,1,x,a\n");
    let view = SheetView::read(&out, SHEET1);
    assert_eq!(view.text("A4"), "A");
    assert_eq!(view.text("C4"), "x");
}

#[test]
fn header_with_two_damaged_labels_falls_back_to_default_row() {
    let sheet = SheetXml::new()
        .text("A3", "대분류")
        .text("B3", "???")
        .text("C3", "---")
        .text("D3", "기능 설명");
    let workbook = WorkbookBuilder::new().sheet("기능리스트", sheet.build()).build();
    let out = populate(&workbook, "대분류,중분류,소분류,기능 설명\nA,1,x,a\n");
    let view = SheetView::read(&out, SHEET1);
    assert_eq!(view.text("A4"), "");
    assert_eq!(view.text("A8"), "A");
    assert_eq!(view.text("A3"), "대분류");
}

#[test]
fn parse_rows_reads_back_what_populate_wrote() {
    let csv = "대분류,중분류,소분류,기능 설명\n회원,가입,이메일,이메일로 가입\n회원,가입,소셜,소셜 로그인\n회원,탈퇴,,탈퇴 처리\n";
    let out = populate(&feature_list_template(), csv);
    let parsed = engine().parse_rows(TemplateKind::FeatureList, &out).unwrap();

    assert_eq!(parsed.context.sheet_name, "기능리스트");
    assert_eq!(parsed.context.start_row, 8);
    assert_eq!(parsed.context.header_row, Some(7));
    assert_eq!(parsed.context.first_data_row, Some(8));
    assert_eq!(
        parsed.context.headers,
        vec!["대분류", "중분류", "소분류", "기능 설명"]
    );
    assert_eq!(parsed.context.project_overview.as_deref(), Some("기존 개요"));
    assert_eq!(
        parsed.records[1],
        DataRecord::from_pairs([
            ("대분류", "회원"),
            ("중분류", "가입"),
            ("소분류", "소셜"),
            ("기능 설명", "소셜 로그인"),
        ])
    );
    assert_eq!(
        engine()
            .build_csv(TemplateKind::FeatureList, &parsed.records)
            .unwrap(),
        csv
    );

    let json = serde_json::to_value(&parsed).unwrap();
    assert_eq!(json["context"]["sheetName"], "기능리스트");
    assert_eq!(json["records"][2]["기능 설명"], "탈퇴 처리");
}

#[test]
fn malformed_inputs_surface_typed_errors() {
    let err = engine()
        .populate(TemplateKind::FeatureList, b"not a zip", "대분류\nA\n", None)
        .unwrap_err();
    assert!(matches!(err, TemplateError::MalformedWorkbook(XlsxError::Zip(_))), "{err}");

    let err = engine()
        .populate(
            TemplateKind::FeatureList,
            &feature_list_template(),
            "대분류,중분류\n\"broken,x\n",
            None,
        )
        .unwrap_err();
    assert!(
        matches!(err, TemplateError::InvalidCsv(RecordsError::UnbalancedQuote { .. })),
        "{err}"
    );

    let broken_sheet = WorkbookBuilder::new()
        .sheet(
            "기능리스트",
            r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"/>"#
                .to_string(),
        )
        .build();
    let err = engine()
        .populate(TemplateKind::FeatureList, &broken_sheet, "대분류\nA\n", None)
        .unwrap_err();
    assert!(matches!(err, TemplateError::MalformedWorkbook(XlsxError::Invalid(_))), "{err}");
}

#[test]
fn unmatched_sheet_names_fall_back_to_first_sheet() {
    let sheet = SheetXml::new()
        .text("A7", "대분류")
        .text("B7", "중분류")
        .text("C7", "소분류")
        .text("D7", "기능 설명");
    let workbook = WorkbookBuilder::new()
        .sheet("Sheet1", sheet.build())
        .sheet("Sheet2", SheetXml::new().build())
        .build();
    let out = populate(&workbook, "대분류,중분류,소분류,기능 설명\nA,1,x,a\n");
    assert_eq!(SheetView::read(&out, SHEET1).text("A8"), "A");
    assert_eq!(
        zip_part(&out, "xl/worksheets/sheet2.xml"),
        zip_part(&workbook, "xl/worksheets/sheet2.xml")
    );
}

#[test]
fn overview_naming_the_column_labels_does_not_move_the_header() {
    let overview = "대분류·중분류·소분류 기준으로 기능 설명을 정리한 문서";
    let template = feature_list_template();
    let first = engine()
        .populate(
            TemplateKind::FeatureList,
            &template,
            "대분류,중분류,소분류,기능 설명\n회원,가입,이메일,이메일 가입\n회원,가입,소셜,소셜 로그인\n",
            Some(overview),
        )
        .unwrap();

    let parsed = engine().parse_rows(TemplateKind::FeatureList, &first).unwrap();
    assert_eq!(parsed.context.header_row, Some(7));
    assert_eq!(parsed.context.start_row, 8);
    assert_eq!(parsed.context.project_overview.as_deref(), Some(overview));
    assert_eq!(parsed.records.len(), 2);

    let second = populate(&first, "대분류,중분류,소분류,기능 설명\n주문,결제,,카드 결제\n");
    let before = SheetView::read(&template, SHEET1);
    let after = SheetView::read(&second, SHEET1);
    for a1 in ["A7", "B7", "C7", "D7"] {
        assert!(!after.text(a1).is_empty(), "{a1} was cleared");
        assert_eq!(after.text(a1), before.text(a1));
    }
    assert_eq!(after.text("A5"), "");
    assert_eq!(after.text("A8"), "주문");
    assert_eq!(after.text("A9"), "");
    assert_eq!(engine().extract_overview(&second).unwrap(), overview);
}

#[test]
fn overview_inside_the_data_block_is_rejected() {
    let sheet = SheetXml::new()
        .text("A3", "대분류")
        .text("B3", "중분류")
        .text("C3", "소분류")
        .text("D3", "기능 설명");
    let workbook = WorkbookBuilder::new().sheet("기능리스트", sheet.build()).build();
    let csv = "대분류,중분류,소분류,기능 설명\n회원,가입,이메일,이메일로 가입\n";

    let err = engine()
        .populate(TemplateKind::FeatureList, &workbook, csv, Some("개요"))
        .unwrap_err();
    match err {
        TemplateError::OverviewInDataBlock {
            sheet,
            cell,
            data_start_row,
        } => {
            assert_eq!(sheet, "기능리스트");
            assert_eq!(cell, "B4");
            assert_eq!(data_start_row, 4);
        }
        other => panic!("unexpected error {other:?}"),
    }

    let out = populate(&workbook, csv);
    assert_eq!(SheetView::read(&out, SHEET1).text("B4"), "가입");
    let parsed = engine().parse_rows(TemplateKind::FeatureList, &out).unwrap();
    assert_eq!(parsed.context.start_row, 4);
    assert_eq!(parsed.context.project_overview, None);
    assert_eq!(parsed.records[0].get("중분류"), "가입");
    assert_eq!(engine().extract_overview(&out).unwrap(), "");
}
