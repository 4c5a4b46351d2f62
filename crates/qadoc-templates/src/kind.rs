use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use qadoc_model::text::{labels_match, suffix_matches};
use qadoc_model::DataRecord;

use crate::TemplateError;

/// An expected header label plus the other spellings templates use for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnSpec {
    pub label: &'static str,
    pub synonyms: &'static [&'static str],
}

impl ColumnSpec {
    const fn plain(label: &'static str) -> Self {
        Self {
            label,
            synonyms: &[],
        }
    }

    const fn with_synonyms(label: &'static str, synonyms: &'static [&'static str]) -> Self {
        Self { label, synonyms }
    }

    /// The label followed by its synonyms.
    pub fn names(&self) -> impl Iterator<Item = &'static str> {
        std::iter::once(self.label).chain(self.synonyms.iter().copied())
    }
}

/// Static description of one template type.
#[derive(Debug, PartialEq, Eq)]
pub struct TemplateLayout {
    /// Expected columns in schema order. Column `i` defaults to sheet column `i` (`A` = 0).
    pub columns: &'static [ColumnSpec],
    /// Labels of the hierarchical (vertically merged) columns, outermost first.
    pub hierarchy: &'static [&'static str],
    /// First data row when no header row can be found.
    pub default_start_row: u32,
    /// Sheet names the data block is looked up under, in preference order.
    pub sheet_candidates: &'static [&'static str],
    /// Column rewritten as `1..=N` instead of taking the input value.
    pub sequence_column: Option<&'static str>,
    pub has_overview: bool,
    /// Folder the template lives in on the shared drive.
    pub folder_name: &'static str,
    /// File-name suffix of the template (after the project code prefix).
    pub file_suffix: &'static str,
}

impl TemplateLayout {
    pub fn labels(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.label).collect()
    }

    pub fn column_index(&self, label: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.label == label)
    }

    /// Schema indices of the hierarchical columns, outermost first.
    pub fn hierarchy_indices(&self) -> Vec<usize> {
        self.hierarchy
            .iter()
            .filter_map(|label| self.column_index(label))
            .collect()
    }

    /// Value of schema column `idx` in `record`, falling back to the column's synonyms.
    pub fn value_of<'r>(&self, record: &'r DataRecord, idx: usize) -> &'r str {
        let Some(column) = self.columns.get(idx) else {
            return "";
        };
        column
            .names()
            .map(|name| record.get(name))
            .find(|value| !value.is_empty())
            .unwrap_or("")
    }

    pub fn matches_sheet_name(&self, name: &str) -> bool {
        self.sheet_candidates
            .iter()
            .any(|candidate| labels_match(name, candidate))
    }
}

const HIERARCHY: &[&str] = &["대분류", "중분류", "소분류"];

const FEATURE_LIST_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::plain("대분류"),
    ColumnSpec::plain("중분류"),
    ColumnSpec::plain("소분류"),
    ColumnSpec::with_synonyms("기능 설명", &["기능 개요"]),
];

const TESTCASE_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::plain("대분류"),
    ColumnSpec::plain("중분류"),
    ColumnSpec::plain("소분류"),
    ColumnSpec::with_synonyms("테스트 케이스 ID", &["TC_ID", "테스트케이스 ID"]),
    ColumnSpec::with_synonyms("테스트 시나리오", &["테스트 시나리오(상세)"]),
    ColumnSpec::plain("입력(사전조건 포함)"),
    ColumnSpec::plain("기대 출력(사후조건 포함)"),
    ColumnSpec::plain("테스트 결과"),
    ColumnSpec::plain("상세 테스트 결과"),
    ColumnSpec::plain("비고"),
];

const REPORT_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::plain("순번"),
    ColumnSpec::plain("시험환경 OS"),
    ColumnSpec::plain("결함 요약"),
    ColumnSpec::plain("결함 정도"),
    ColumnSpec::plain("발생 빈도"),
    ColumnSpec::plain("품질 특성"),
    ColumnSpec::plain("결함 설명"),
    ColumnSpec::plain("업체 응답"),
    ColumnSpec::plain("수정여부"),
    ColumnSpec::plain("비고"),
];

const REPORT_SHEETS: &[&str] = &["결함리포트", "결함 리포트", "defect report"];

static FEATURE_LIST: TemplateLayout = TemplateLayout {
    columns: FEATURE_LIST_COLUMNS,
    hierarchy: HIERARCHY,
    default_start_row: 8,
    sheet_candidates: &["기능리스트", "기능 리스트", "feature list"],
    sequence_column: None,
    has_overview: true,
    folder_name: "가.계획",
    file_suffix: "기능리스트 v1.0.xlsx",
};

static TESTCASE: TemplateLayout = TemplateLayout {
    columns: TESTCASE_COLUMNS,
    hierarchy: HIERARCHY,
    default_start_row: 6,
    sheet_candidates: &["테스트케이스", "테스트 케이스", "testcase", "test cases"],
    sequence_column: None,
    has_overview: false,
    folder_name: "나.설계",
    file_suffix: "테스트케이스.xlsx",
};

static DEFECT_REPORT: TemplateLayout = TemplateLayout {
    columns: REPORT_COLUMNS,
    hierarchy: &[],
    default_start_row: 6,
    sheet_candidates: REPORT_SHEETS,
    sequence_column: None,
    has_overview: false,
    folder_name: "다.수행",
    file_suffix: "결함리포트 v1.0.xlsx",
};

static SECURITY_REPORT: TemplateLayout = TemplateLayout {
    columns: REPORT_COLUMNS,
    hierarchy: &[],
    default_start_row: 6,
    sheet_candidates: REPORT_SHEETS,
    sequence_column: Some("순번"),
    has_overview: false,
    folder_name: "다.수행",
    file_suffix: "결함리포트 v1.0.xlsx",
};

/// The template types the engine knows how to populate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TemplateKind {
    FeatureList,
    #[serde(rename = "testcase-generation")]
    Testcase,
    DefectReport,
    SecurityReport,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 4] = [
        TemplateKind::FeatureList,
        TemplateKind::Testcase,
        TemplateKind::DefectReport,
        TemplateKind::SecurityReport,
    ];

    pub const fn id(self) -> &'static str {
        match self {
            TemplateKind::FeatureList => "feature-list",
            TemplateKind::Testcase => "testcase-generation",
            TemplateKind::DefectReport => "defect-report",
            TemplateKind::SecurityReport => "security-report",
        }
    }

    pub fn layout(self) -> &'static TemplateLayout {
        match self {
            TemplateKind::FeatureList => &FEATURE_LIST,
            TemplateKind::Testcase => &TESTCASE,
            TemplateKind::DefectReport => &DEFECT_REPORT,
            TemplateKind::SecurityReport => &SECURITY_REPORT,
        }
    }

    /// Whether `file_name` is a (possibly project-prefixed) copy of this template.
    pub fn matches_file_name(self, file_name: &str) -> bool {
        suffix_matches(file_name, self.layout().file_suffix)
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for TemplateKind {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        TemplateKind::ALL
            .into_iter()
            .find(|kind| kind.id() == wanted)
            .ok_or_else(|| TemplateError::UnknownTemplate(s.to_string()))
    }
}
