//! レポート表示用の整形
//!
//! 解析結果・総合レポートを (見出し, 項目一覧) に平坦化し、
//! 端末表示用テキストとExcel出力で共有する。

use crate::types::{OverallReport, SkinAnalysisResult};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref PAREN_RE: Regex = Regex::new(r"（.*?）").expect("paren regex");
}

/// 空欄の表示
pub const NO_INFORMATION: &str = "情報なし";

/// 見出し付きの項目群
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub title: String,
    /// (項目名, 値)。項目名が空なら本文のみ
    pub entries: Vec<(String, String)>,
}

impl Section {
    fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            entries: Vec::new(),
        }
    }

    fn push(mut self, key: &str, value: &str) -> Self {
        self.entries.push((key.to_string(), value.to_string()));
        self
    }
}

/// 寸法キーから全角括弧の補足を除く
///
/// ```
/// use skin_ai_common::report::dimension_label;
///
/// assert_eq!(dimension_label("額の幅（こめかみ間）"), "額の幅");
/// ```
pub fn dimension_label(key: &str) -> String {
    PAREN_RE.replace_all(key, "").into_owned()
}

/// 個別分析結果をセクションに分解
pub fn result_sections(result: &SkinAnalysisResult) -> Vec<Section> {
    let contour = &result.contour;

    let mut dimensions = Section::new("主要寸法 (ミリ単位での推定値)");
    for (key, value) in contour.main_dimensions.entries() {
        dimensions = dimensions.push(&dimension_label(key), value);
    }

    vec![
        Section::new("重要事項").push("", &result.key_findings),
        Section::new("肌年齢")
            .push("推定肌年齢", &result.skin_age.estimated_age)
            .push("所見", &result.skin_age.findings),
        Section::new("ハリ（弾力）")
            .push("評価", &result.firmness.evaluation)
            .push("所見", &result.firmness.findings),
        Section::new("毛穴（なめらかさ）")
            .push("評価", &result.pores.evaluation)
            .push("所見", &result.pores.findings),
        Section::new("キメ")
            .push("評価", &result.texture.evaluation)
            .push("所見", &result.texture.findings),
        Section::new("シミ")
            .push("評価", &result.spots.evaluation)
            .push("種類と所見", &result.spots.types_and_findings),
        Section::new("シワ")
            .push("評価", &result.wrinkles.evaluation)
            .push("種類と所見", &result.wrinkles.types_and_findings),
        Section::new("赤み")
            .push("評価", &result.redness.evaluation)
            .push("所見", &result.redness.findings),
        dimensions,
        Section::new("顔のタイプ")
            .push("推定", &contour.face_type.estimate)
            .push("根拠", &contour.face_type.rationale),
        Section::new("左右対称性").push("所見", &contour.symmetry.findings),
        Section::new("総合所見").push("", &result.overall_remarks),
    ]
}

/// 総合経過分析レポートをセクションに分解（空欄は「情報なし」）
pub fn overall_sections(report: &OverallReport) -> Vec<Section> {
    let c = &report.content;
    [
        ("概要", &c.summary),
        ("改善点", &c.improvements),
        ("要注意点または悪化点", &c.concerns),
        ("観察された主な傾向", &c.trends),
        ("推奨事項", &c.recommendations),
    ]
    .into_iter()
    .map(|(title, value)| {
        let value = if value.trim().is_empty() {
            NO_INFORMATION
        } else {
            value.as_str()
        };
        Section::new(title).push("", value)
    })
    .collect()
}

fn render_sections(out: &mut String, sections: &[Section]) {
    for section in sections {
        out.push_str(&format!("\n■ {}\n", section.title));
        for (key, value) in &section.entries {
            if key.is_empty() {
                for line in value.lines() {
                    out.push_str(&format!("  {}\n", line));
                }
            } else {
                out.push_str(&format!("  {}: {}\n", key, value));
            }
        }
    }
}

/// 個別分析結果の表示テキスト
pub fn render_result(index: usize, label: &str, result: &SkinAnalysisResult) -> String {
    let mut out = format!("=== 分析結果 #{}: {} ===\n", index + 1, label);
    render_sections(&mut out, &result_sections(result));
    out
}

/// 総合経過分析レポートの表示テキスト
pub fn render_overall(report: &OverallReport) -> String {
    let mut out = String::from("=== 総合経過分析レポート ===\n");
    render_sections(&mut out, &overall_sections(report));
    out
}
