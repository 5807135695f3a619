//! 解析結果の型定義
//!
//! CLIとライブラリで共有される型:
//! - SkinAnalysisResult: 1つの分析ポイントの解析結果
//! - OverallReport: 複数ポイントを比較した総合経過分析レポート
//! - RunRecord: 実行結果の保存形式
//!
//! JSONキーはモデルが出力する日本語キーをそのまま使う。
//! セクションはすべて必須（欠けていればデシリアライズエラー）。

use serde::{Deserialize, Serialize};

/// 肌年齢
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkinAgeReport {
    #[serde(rename = "推定肌年齢")]
    pub estimated_age: String,
    #[serde(rename = "所見")]
    pub findings: String,
}

/// 評価と所見（ハリ・毛穴・キメ・赤み）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationAndFindings {
    #[serde(rename = "評価")]
    pub evaluation: String,
    #[serde(rename = "所見")]
    pub findings: String,
}

/// 評価と種類別所見（シミ・シワ）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedFindings {
    #[serde(rename = "評価")]
    pub evaluation: String,
    #[serde(rename = "種類と所見")]
    pub types_and_findings: String,
}

/// 主要寸法（ミリ単位の推定値）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MainDimensions {
    #[serde(rename = "顔全体の縦の長さ（髪の生え際～顎先）")]
    pub face_length: String,
    #[serde(rename = "顔全体の横の最大幅")]
    pub face_width: String,
    #[serde(rename = "額の幅（こめかみ間）")]
    pub forehead_width: String,
    #[serde(rename = "頬骨の幅")]
    pub cheekbone_width: String,
    #[serde(rename = "エラの幅")]
    pub jaw_width: String,
    #[serde(rename = "顎先の幅")]
    pub chin_width: String,
}

impl MainDimensions {
    /// (JSONキー, 値) を宣言順に返す
    pub fn entries(&self) -> [(&'static str, &str); 6] {
        [
            ("顔全体の縦の長さ（髪の生え際～顎先）", self.face_length.as_str()),
            ("顔全体の横の最大幅", self.face_width.as_str()),
            ("額の幅（こめかみ間）", self.forehead_width.as_str()),
            ("頬骨の幅", self.cheekbone_width.as_str()),
            ("エラの幅", self.jaw_width.as_str()),
            ("顎先の幅", self.chin_width.as_str()),
        ]
    }
}

/// 顔のタイプ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceType {
    #[serde(rename = "推定")]
    pub estimate: String,
    #[serde(rename = "根拠")]
    pub rationale: String,
}

/// 左右対称性
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symmetry {
    #[serde(rename = "所見")]
    pub findings: String,
}

/// 輪郭分析
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContourAnalysisReport {
    #[serde(rename = "主要寸法")]
    pub main_dimensions: MainDimensions,
    #[serde(rename = "顔のタイプ")]
    pub face_type: FaceType,
    #[serde(rename = "左右対称性")]
    pub symmetry: Symmetry,
}

/// 1つの分析ポイントの解析結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkinAnalysisResult {
    #[serde(rename = "重要事項")]
    pub key_findings: String,
    #[serde(rename = "肌年齢")]
    pub skin_age: SkinAgeReport,
    #[serde(rename = "ハリ（弾力）")]
    pub firmness: EvaluationAndFindings,
    #[serde(rename = "毛穴（なめらかさ）")]
    pub pores: EvaluationAndFindings,
    #[serde(rename = "キメ")]
    pub texture: EvaluationAndFindings,
    #[serde(rename = "シミ")]
    pub spots: TypedFindings,
    #[serde(rename = "シワ")]
    pub wrinkles: TypedFindings,
    #[serde(rename = "赤み")]
    pub redness: EvaluationAndFindings,
    #[serde(rename = "輪郭分析")]
    pub contour: ContourAnalysisReport,
    #[serde(rename = "総合所見")]
    pub overall_remarks: String,
}

/// 総合経過分析レポートの本文
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverallReportContent {
    #[serde(rename = "概要")]
    pub summary: String,
    #[serde(rename = "改善点")]
    pub improvements: String,
    #[serde(rename = "要注意点または悪化点")]
    pub concerns: String,
    #[serde(rename = "観察された主な傾向")]
    pub trends: String,
    #[serde(rename = "推奨事項")]
    pub recommendations: String,
}

/// 総合経過分析レポート
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverallReport {
    #[serde(rename = "総合経過分析レポート")]
    pub content: OverallReportContent,
}

/// 総合分析の入力: 解析結果とその時期/ラベル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledResult {
    pub result: SkinAnalysisResult,
    pub label: String,
}

/// 保存用の分析ポイント要約
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointSummary {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub files: Vec<String>,
}

/// 1回の実行結果（`--output` で保存し、`export` の入力になる）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub generated_at: String,
    pub points: Vec<PointSummary>,
    pub results: Vec<SkinAnalysisResult>,
    #[serde(default)]
    pub overall: Option<OverallReport>,
}

impl RunRecord {
    /// i番目の結果に対応するラベル（ポイント情報が欠けていれば「時期 n」）
    pub fn label_for(&self, index: usize) -> String {
        self.points
            .get(index)
            .map(|p| p.label.clone())
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| format!("時期 {}", index + 1))
    }
}
