//! 結合テスト共通のヘルパー
#![allow(dead_code)]

use async_trait::async_trait;
use skin_ai_common::types::*;
use skin_ai_common::{CandidateFile, IntakeFile, LabeledResult};
use skin_ai_rust::error::{Result, SkinAiError};
use skin_ai_rust::workflow::SkinAnalyzer;
use std::sync::Mutex;

pub fn sample_result(age: &str) -> SkinAnalysisResult {
    let ef = |e: &str| EvaluationAndFindings {
        evaluation: e.to_string(),
        findings: format!("{}の所見", e),
    };
    SkinAnalysisResult {
        key_findings: "美容的観点からの評価です".to_string(),
        skin_age: SkinAgeReport {
            estimated_age: age.to_string(),
            findings: "年齢相応".to_string(),
        },
        firmness: ef("良好"),
        pores: ef("やや目立つ"),
        texture: ef("整っている"),
        spots: TypedFindings {
            evaluation: "少ない".to_string(),
            types_and_findings: "頬に小さな色素斑".to_string(),
        },
        wrinkles: TypedFindings {
            evaluation: "軽度".to_string(),
            types_and_findings: "目尻に細かい線".to_string(),
        },
        redness: ef("なし"),
        contour: ContourAnalysisReport {
            main_dimensions: MainDimensions {
                face_length: "約190mm".to_string(),
                face_width: "約140mm".to_string(),
                forehead_width: "約120mm".to_string(),
                cheekbone_width: "約135mm".to_string(),
                jaw_width: "約110mm".to_string(),
                chin_width: "約40mm".to_string(),
            },
            face_type: FaceType {
                estimate: "卵型".to_string(),
                rationale: "縦横比のバランス".to_string(),
            },
            symmetry: Symmetry {
                findings: "概ね対称".to_string(),
            },
        },
        overall_remarks: "保湿を継続してください".to_string(),
    }
}

pub fn sample_report() -> OverallReport {
    OverallReport {
        content: OverallReportContent {
            summary: "全体的に改善傾向".to_string(),
            improvements: "キメが整った".to_string(),
            concerns: "目尻のシワがやや増加".to_string(),
            trends: "肌年齢は横ばい".to_string(),
            recommendations: "紫外線対策を継続".to_string(),
        },
    }
}

pub fn image(name: &str) -> CandidateFile {
    CandidateFile {
        name: name.to_string(),
        mime_type: "image/jpeg".to_string(),
        bytes: format!("jpeg:{}", name).into_bytes(),
        source: None,
    }
}

/// 呼び出しを記録する解析器
///
/// n回目（0始まり）の呼び出しは年齢 `{20+n}歳` の結果を返す。
#[derive(Default)]
pub struct FakeAnalyzer {
    /// 各呼び出しの `previous`
    pub calls: Mutex<Vec<Option<String>>>,
    /// 各呼び出しのファイル名
    pub files: Mutex<Vec<Vec<String>>>,
    pub overall_calls: Mutex<Vec<Vec<LabeledResult>>>,
    /// この回数目（0始まり）の呼び出しを失敗させる
    pub fail_at: Option<usize>,
    pub fail_overall: bool,
}

impl FakeAnalyzer {
    pub fn failing_at(index: usize) -> Self {
        Self {
            fail_at: Some(index),
            ..Self::default()
        }
    }

    pub fn failing_overall() -> Self {
        Self {
            fail_overall: true,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn previous_args(&self) -> Vec<Option<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SkinAnalyzer for FakeAnalyzer {
    async fn analyze_point(
        &self,
        files: &[IntakeFile],
        previous: Option<&str>,
    ) -> Result<SkinAnalysisResult> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(previous.map(str::to_string));
            calls.len() - 1
        };
        self.files
            .lock()
            .unwrap()
            .push(files.iter().map(|f| f.name.clone()).collect());

        if self.fail_at == Some(index) {
            return Err(SkinAiError::ApiCall("boom".into()));
        }
        Ok(sample_result(&format!("{}歳", 20 + index)))
    }

    async fn generate_overall(&self, items: &[LabeledResult]) -> Result<OverallReport> {
        self.overall_calls.lock().unwrap().push(items.to_vec());
        if self.fail_overall {
            return Err(SkinAiError::OverallApiCall("quota".into()));
        }
        Ok(sample_report())
    }
}
