//! Gemini API連携
//!
//! 個別分析: 引き継ぎ指示（任意）+ システム指示 + 画像/動画
//! 総合分析: 総合分析指示 + 導入文 + ラベル付き結果

pub mod types;

use crate::config::{Config, DEFAULT_MODEL};
use crate::error::{Result, SkinAiError};
use crate::workflow::SkinAnalyzer;
use async_trait::async_trait;
use skin_ai_common::parser::{excerpt, parse_analysis_response, parse_overall_response};
use skin_ai_common::prompts::{
    build_chaining_preamble, build_labeled_result_block, OVERALL_INTRODUCTION,
    OVERALL_SYSTEM_INSTRUCTION, SYSTEM_INSTRUCTION,
};
use skin_ai_common::{IntakeFile, LabeledResult, OverallReport, SkinAnalysisResult};
pub use types::{
    Content, GeminiRequest, GeminiResponse, GenerationConfig, InlineData, Part,
    GENERATION_CONFIG, OVERALL_GENERATION_CONFIG,
};

pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// エラーメッセージに含めるレスポンス本文の最大文字数
const ERROR_BODY_LIMIT: usize = 500;

/// 個別分析リクエストを組み立てる
pub fn build_point_request(files: &[IntakeFile], previous: Option<&str>) -> Result<GeminiRequest> {
    if files.is_empty() {
        return Err(SkinAiError::NoFiles);
    }

    let mut parts = Vec::with_capacity(files.len() + 2);
    if let Some(previous) = previous {
        parts.push(Part::text(build_chaining_preamble(previous)));
    }
    parts.push(Part::text(SYSTEM_INSTRUCTION));
    for file in files {
        parts.push(Part::InlineData {
            inline_data: InlineData {
                mime_type: file.mime_type.clone(),
                data: file.base64.clone(),
            },
        });
    }

    Ok(GeminiRequest {
        contents: vec![Content { parts }],
        generation_config: GENERATION_CONFIG,
    })
}

/// 総合経過分析リクエストを組み立てる
pub fn build_overall_request(items: &[LabeledResult]) -> Result<GeminiRequest> {
    if items.len() < 2 {
        return Err(SkinAiError::Validation(
            "経過分析のためには、少なくとも2つの分析結果が必要です。".into(),
        ));
    }

    let mut parts = vec![
        Part::text(OVERALL_SYSTEM_INSTRUCTION),
        Part::text(OVERALL_INTRODUCTION),
    ];
    parts.extend(
        items
            .iter()
            .map(|item| Part::text(build_labeled_result_block(&item.label, &item.result))),
    );

    Ok(GeminiRequest {
        contents: vec![Content { parts }],
        generation_config: OVERALL_GENERATION_CONFIG,
    })
}

pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    overall_model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.into(),
            overall_model: DEFAULT_MODEL.into(),
            base_url: GEMINI_API_BASE.into(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config.get_api_key()?).with_models(&config.model, &config.overall_model))
    }

    pub fn with_models(mut self, model: &str, overall_model: &str) -> Self {
        self.model = model.to_string();
        self.overall_model = overall_model.to_string();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/{}:generateContent", self.base_url.trim_end_matches('/'), model)
    }

    /// Gemini API呼び出し（共通処理）
    ///
    /// 候補テキストを返す。空でもエラーにはしない（パーサーで判定）。
    async fn call_gemini_api(&self, model: &str, request: &GeminiRequest) -> Result<String> {
        if self.api_key.trim().is_empty() {
            return Err(SkinAiError::MissingApiKey);
        }

        let body = serde_json::to_vec(request)?;
        tracing::debug!(model, bytes = body.len(), "gemini request");

        let response = self
            .http
            .post(self.endpoint(model))
            .query(&[("key", self.api_key.as_str())])
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SkinAiError::HttpStatus {
                status: status.as_u16(),
                body: excerpt(&text, ERROR_BODY_LIMIT),
            });
        }

        let payload: GeminiResponse = response.json().await?;
        let text = payload.text();
        tracing::debug!(chars = text.chars().count(), "gemini response");
        Ok(text)
    }
}

#[async_trait]
impl SkinAnalyzer for GeminiClient {
    async fn analyze_point(
        &self,
        files: &[IntakeFile],
        previous: Option<&str>,
    ) -> Result<SkinAnalysisResult> {
        if self.api_key.trim().is_empty() {
            return Err(SkinAiError::MissingApiKey);
        }
        let request = build_point_request(files, previous)?;

        let outcome = match self.call_gemini_api(&self.model, &request).await {
            Ok(text) => parse_analysis_response(&text).map_err(SkinAiError::from),
            Err(e) => Err(e),
        };
        outcome.map_err(|e| SkinAiError::ApiCall(e.to_string()))
    }

    async fn generate_overall(&self, items: &[LabeledResult]) -> Result<OverallReport> {
        if self.api_key.trim().is_empty() {
            return Err(SkinAiError::MissingApiKey);
        }
        let request = build_overall_request(items)?;

        let outcome = match self.call_gemini_api(&self.overall_model, &request).await {
            Ok(text) => parse_overall_response(&text).map_err(SkinAiError::from),
            Err(e) => Err(e),
        };
        outcome.map_err(|e| SkinAiError::OverallApiCall(e.to_string()))
    }
}
