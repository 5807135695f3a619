//! APIレスポンスパーサー
//!
//! Gemini APIのテキスト応答からJSONを取り出し、
//! 解析結果/総合レポートとしてパース・検証する

use crate::error::{Error, Result};
use crate::types::{OverallReport, SkinAnalysisResult};
use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;

/// エラーメッセージに含める応答テキストの最大文字数
pub const EXCERPT_LIMIT: usize = 1000;

lazy_static! {
    static ref FENCE_RE: Regex = Regex::new(r"(?s)^```(\w*)?\s*\n?(.*?)\n?\s*```$")
        .expect("fence regex");
}

/// コードフェンスを除去
///
/// 応答全体が ```lang ... ``` で囲まれている場合のみ中身を返す。
/// それ以外はトリムしたテキストをそのまま返す。
///
/// # Examples
/// ```
/// use skin_ai_common::strip_fence;
///
/// assert_eq!(strip_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
/// assert_eq!(strip_fence("  {\"a\": 1} "), "{\"a\": 1}");
/// ```
pub fn strip_fence(response: &str) -> &str {
    let trimmed = response.trim();
    match FENCE_RE.captures(trimmed).and_then(|c| c.get(2)) {
        Some(body) if !body.as_str().is_empty() => body.as_str().trim(),
        _ => trimmed,
    }
}

/// 先頭 `limit` 文字を切り出す（文字境界を守る）
pub fn excerpt(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// フェンス除去 → JSONパース → スキーマ検証
///
/// - 空の応答: `Error::EmptyResponse`
/// - JSONでない: `Error::Parse`（先頭1000文字を含む）
/// - 構造が一致しない: `Error::Schema`
fn parse_validated<T: DeserializeOwned>(response: &str) -> Result<T> {
    if response.trim().is_empty() {
        return Err(Error::EmptyResponse);
    }

    let json_str = strip_fence(response);
    let value: serde_json::Value = serde_json::from_str(json_str).map_err(|_| Error::Parse {
        excerpt: excerpt(json_str, EXCERPT_LIMIT),
    })?;

    serde_json::from_value(value).map_err(|e| Error::Schema(e.to_string()))
}

/// 個別分析レスポンスをパース
pub fn parse_analysis_response(response: &str) -> Result<SkinAnalysisResult> {
    parse_validated(response)
}

/// 総合経過分析レスポンスをパース
pub fn parse_overall_response(response: &str) -> Result<OverallReport> {
    parse_validated(response)
}
