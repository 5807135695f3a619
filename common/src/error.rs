//! エラー型定義

use thiserror::Error;

/// 共通エラー型
#[derive(Error, Debug)]
pub enum Error {
    #[error("APIからのレスポンスが空です。")]
    EmptyResponse,

    /// JSONとして解釈できない（excerptは先頭1000文字）
    #[error("APIからのJSONレスポンスの解析に失敗しました。内容: {excerpt}")]
    Parse { excerpt: String },

    /// JSONとしては正しいが期待する構造と一致しない
    #[error("APIレスポンスの構造が不正です: {0}")]
    Schema(String),

    #[error("{0}")]
    Validation(String),
}

/// Result型エイリアス
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_empty_response() {
        assert_eq!(Error::EmptyResponse.to_string(), "APIからのレスポンスが空です。");
    }

    #[test]
    fn test_error_display_parse_contains_excerpt() {
        let error = Error::Parse { excerpt: "not json".to_string() };
        let display = format!("{}", error);
        assert!(display.contains("解析に失敗"));
        assert!(display.ends_with("内容: not json"));
    }

    #[test]
    fn test_error_display_validation_is_verbatim() {
        let error = Error::Validation("すべての分析ポイントにファイルを選択してください。".to_string());
        assert_eq!(error.to_string(), "すべての分析ポイントにファイルを選択してください。");
    }

    #[test]
    fn test_error_display_schema() {
        let error = Error::Schema("missing field `肌年齢`".to_string());
        assert_eq!(error.to_string(), "APIレスポンスの構造が不正です: missing field `肌年齢`");
    }
}
