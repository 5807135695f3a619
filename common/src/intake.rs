//! 画像取り込み
//!
//! 選択されたファイルを検証し、API送信用にBase64化する。

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// 1回の選択で受け付ける最大ファイル数
pub const DEFAULT_MAX_FILES: usize = 10;

/// 取り込み前のファイル
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    /// プレビュー用のローカルパス等（画像のみ使用）
    pub source: Option<String>,
}

/// 取り込み済みファイル
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakeFile {
    /// セッション内で一意なID
    pub id: String,
    pub name: String,
    pub mime_type: String,
    /// Base64（標準アルファベット、data URLプレフィックスなし）
    pub base64: String,
    pub size: usize,
    /// ローカルプレビュー（動画はNone）
    pub preview: Option<String>,
}

impl IntakeFile {
    /// 元のバイト列に戻す
    pub fn decode_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.base64)
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    /// 拡張子（ファイル名に無ければMIMEのサブタイプ）
    pub fn extension(&self) -> String {
        match self.name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_lowercase(),
            _ => self
                .mime_type
                .split('/')
                .nth(1)
                .unwrap_or("bin")
                .to_string(),
        }
    }
}

/// 取り込み結果
#[derive(Debug, Clone, Default)]
pub struct IntakeOutcome {
    pub files: Vec<IntakeFile>,
    /// スキップ等の警告（改行区切りで表示する想定）
    pub warnings: Vec<String>,
}

/// 画像または動画のMIMEタイプか
pub fn is_supported_mime(mime_type: &str) -> bool {
    mime_type.starts_with("image/") || mime_type.starts_with("video/")
}

/// ファイルを検証して取り込む
///
/// `next_id` はセッション単位のカウンタ。受け付けたファイルごとに進む。
pub fn intake_files(
    candidates: Vec<CandidateFile>,
    max_files: usize,
    next_id: &mut u64,
) -> IntakeOutcome {
    let mut outcome = IntakeOutcome::default();
    let mut candidates = candidates;

    if candidates.len() > max_files {
        outcome.warnings.push(format!(
            "一度に選択できるファイルは{max}個までです。最初の{max}個のファイルのみが選択されました。",
            max = max_files
        ));
        candidates.truncate(max_files);
    }

    for file in candidates {
        if !is_supported_mime(&file.mime_type) {
            outcome.warnings.push(format!(
                "{} は画像または動画ファイルではありません。スキップされました。",
                file.name
            ));
            continue;
        }
        if file.bytes.is_empty() {
            outcome
                .warnings
                .push(format!("{} の処理中にエラーが発生しました。", file.name));
            continue;
        }

        let preview = if file.mime_type.starts_with("image/") {
            file.source.clone()
        } else {
            None
        };

        outcome.files.push(IntakeFile {
            id: format!("file-{}", *next_id),
            name: file.name,
            mime_type: file.mime_type,
            base64: STANDARD.encode(&file.bytes),
            size: file.bytes.len(),
            preview,
        });
        *next_id += 1;
    }

    outcome
}
