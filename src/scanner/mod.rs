use crate::error::{Result, SkinAiError};
use skin_ai_common::CandidateFile;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// 拡張子 → MIMEタイプ
const MIME_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("webp", "image/webp"),
    ("heic", "image/heic"),
    ("gif", "image/gif"),
    ("mp4", "video/mp4"),
    ("mov", "video/quicktime"),
    ("webm", "video/webm"),
];

pub const UNKNOWN_MIME: &str = "application/octet-stream";

pub fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    MIME_TYPES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
        .unwrap_or(UNKNOWN_MIME)
}

/// ファイルまたはフォルダ直下のファイルを列挙（ファイル名順）
pub fn collect_paths(target: &Path) -> Result<Vec<PathBuf>> {
    if !target.exists() {
        return Err(SkinAiError::FileNotFound(target.display().to_string()));
    }

    if target.is_file() {
        return Ok(vec![target.to_path_buf()]);
    }

    let mut paths: Vec<PathBuf> = WalkDir::new(target)
        .max_depth(1) // 直下のみ（再帰しない）
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .map(|e| e.into_path())
        .collect();

    // ファイル名でソート
    paths.sort_by_key(|p| p.file_name().map(|n| n.to_os_string()));

    Ok(paths)
}

/// 取り込み候補として読み込む
///
/// MIMEタイプは拡張子から推定する。画像・動画以外は取り込み時にスキップされる。
pub fn load_candidates(target: &Path) -> Result<Vec<CandidateFile>> {
    collect_paths(target)?
        .into_iter()
        .map(|path| {
            let bytes = std::fs::read(&path)?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            Ok::<_, SkinAiError>(CandidateFile {
                name,
                mime_type: mime_type_for(&path).to_string(),
                bytes,
                source: Some(path.display().to_string()),
            })
        })
        .collect()
}
