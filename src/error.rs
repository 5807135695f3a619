use thiserror::Error;

#[derive(Error, Debug)]
pub enum SkinAiError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("APIキーが設定されていません。`skin-ai config --set-api-key YOUR_KEY` または環境変数 GEMINI_API_KEY で設定してください")]
    MissingApiKey,

    #[error("データベースが設定されていません（SUPABASE_URL / SUPABASE_ANON_KEY）。保存せずに実行するには --offline を指定してください")]
    MissingBackendConfig,

    #[error("分析セッションがありません。セッションを作成してから分析してください")]
    NoSession,

    #[error("分析するファイルが選択されていません。")]
    NoFiles,

    #[error("ファイルが見つかりません: {0}")]
    FileNotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("Gemini APIエラー: {0}")]
    ApiCall(String),

    #[error("Gemini APIエラー (総合経過分析): {0}")]
    OverallApiCall(String),

    #[error("通信エラー: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("データベースエラー: {0}")]
    Backend(String),

    /// 個別分析の失敗（どのポイントで止まったか）
    #[error("エラー ({name} - {label}): {source}")]
    PointFailed {
        name: String,
        label: String,
        #[source]
        source: Box<SkinAiError>,
    },

    #[error("総合経過分析レポート生成エラー: {0}")]
    OverallFailed(#[source] Box<SkinAiError>),

    #[error("Excel生成エラー: {0}")]
    ExcelGeneration(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Common(#[from] skin_ai_common::Error),
}

pub type Result<T> = std::result::Result<T, SkinAiError>;
