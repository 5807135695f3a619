//! 永続化バックエンド
//!
//! テーブル6つとストレージバケット1つ。
//! - SupabaseBackend: PostgREST / Storage REST
//! - MemoryBackend: プロセス内（テスト・--offline）

pub mod memory;
pub mod supabase;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use skin_ai_common::{OverallReport, SkinAnalysisResult};

pub use memory::MemoryBackend;
pub use supabase::SupabaseBackend;

pub const IMAGE_BUCKET: &str = "skin-analysis-images";
pub const ANALYSIS_VERSION: &str = "1.0";
pub const REPORT_VERSION: &str = "1.0";

pub const TABLES: [&str; 6] = [
    "user_profiles",
    "analysis_sessions",
    "analysis_points",
    "uploaded_images",
    "analysis_results",
    "overall_reports",
];

// =============================================
// 行の型
// =============================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub clerk_user_id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image_url: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NewUser {
    pub clerk_user_id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: String,
    pub user_id: Option<String>,
    pub session_name: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointRow {
    pub id: String,
    pub session_id: Option<String>,
    pub name: String,
    pub label: String,
    pub point_order: i64,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewPoint {
    pub session_id: String,
    pub name: String,
    pub label: String,
    pub point_order: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointUpdate {
    pub name: String,
    pub label: String,
    pub point_order: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRow {
    pub id: String,
    pub analysis_point_id: Option<String>,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub storage_path: String,
    pub uploaded_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewImage {
    pub analysis_point_id: String,
    pub file_name: String,
    pub file_size: i64,
    pub mime_type: String,
    pub storage_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub id: String,
    pub analysis_point_id: Option<String>,
    pub result_data: Value,
    pub skin_type: Option<String>,
    pub skin_condition: Option<String>,
    pub texture_analysis: Option<Value>,
    pub color_analysis: Option<Value>,
    pub aging_analysis: Option<Value>,
    pub recommendations: Option<Value>,
    pub confidence_score: Option<f64>,
    pub analysis_version: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewResult {
    pub analysis_point_id: String,
    pub result_data: Value,
    pub skin_type: Option<String>,
    pub skin_condition: Option<String>,
    pub texture_analysis: Value,
    pub color_analysis: Value,
    pub aging_analysis: Value,
    pub recommendations: Option<Value>,
    pub confidence_score: Option<f64>,
    pub analysis_version: String,
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

impl NewResult {
    /// 解析結果から行を作る（検索用の項目を分けて持つ）
    pub fn from_result(point_id: &str, result: &SkinAnalysisResult) -> Result<Self> {
        Ok(Self {
            analysis_point_id: point_id.to_string(),
            result_data: serde_json::to_value(result)?,
            skin_type: non_empty(&result.skin_age.estimated_age),
            skin_condition: non_empty(&result.key_findings),
            texture_analysis: json!({
                "ハリ": result.firmness,
                "毛穴": result.pores,
                "キメ": result.texture,
            }),
            color_analysis: json!({
                "シミ": result.spots,
                "赤み": result.redness,
            }),
            aging_analysis: json!({
                "肌年齢": result.skin_age,
                "シワ": result.wrinkles,
            }),
            recommendations: non_empty(&result.overall_remarks).map(Value::String),
            confidence_score: None,
            analysis_version: ANALYSIS_VERSION.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub id: String,
    pub session_id: Option<String>,
    pub report_data: Value,
    pub progression_summary: Option<String>,
    pub key_changes: Option<Value>,
    pub recommendations: Option<Value>,
    pub report_version: Option<String>,
    pub generated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewReport {
    pub session_id: String,
    pub report_data: Value,
    pub progression_summary: Option<String>,
    pub key_changes: Value,
    pub recommendations: Option<Value>,
    pub report_version: String,
}

impl NewReport {
    pub fn from_report(session_id: &str, report: &OverallReport) -> Result<Self> {
        let c = &report.content;
        Ok(Self {
            session_id: session_id.to_string(),
            report_data: serde_json::to_value(report)?,
            progression_summary: non_empty(&c.summary),
            key_changes: json!({
                "改善点": c.improvements,
                "要注意点または悪化点": c.concerns,
                "主な傾向": c.trends,
            }),
            recommendations: non_empty(&c.recommendations).map(Value::String),
            report_version: REPORT_VERSION.to_string(),
        })
    }
}

// =============================================
// バックエンド
// =============================================

/// 永続化の境界
///
/// 一覧の並び順:
/// - sessions: 作成日時の新しい順
/// - points: point_order の昇順
/// - images: アップロード順
/// - results / reports: 新しい順
#[async_trait]
pub trait Backend: Send + Sync {
    async fn find_user(&self, clerk_user_id: &str) -> Result<Option<UserProfile>>;
    async fn create_user(&self, user: &NewUser) -> Result<UserProfile>;
    async fn delete_user(&self, clerk_user_id: &str) -> Result<()>;

    async fn create_session(&self, user_id: &str, session_name: &str) -> Result<SessionRow>;
    async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionRow>>;
    async fn delete_session(&self, session_id: &str) -> Result<()>;

    async fn create_point(&self, point: &NewPoint) -> Result<PointRow>;
    async fn update_point(&self, point_id: &str, update: &PointUpdate) -> Result<PointRow>;
    async fn list_points(&self, session_id: &str) -> Result<Vec<PointRow>>;
    async fn delete_point(&self, point_id: &str) -> Result<()>;

    async fn insert_image(&self, image: &NewImage) -> Result<ImageRow>;
    async fn list_images(&self, point_id: &str) -> Result<Vec<ImageRow>>;
    async fn delete_image(&self, image_id: &str) -> Result<()>;

    async fn insert_result(&self, result: &NewResult) -> Result<ResultRow>;
    async fn list_results(&self, point_id: &str) -> Result<Vec<ResultRow>>;

    async fn insert_report(&self, report: &NewReport) -> Result<ReportRow>;
    async fn list_reports(&self, session_id: &str) -> Result<Vec<ReportRow>>;

    async fn upload_object(&self, path: &str, bytes: Vec<u8>, mime_type: &str) -> Result<()>;
    async fn remove_object(&self, path: &str) -> Result<()>;

    /// テーブルに問い合わせできるか
    async fn table_exists(&self, table: &str) -> Result<bool>;
    async fn list_buckets(&self) -> Result<Vec<String>>;
}

// =============================================
// ヘルスチェック
// =============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    pub message: String,
    pub missing_tables: Vec<String>,
    pub available_buckets: Vec<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Error,
            message: message.into(),
            missing_tables: Vec::new(),
            available_buckets: Vec::new(),
        }
    }
}

/// 全テーブルとストレージバケットの存在を確認
pub async fn health_check(backend: &dyn Backend) -> HealthReport {
    let mut missing = Vec::new();
    for table in TABLES {
        match backend.table_exists(table).await {
            Ok(true) => {}
            Ok(false) => missing.push(table.to_string()),
            Err(e) => {
                tracing::warn!(table, "health check failed: {}", e);
                if table == TABLES[0] {
                    return HealthReport::error(format!("データベースに接続できません: {}", e));
                }
                missing.push(table.to_string());
            }
        }
    }
    if !missing.is_empty() {
        return HealthReport {
            missing_tables: missing,
            ..HealthReport::error("一部のテーブルが見つかりません")
        };
    }

    let buckets = match backend.list_buckets().await {
        Ok(buckets) => buckets,
        Err(e) => return HealthReport::error(format!("ストレージの確認に失敗しました: {}", e)),
    };
    if !buckets.iter().any(|b| b == IMAGE_BUCKET) {
        return HealthReport {
            available_buckets: buckets,
            ..HealthReport::error(format!("ストレージバケット \"{}\" が見つかりません", IMAGE_BUCKET))
        };
    }

    HealthReport {
        status: HealthStatus::Healthy,
        message: "すべてのサービスが正常です".to_string(),
        missing_tables: Vec::new(),
        available_buckets: buckets,
    }
}
