//! 永続化ブリッジ
//!
//! 画面の状態（分析ポイント・結果・総合レポート）をバックエンドへ反映する。
//! 反映はセッションごとに1つずつ順番に行い、失敗は警告ログのみで処理を続ける。

use crate::backend::{
    Backend, ImageRow, NewImage, NewPoint, NewReport, NewResult, NewUser, PointRow, PointUpdate,
    ReportRow, ResultRow, SessionRow, UserProfile,
};
use crate::error::{Result, SkinAiError};
use serde::Serialize;
use sha2::{Digest, Sha256};
use skin_ai_common::{AnalysisPoint, IntakeFile, OverallReport, SkinAnalysisResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// ストレージ上のパス `{userId}/{pointId}/{timestamp}_{random}.{ext}`
pub fn storage_path(user_id: &str, point_id: &str, file: &IntakeFile, timestamp_ms: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file.id.as_bytes());
    hasher.update(timestamp_ms.to_le_bytes());
    hasher.update(file.base64.as_bytes());
    let random = hex::encode(hasher.finalize());
    format!(
        "{}/{}/{}_{}.{}",
        user_id,
        point_id,
        timestamp_ms,
        &random[..10],
        file.extension()
    )
}

/// 反映済みのポイント
#[derive(Debug, Clone)]
struct RemotePoint {
    row: PointRow,
    /// ローカルのファイルID → 画像行
    images: HashMap<String, ImageRow>,
}

#[derive(Debug, Default)]
struct SyncState {
    session: Option<SessionRow>,
    /// ローカルのポイントID → 反映済みポイント
    points: HashMap<String, RemotePoint>,
}

pub struct PersistenceBridge {
    backend: Arc<dyn Backend>,
    user: UserProfile,
    state: Mutex<SyncState>,
}

impl PersistenceBridge {
    /// 外部IDのユーザーを取得（無ければ作成）して接続
    pub async fn connect(backend: Arc<dyn Backend>, clerk_user_id: &str) -> Result<Self> {
        let user = match backend.find_user(clerk_user_id).await? {
            Some(user) => user,
            None => {
                tracing::info!(clerk_user_id, "creating user profile");
                backend
                    .create_user(&NewUser {
                        clerk_user_id: clerk_user_id.to_string(),
                        ..NewUser::default()
                    })
                    .await?
            }
        };

        Ok(Self {
            backend,
            user,
            state: Mutex::new(SyncState::default()),
        })
    }

    pub fn user(&self) -> &UserProfile {
        &self.user
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub async fn has_session(&self) -> bool {
        self.state.lock().await.session.is_some()
    }

    pub async fn session(&self) -> Option<SessionRow> {
        self.state.lock().await.session.clone()
    }

    /// 新しいセッションを作成して以降の反映先にする
    pub async fn create_session(&self, name: &str) -> Result<SessionRow> {
        let mut state = self.state.lock().await;
        let session = self.backend.create_session(&self.user.id, name).await?;
        tracing::info!(session = %session.id, "session created");
        state.session = Some(session.clone());
        state.points.clear();
        Ok(session)
    }

    /// 分析ポイントと画像を反映（失敗はログのみ）
    pub async fn mirror_points(&self, points: &[AnalysisPoint]) {
        if let Err(e) = self.sync_points(points).await {
            tracing::warn!("分析ポイントの保存に失敗しました: {}", e);
        }
    }

    /// 解析結果を反映（失敗はログのみ）
    pub async fn mirror_results(&self, points: &[AnalysisPoint], results: &[SkinAnalysisResult]) {
        if let Err(e) = self.save_results(points, results).await {
            tracing::warn!("解析結果の保存に失敗しました: {}", e);
        }
    }

    /// 総合経過分析レポートを反映（失敗はログのみ）
    pub async fn mirror_report(&self, report: &OverallReport) {
        if let Err(e) = self.save_report(report).await {
            tracing::warn!("総合経過分析レポートの保存に失敗しました: {}", e);
        }
    }

    /// 分析ポイントを差分で反映する
    ///
    /// - 既知のポイント: 名前・ラベル・順序を更新
    /// - 新しいポイント: 作成
    /// - 消えたポイント: 画像ごと削除
    /// - 画像: 新しいファイルだけアップロードし、消えたファイルは削除
    pub async fn sync_points(&self, points: &[AnalysisPoint]) -> Result<()> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let session_id = state
            .session
            .as_ref()
            .map(|s| s.id.clone())
            .ok_or(SkinAiError::NoSession)?;

        // 消えたポイント
        let vanished: Vec<String> = state
            .points
            .keys()
            .filter(|id| !points.iter().any(|p| &p.id == *id))
            .cloned()
            .collect();
        // 削除に成功したものだけ忘れる（失敗分は次回やり直す）
        for local_id in vanished {
            let Some(remote) = state.points.get_mut(&local_id) else {
                continue;
            };
            let file_ids: Vec<String> = remote.images.keys().cloned().collect();
            for file_id in file_ids {
                if let Some(image) = remote.images.get(&file_id) {
                    self.delete_image(image).await?;
                }
                remote.images.remove(&file_id);
            }
            self.backend.delete_point(&remote.row.id).await?;
            tracing::debug!(point = %remote.row.id, "point deleted");
            state.points.remove(&local_id);
        }

        for (order, point) in points.iter().enumerate() {
            let order = order as i64;
            let remote = match state.points.get(&point.id) {
                Some(remote) => {
                    let row = if remote.row.name != point.name
                        || remote.row.label != point.label
                        || remote.row.point_order != order
                    {
                        self.backend
                            .update_point(
                                &remote.row.id,
                                &PointUpdate {
                                    name: point.name.clone(),
                                    label: point.label.clone(),
                                    point_order: order,
                                },
                            )
                            .await?
                    } else {
                        remote.row.clone()
                    };
                    RemotePoint {
                        row,
                        images: remote.images.clone(),
                    }
                }
                None => {
                    let row = self
                        .backend
                        .create_point(&NewPoint {
                            session_id: session_id.clone(),
                            name: point.name.clone(),
                            label: point.label.clone(),
                            point_order: order,
                        })
                        .await?;
                    RemotePoint {
                        row,
                        images: HashMap::new(),
                    }
                }
            };
            // 途中で失敗しても作成済みの行を覚えておく
            state.points.insert(point.id.clone(), remote);

            self.sync_images(state, point).await?;
        }

        Ok(())
    }

    async fn sync_images(&self, state: &mut SyncState, point: &AnalysisPoint) -> Result<()> {
        let Some(remote) = state.points.get_mut(&point.id) else {
            return Ok(());
        };
        let point_id = remote.row.id.clone();

        let removed: Vec<String> = remote
            .images
            .keys()
            .filter(|id| !point.files.iter().any(|f| &f.id == *id))
            .cloned()
            .collect();
        for file_id in removed {
            if let Some(image) = remote.images.get(&file_id) {
                self.delete_image(image).await?;
            }
            remote.images.remove(&file_id);
        }

        for file in &point.files {
            if remote.images.contains_key(&file.id) {
                continue;
            }
            let bytes = file
                .decode_bytes()
                .map_err(|e| SkinAiError::Backend(format!("{}: {}", file.name, e)))?;
            let path = storage_path(
                &self.user.id,
                &point_id,
                file,
                chrono::Utc::now().timestamp_millis(),
            );
            self.backend
                .upload_object(&path, bytes, &file.mime_type)
                .await?;
            let inserted = self
                .backend
                .insert_image(&NewImage {
                    analysis_point_id: point_id.clone(),
                    file_name: file.name.clone(),
                    file_size: file.size as i64,
                    mime_type: file.mime_type.clone(),
                    storage_path: path.clone(),
                })
                .await;
            let image = match inserted {
                Ok(image) => image,
                Err(e) => {
                    // 行が無いオブジェクトは残さない
                    if let Err(cleanup) = self.backend.remove_object(&path).await {
                        tracing::warn!(%path, "アップロード済み画像の削除に失敗しました: {}", cleanup);
                    }
                    return Err(e);
                }
            };
            tracing::debug!(path = %image.storage_path, "image uploaded");
            remote.images.insert(file.id.clone(), image);
        }

        Ok(())
    }

    async fn delete_image(&self, image: &ImageRow) -> Result<()> {
        self.backend.remove_object(&image.storage_path).await?;
        self.backend.delete_image(&image.id).await
    }

    /// 解析結果を保存（ポイントは先に反映しておく）
    pub async fn save_results(
        &self,
        points: &[AnalysisPoint],
        results: &[SkinAnalysisResult],
    ) -> Result<Vec<ResultRow>> {
        let state = self.state.lock().await;
        if state.session.is_none() {
            return Err(SkinAiError::NoSession);
        }

        let mut rows = Vec::with_capacity(results.len());
        for (point, result) in points.iter().zip(results) {
            let remote = state.points.get(&point.id).ok_or_else(|| {
                SkinAiError::Backend(format!("{} は保存されていません", point.name))
            })?;
            let row = self
                .backend
                .insert_result(&NewResult::from_result(&remote.row.id, result)?)
                .await?;
            rows.push(row);
        }
        Ok(rows)
    }

    pub async fn save_report(&self, report: &OverallReport) -> Result<ReportRow> {
        let state = self.state.lock().await;
        let session = state.session.as_ref().ok_or(SkinAiError::NoSession)?;
        self.backend
            .insert_report(&NewReport::from_report(&session.id, report)?)
            .await
    }
}

// =============================================
// ユーザーデータのエクスポート/削除
// =============================================

#[derive(Debug, Clone, Serialize)]
pub struct PointExport {
    #[serde(flatten)]
    pub point: PointRow,
    pub images: Vec<ImageRow>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionExport {
    pub session: SessionRow,
    pub analysis_points: Vec<PointExport>,
    pub analysis_results: Vec<ResultRow>,
    pub overall_reports: Vec<ReportRow>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDataExport {
    pub user: UserProfile,
    pub sessions: Vec<SessionExport>,
    pub exported_at: String,
}

/// ユーザーの全データを集める
pub async fn export_user_data(backend: &dyn Backend, clerk_user_id: &str) -> Result<UserDataExport> {
    let user = backend
        .find_user(clerk_user_id)
        .await?
        .ok_or_else(|| SkinAiError::Backend(format!("ユーザーが見つかりません: {}", clerk_user_id)))?;

    let mut sessions = Vec::new();
    for session in backend.list_sessions(&user.id).await? {
        let mut analysis_points = Vec::new();
        let mut analysis_results = Vec::new();
        for point in backend.list_points(&session.id).await? {
            let images = backend.list_images(&point.id).await?;
            analysis_results.extend(backend.list_results(&point.id).await?);
            analysis_points.push(PointExport { point, images });
        }
        let overall_reports = backend.list_reports(&session.id).await?;
        sessions.push(SessionExport {
            session,
            analysis_points,
            analysis_results,
            overall_reports,
        });
    }

    Ok(UserDataExport {
        user,
        sessions,
        exported_at: chrono::Utc::now().to_rfc3339(),
    })
}

/// ユーザーの全データを削除する（ユーザーが居なければ何もしない）
///
/// 順序: 画像オブジェクト → 画像行 → ポイント → セッション → プロフィール
pub async fn delete_all_user_data(backend: &dyn Backend, clerk_user_id: &str) -> Result<()> {
    let Some(user) = backend.find_user(clerk_user_id).await? else {
        return Ok(());
    };

    for session in backend.list_sessions(&user.id).await? {
        for point in backend.list_points(&session.id).await? {
            for image in backend.list_images(&point.id).await? {
                backend.remove_object(&image.storage_path).await?;
                backend.delete_image(&image.id).await?;
            }
            backend.delete_point(&point.id).await?;
        }
        backend.delete_session(&session.id).await?;
    }

    backend.delete_user(clerk_user_id).await?;
    tracing::info!(clerk_user_id, "user data deleted");
    Ok(())
}
