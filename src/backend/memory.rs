//! プロセス内バックエンド
//!
//! 削除は関連行に波及する（ユーザー → セッション → ポイント → 画像/結果）。
//! ストレージのオブジェクトは行とは独立で、明示的に削除する。

use super::{
    Backend, ImageRow, NewImage, NewPoint, NewReport, NewResult, NewUser, PointRow, PointUpdate,
    ReportRow, ResultRow, SessionRow, UserProfile, IMAGE_BUCKET, TABLES,
};
use crate::error::{Result, SkinAiError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Tables {
    seq: u64,
    users: Vec<UserProfile>,
    sessions: Vec<SessionRow>,
    points: Vec<PointRow>,
    images: Vec<ImageRow>,
    results: Vec<ResultRow>,
    reports: Vec<ReportRow>,
    objects: BTreeMap<String, (Vec<u8>, String)>,
}

impl Tables {
    fn next_id(&mut self, prefix: &str) -> String {
        self.seq += 1;
        format!("{}-{}", prefix, self.seq)
    }

    fn remove_point_rows(&mut self, point_id: &str) {
        self.images
            .retain(|i| i.analysis_point_id.as_deref() != Some(point_id));
        self.results
            .retain(|r| r.analysis_point_id.as_deref() != Some(point_id));
        self.points.retain(|p| p.id != point_id);
    }

    fn remove_session_rows(&mut self, session_id: &str) {
        let point_ids: Vec<String> = self
            .points
            .iter()
            .filter(|p| p.session_id.as_deref() == Some(session_id))
            .map(|p| p.id.clone())
            .collect();
        for id in point_ids {
            self.remove_point_rows(&id);
        }
        self.reports
            .retain(|r| r.session_id.as_deref() != Some(session_id));
        self.sessions.retain(|s| s.id != session_id);
    }
}

fn now() -> Option<String> {
    Some(chrono::Utc::now().to_rfc3339())
}

pub struct MemoryBackend {
    tables: Mutex<Tables>,
    missing_tables: HashSet<String>,
    has_bucket: bool,
    fail_writes: AtomicBool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            missing_tables: HashSet::new(),
            has_bucket: true,
            fail_writes: AtomicBool::new(false),
        }
    }

    /// ヘルスチェック確認用: テーブルが無い状態にする
    pub fn without_table(mut self, table: &str) -> Self {
        self.missing_tables.insert(table.to_string());
        self
    }

    /// ヘルスチェック確認用: バケットが無い状態にする
    pub fn without_bucket(mut self) -> Self {
        self.has_bucket = false;
        self
    }

    /// 以降の書き込みを失敗させる
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// 保存済みオブジェクトのパス一覧
    pub fn object_paths(&self) -> Vec<String> {
        self.tables
            .lock()
            .map(|t| t.objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.tables
            .lock()
            .ok()
            .and_then(|t| t.objects.get(path).map(|(bytes, _)| bytes.clone()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| SkinAiError::Backend("memory backend lock poisoned".into()))
    }

    fn write_lock(&self) -> Result<MutexGuard<'_, Tables>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SkinAiError::Backend("write rejected".into()));
        }
        self.lock()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn find_user(&self, clerk_user_id: &str) -> Result<Option<UserProfile>> {
        let t = self.lock()?;
        Ok(t.users.iter().find(|u| u.clerk_user_id == clerk_user_id).cloned())
    }

    async fn create_user(&self, user: &NewUser) -> Result<UserProfile> {
        let mut t = self.write_lock()?;
        if t.users.iter().any(|u| u.clerk_user_id == user.clerk_user_id) {
            return Err(SkinAiError::Backend(format!(
                "duplicate clerk_user_id: {}",
                user.clerk_user_id
            )));
        }
        let row = UserProfile {
            id: t.next_id("user"),
            clerk_user_id: user.clerk_user_id.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            profile_image_url: None,
            created_at: now(),
            updated_at: now(),
        };
        t.users.push(row.clone());
        Ok(row)
    }

    async fn delete_user(&self, clerk_user_id: &str) -> Result<()> {
        let mut t = self.write_lock()?;
        let user_ids: Vec<String> = t
            .users
            .iter()
            .filter(|u| u.clerk_user_id == clerk_user_id)
            .map(|u| u.id.clone())
            .collect();
        for user_id in &user_ids {
            let session_ids: Vec<String> = t
                .sessions
                .iter()
                .filter(|s| s.user_id.as_deref() == Some(user_id.as_str()))
                .map(|s| s.id.clone())
                .collect();
            for id in session_ids {
                t.remove_session_rows(&id);
            }
        }
        t.users.retain(|u| u.clerk_user_id != clerk_user_id);
        Ok(())
    }

    async fn create_session(&self, user_id: &str, session_name: &str) -> Result<SessionRow> {
        let mut t = self.write_lock()?;
        let row = SessionRow {
            id: t.next_id("session"),
            user_id: Some(user_id.to_string()),
            session_name: session_name.to_string(),
            created_at: now(),
            updated_at: now(),
        };
        t.sessions.push(row.clone());
        Ok(row)
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionRow>> {
        let t = self.lock()?;
        // 新しい順
        Ok(t.sessions
            .iter()
            .rev()
            .filter(|s| s.user_id.as_deref() == Some(user_id))
            .cloned()
            .collect())
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let mut t = self.write_lock()?;
        t.remove_session_rows(session_id);
        Ok(())
    }

    async fn create_point(&self, point: &NewPoint) -> Result<PointRow> {
        let mut t = self.write_lock()?;
        if !t.sessions.iter().any(|s| s.id == point.session_id) {
            return Err(SkinAiError::Backend(format!("unknown session: {}", point.session_id)));
        }
        let row = PointRow {
            id: t.next_id("point"),
            session_id: Some(point.session_id.clone()),
            name: point.name.clone(),
            label: point.label.clone(),
            point_order: point.point_order,
            created_at: now(),
        };
        t.points.push(row.clone());
        Ok(row)
    }

    async fn update_point(&self, point_id: &str, update: &PointUpdate) -> Result<PointRow> {
        let mut t = self.write_lock()?;
        let row = t
            .points
            .iter_mut()
            .find(|p| p.id == point_id)
            .ok_or_else(|| SkinAiError::Backend(format!("unknown point: {}", point_id)))?;
        row.name = update.name.clone();
        row.label = update.label.clone();
        row.point_order = update.point_order;
        Ok(row.clone())
    }

    async fn list_points(&self, session_id: &str) -> Result<Vec<PointRow>> {
        let t = self.lock()?;
        let mut points: Vec<PointRow> = t
            .points
            .iter()
            .filter(|p| p.session_id.as_deref() == Some(session_id))
            .cloned()
            .collect();
        points.sort_by_key(|p| p.point_order);
        Ok(points)
    }

    async fn delete_point(&self, point_id: &str) -> Result<()> {
        let mut t = self.write_lock()?;
        t.remove_point_rows(point_id);
        Ok(())
    }

    async fn insert_image(&self, image: &NewImage) -> Result<ImageRow> {
        let mut t = self.write_lock()?;
        if !t.points.iter().any(|p| p.id == image.analysis_point_id) {
            return Err(SkinAiError::Backend(format!(
                "unknown point: {}",
                image.analysis_point_id
            )));
        }
        let row = ImageRow {
            id: t.next_id("image"),
            analysis_point_id: Some(image.analysis_point_id.clone()),
            file_name: image.file_name.clone(),
            file_size: image.file_size,
            mime_type: image.mime_type.clone(),
            storage_path: image.storage_path.clone(),
            uploaded_at: now(),
        };
        t.images.push(row.clone());
        Ok(row)
    }

    async fn list_images(&self, point_id: &str) -> Result<Vec<ImageRow>> {
        let t = self.lock()?;
        Ok(t.images
            .iter()
            .filter(|i| i.analysis_point_id.as_deref() == Some(point_id))
            .cloned()
            .collect())
    }

    async fn delete_image(&self, image_id: &str) -> Result<()> {
        let mut t = self.write_lock()?;
        t.images.retain(|i| i.id != image_id);
        Ok(())
    }

    async fn insert_result(&self, result: &NewResult) -> Result<ResultRow> {
        let mut t = self.write_lock()?;
        let row = ResultRow {
            id: t.next_id("result"),
            analysis_point_id: Some(result.analysis_point_id.clone()),
            result_data: result.result_data.clone(),
            skin_type: result.skin_type.clone(),
            skin_condition: result.skin_condition.clone(),
            texture_analysis: Some(result.texture_analysis.clone()),
            color_analysis: Some(result.color_analysis.clone()),
            aging_analysis: Some(result.aging_analysis.clone()),
            recommendations: result.recommendations.clone(),
            confidence_score: result.confidence_score,
            analysis_version: Some(result.analysis_version.clone()),
            created_at: now(),
        };
        t.results.push(row.clone());
        Ok(row)
    }

    async fn list_results(&self, point_id: &str) -> Result<Vec<ResultRow>> {
        let t = self.lock()?;
        Ok(t.results
            .iter()
            .rev()
            .filter(|r| r.analysis_point_id.as_deref() == Some(point_id))
            .cloned()
            .collect())
    }

    async fn insert_report(&self, report: &NewReport) -> Result<ReportRow> {
        let mut t = self.write_lock()?;
        let row = ReportRow {
            id: t.next_id("report"),
            session_id: Some(report.session_id.clone()),
            report_data: report.report_data.clone(),
            progression_summary: report.progression_summary.clone(),
            key_changes: Some(report.key_changes.clone()),
            recommendations: report.recommendations.clone(),
            report_version: Some(report.report_version.clone()),
            generated_at: now(),
        };
        t.reports.push(row.clone());
        Ok(row)
    }

    async fn list_reports(&self, session_id: &str) -> Result<Vec<ReportRow>> {
        let t = self.lock()?;
        Ok(t.reports
            .iter()
            .rev()
            .filter(|r| r.session_id.as_deref() == Some(session_id))
            .cloned()
            .collect())
    }

    async fn upload_object(&self, path: &str, bytes: Vec<u8>, mime_type: &str) -> Result<()> {
        let mut t = self.write_lock()?;
        if t.objects.contains_key(path) {
            return Err(SkinAiError::Backend(format!("object already exists: {}", path)));
        }
        t.objects
            .insert(path.to_string(), (bytes, mime_type.to_string()));
        Ok(())
    }

    async fn remove_object(&self, path: &str) -> Result<()> {
        let mut t = self.write_lock()?;
        t.objects.remove(path);
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(TABLES.contains(&table) && !self.missing_tables.contains(table))
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        Ok(if self.has_bucket {
            vec![IMAGE_BUCKET.to_string()]
        } else {
            Vec::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> (MemoryBackend, UserProfile, SessionRow, PointRow) {
        let backend = MemoryBackend::new();
        let user = backend
            .create_user(&NewUser {
                clerk_user_id: "user_1".into(),
                ..NewUser::default()
            })
            .await
            .unwrap();
        let session = backend.create_session(&user.id, "s").await.unwrap();
        let point = backend
            .create_point(&NewPoint {
                session_id: session.id.clone(),
                name: "分析ポイント #1".into(),
                label: "時期1".into(),
                point_order: 0,
            })
            .await
            .unwrap();
        (backend, user, session, point)
    }

    #[tokio::test]
    async fn test_delete_session_cascades() {
        let (backend, user, session, point) = seeded().await;
        backend
            .insert_image(&NewImage {
                analysis_point_id: point.id.clone(),
                file_name: "a.jpg".into(),
                file_size: 3,
                mime_type: "image/jpeg".into(),
                storage_path: "x/a.jpg".into(),
            })
            .await
            .unwrap();

        backend.delete_session(&session.id).await.unwrap();
        assert!(backend.list_points(&session.id).await.unwrap().is_empty());
        assert!(backend.list_images(&point.id).await.unwrap().is_empty());
        assert!(backend.list_sessions(&user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sessions_listed_newest_first() {
        let (backend, user, first, _) = seeded().await;
        let second = backend.create_session(&user.id, "s2").await.unwrap();
        let ids: Vec<_> = backend
            .list_sessions(&user.id)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, [second.id, first.id]);
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let (backend, user, _, _) = seeded().await;
        backend.set_fail_writes(true);
        assert!(backend.create_session(&user.id, "x").await.is_err());
        // 読み取りはできる
        assert_eq!(backend.list_sessions(&user.id).await.unwrap().len(), 1);
    }
}
