//! Supabase（PostgREST / Storage）バックエンド

use super::{
    Backend, ImageRow, NewImage, NewPoint, NewReport, NewResult, NewUser, PointRow, PointUpdate,
    ReportRow, ResultRow, SessionRow, UserProfile, IMAGE_BUCKET,
};
use crate::config::BackendSettings;
use crate::error::{Result, SkinAiError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use skin_ai_common::parser::excerpt;

#[derive(Deserialize)]
struct Bucket {
    id: String,
}

pub struct SupabaseBackend {
    http: reqwest::Client,
    url: String,
    key: String,
}

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

impl SupabaseBackend {
    pub fn new(settings: &BackendSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: settings.url.trim_end_matches('/').to_string(),
            key: settings.key.clone(),
        }
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.url, table)
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.url, IMAGE_BUCKET, path)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }

    async fn check(response: reqwest::Response, context: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(SkinAiError::Backend(format!(
            "{} (HTTP {}): {}",
            context,
            status.as_u16(),
            excerpt(&body, 300)
        )))
    }

    async fn select<R: DeserializeOwned + Send>(
        &self,
        table: &str,
        filters: &[(&str, String)],
        order: Option<&str>,
    ) -> Result<Vec<R>> {
        let mut query: Vec<(&str, String)> = vec![("select", "*".to_string())];
        query.extend(filters.iter().cloned());
        if let Some(order) = order {
            query.push(("order", order.to_string()));
        }

        let response = self
            .authorized(self.http.get(self.rest_url(table)))
            .query(&query)
            .send()
            .await?;
        let response = Self::check(response, &format!("Failed to fetch {}", table)).await?;
        Ok(response.json().await?)
    }

    async fn insert<T: Serialize + Sync, R: DeserializeOwned + Send>(&self, table: &str, row: &T) -> Result<R> {
        let response = self
            .authorized(self.http.post(self.rest_url(table)))
            .header("Prefer", "return=representation")
            .json(row)
            .send()
            .await?;
        let response = Self::check(response, &format!("Failed to insert into {}", table)).await?;
        Self::single(response.json().await?, table)
    }

    async fn update<T: Serialize + Sync, R: DeserializeOwned + Send>(
        &self,
        table: &str,
        filter: (&str, String),
        row: &T,
    ) -> Result<R> {
        let response = self
            .authorized(self.http.patch(self.rest_url(table)))
            .header("Prefer", "return=representation")
            .query(&[filter])
            .json(row)
            .send()
            .await?;
        let response = Self::check(response, &format!("Failed to update {}", table)).await?;
        Self::single(response.json().await?, table)
    }

    async fn delete(&self, table: &str, filter: (&str, String)) -> Result<()> {
        let response = self
            .authorized(self.http.delete(self.rest_url(table)))
            .query(&[filter])
            .send()
            .await?;
        Self::check(response, &format!("Failed to delete from {}", table)).await?;
        Ok(())
    }

    /// return=representation の配列から1行取り出す
    fn single<R>(rows: Vec<R>, table: &str) -> Result<R> {
        rows.into_iter()
            .next()
            .ok_or_else(|| SkinAiError::Backend(format!("{}: no row returned", table)))
    }
}

#[async_trait]
impl Backend for SupabaseBackend {
    async fn find_user(&self, clerk_user_id: &str) -> Result<Option<UserProfile>> {
        let rows: Vec<UserProfile> = self
            .select("user_profiles", &[("clerk_user_id", eq(clerk_user_id))], None)
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn create_user(&self, user: &NewUser) -> Result<UserProfile> {
        self.insert("user_profiles", user).await
    }

    async fn delete_user(&self, clerk_user_id: &str) -> Result<()> {
        self.delete("user_profiles", ("clerk_user_id", eq(clerk_user_id)))
            .await
    }

    async fn create_session(&self, user_id: &str, session_name: &str) -> Result<SessionRow> {
        let row = json!({ "user_id": user_id, "session_name": session_name });
        self.insert("analysis_sessions", &row).await
    }

    async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionRow>> {
        self.select(
            "analysis_sessions",
            &[("user_id", eq(user_id))],
            Some("created_at.desc"),
        )
        .await
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.delete("analysis_sessions", ("id", eq(session_id))).await
    }

    async fn create_point(&self, point: &NewPoint) -> Result<PointRow> {
        self.insert("analysis_points", point).await
    }

    async fn update_point(&self, point_id: &str, update: &PointUpdate) -> Result<PointRow> {
        self.update("analysis_points", ("id", eq(point_id)), update)
            .await
    }

    async fn list_points(&self, session_id: &str) -> Result<Vec<PointRow>> {
        self.select(
            "analysis_points",
            &[("session_id", eq(session_id))],
            Some("point_order.asc"),
        )
        .await
    }

    async fn delete_point(&self, point_id: &str) -> Result<()> {
        self.delete("analysis_points", ("id", eq(point_id))).await
    }

    async fn insert_image(&self, image: &NewImage) -> Result<ImageRow> {
        self.insert("uploaded_images", image).await
    }

    async fn list_images(&self, point_id: &str) -> Result<Vec<ImageRow>> {
        self.select(
            "uploaded_images",
            &[("analysis_point_id", eq(point_id))],
            Some("uploaded_at.asc"),
        )
        .await
    }

    async fn delete_image(&self, image_id: &str) -> Result<()> {
        self.delete("uploaded_images", ("id", eq(image_id))).await
    }

    async fn insert_result(&self, result: &NewResult) -> Result<ResultRow> {
        self.insert("analysis_results", result).await
    }

    async fn list_results(&self, point_id: &str) -> Result<Vec<ResultRow>> {
        self.select(
            "analysis_results",
            &[("analysis_point_id", eq(point_id))],
            Some("created_at.desc"),
        )
        .await
    }

    async fn insert_report(&self, report: &NewReport) -> Result<ReportRow> {
        self.insert("overall_reports", report).await
    }

    async fn list_reports(&self, session_id: &str) -> Result<Vec<ReportRow>> {
        self.select(
            "overall_reports",
            &[("session_id", eq(session_id))],
            Some("generated_at.desc"),
        )
        .await
    }

    async fn upload_object(&self, path: &str, bytes: Vec<u8>, mime_type: &str) -> Result<()> {
        let response = self
            .authorized(self.http.post(self.object_url(path)))
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(bytes)
            .send()
            .await?;
        Self::check(response, "Failed to upload image").await?;
        Ok(())
    }

    async fn remove_object(&self, path: &str) -> Result<()> {
        let response = self
            .authorized(
                self.http
                    .delete(format!("{}/storage/v1/object/{}", self.url, IMAGE_BUCKET)),
            )
            .json(&json!({ "prefixes": [path] }))
            .send()
            .await?;
        Self::check(response, "Failed to delete image").await?;
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let response = self
            .authorized(self.http.get(self.rest_url(table)))
            .query(&[("select", "count"), ("limit", "1")])
            .send()
            .await?;
        Ok(response.status().is_success())
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        let response = self
            .authorized(self.http.get(format!("{}/storage/v1/bucket", self.url)))
            .send()
            .await?;
        let response = Self::check(response, "Failed to list buckets").await?;
        let buckets: Vec<Bucket> = response.json().await?;
        Ok(buckets.into_iter().map(|b| b.id).collect())
    }
}
