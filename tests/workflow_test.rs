//! 解析ワークフローのテスト
//!
//! 実APIの代わりに呼び出しを記録する解析器を使う

mod common;

use common::{image, sample_result, FakeAnalyzer};
use skin_ai_common::state::{MSG_MISSING_API_KEY, MSG_MISSING_FILES, MSG_NEED_TWO_POINTS};
use skin_ai_common::{Action, AppState, RunMode};
use skin_ai_rust::backend::memory::MemoryBackend;
use skin_ai_rust::backend::Backend;
use skin_ai_rust::error::SkinAiError;
use skin_ai_rust::sync::PersistenceBridge;
use skin_ai_rust::workflow::{run_individual, run_overall, Controller, CAPTION_CREATING_OVERALL};
use std::sync::{Arc, Mutex};

/// ラベルごとに1枚ずつ画像を持つ状態
fn state_with(labels: &[&str]) -> AppState {
    let mut state = AppState::new(true);
    for (i, label) in labels.iter().enumerate() {
        if i > 0 {
            state = state.reduce(Action::AddPoint);
        }
        let id = state.points.last().unwrap().id.clone();
        state = state
            .reduce(Action::SelectFiles {
                id: id.clone(),
                candidates: vec![image(&format!("{}.jpg", label))],
            })
            .reduce(Action::SetLabel {
                id,
                label: label.to_string(),
            });
    }
    state
}

// =============================================
// 個別分析
// =============================================

#[tokio::test]
async fn test_points_analyzed_in_order_with_chaining() {
    let state = state_with(&["2024-01", "2024-02", "2024-03"]);
    let plan = state.plan(RunMode::Individual).unwrap();
    let fake = FakeAnalyzer::default();

    let mut captions = Vec::new();
    let results = run_individual(&fake, &plan, |c| captions.push(c))
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(fake.call_count(), 3);
    assert_eq!(results[0].skin_age.estimated_age, "20歳");
    assert_eq!(results[2].skin_age.estimated_age, "22歳");

    // 1回目は引き継ぎなし、以降は直前の結果JSON
    let previous = fake.previous_args();
    assert_eq!(previous[0], None);
    assert_eq!(
        previous[1].as_deref(),
        Some(serde_json::to_string(&results[0]).unwrap().as_str())
    );
    assert_eq!(
        previous[2].as_deref(),
        Some(serde_json::to_string(&results[1]).unwrap().as_str())
    );

    let files = fake.files.lock().unwrap().clone();
    assert_eq!(files[1], vec!["2024-02.jpg".to_string()]);

    assert_eq!(
        captions,
        vec![
            "分析ポイント #1 (2024-01) を分析中 (1/3)...",
            "分析ポイント #2 (2024-02) を分析中 (2/3)...",
            "分析ポイント #3 (2024-03) を分析中 (3/3)...",
        ]
    );
}

#[tokio::test]
async fn test_failure_stops_later_points() {
    let state = state_with(&["前", "中", "後"]);
    let plan = state.plan(RunMode::Individual).unwrap();
    let fake = FakeAnalyzer::failing_at(1);

    let err = run_individual(&fake, &plan, |_| {}).await.unwrap_err();

    assert_eq!(fake.call_count(), 2);
    match &err {
        SkinAiError::PointFailed { name, label, .. } => {
            assert_eq!(name, "分析ポイント #2");
            assert_eq!(label, "中");
        }
        other => panic!("Expected PointFailed, got {:?}", other),
    }
    assert_eq!(
        err.to_string(),
        "エラー (分析ポイント #2 - 中): Gemini APIエラー: boom"
    );
}

#[tokio::test]
async fn test_single_point_is_not_chained() {
    let state = state_with(&["今日"]);
    let plan = state.plan(RunMode::Individual).unwrap();
    let fake = FakeAnalyzer::default();

    let results = run_individual(&fake, &plan, |_| {}).await.unwrap();
    assert_eq!(results, vec![sample_result("20歳")]);
    assert_eq!(fake.previous_args(), vec![None]);
}

// =============================================
// 総合分析
// =============================================

#[tokio::test]
async fn test_overall_passes_labeled_results() {
    let state = state_with(&["2024-01", "2024-02", "2024-03"]);
    let plan = state.plan(RunMode::Overall).unwrap();
    let fake = FakeAnalyzer::default();

    let mut captions = Vec::new();
    let run = run_overall(&fake, &plan, |c| captions.push(c)).await.unwrap();

    assert_eq!(run.results.len(), 3);
    assert!(run.report.is_ok());
    assert_eq!(fake.call_count(), 3);
    assert_eq!(captions.len(), 4);
    assert_eq!(captions[0], "分析ポイント #1 (2024-01) の個別分析を実行中 (1/3)...");
    assert_eq!(captions.last().map(String::as_str), Some(CAPTION_CREATING_OVERALL));

    // 総合分析でも直前の結果を引き継ぐ
    let previous = fake.previous_args();
    assert_eq!(previous[0], None);
    assert_eq!(
        previous[1].as_deref(),
        Some(serde_json::to_string(&run.results[0]).unwrap().as_str())
    );
    assert_eq!(
        previous[2].as_deref(),
        Some(serde_json::to_string(&run.results[1]).unwrap().as_str())
    );

    let overall = fake.overall_calls.lock().unwrap().clone();
    assert_eq!(overall.len(), 1);
    let labels: Vec<_> = overall[0].iter().map(|i| i.label.as_str()).collect();
    assert_eq!(labels, vec!["2024-01", "2024-02", "2024-03"]);
    let passed: Vec<_> = overall[0].iter().map(|i| i.result.clone()).collect();
    assert_eq!(passed, run.results);
}

#[tokio::test]
async fn test_overall_not_called_when_point_fails() {
    let state = state_with(&["1月", "2月"]);
    let plan = state.plan(RunMode::Overall).unwrap();
    let fake = FakeAnalyzer::failing_at(0);

    let result = run_overall(&fake, &plan, |_| {}).await;
    assert!(matches!(result, Err(SkinAiError::PointFailed { .. })));
    assert_eq!(fake.call_count(), 1);
    assert!(fake.overall_calls.lock().unwrap().is_empty());
}

// =============================================
// Controller
// =============================================

#[tokio::test]
async fn test_controller_individual_success() {
    let fake = Arc::new(FakeAnalyzer::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut controller = Controller::new(state_with(&["a", "b"]), fake.clone())
        .with_observer(move |c| sink.lock().unwrap().push(c.to_string()));

    let results = controller.analyze_individual().await.unwrap();

    let state = controller.state();
    assert_eq!(state.results, results);
    assert!(!state.is_busy());
    assert_eq!(state.error, None);
    assert_eq!(state.caption, "個別分析完了");
    assert_eq!(seen.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_controller_failure_discards_results() {
    let fake = Arc::new(FakeAnalyzer::failing_at(1));
    let mut controller = Controller::new(state_with(&["a", "b", "c"]), fake.clone());

    assert!(controller.analyze_individual().await.is_err());

    let state = controller.state();
    assert_eq!(fake.call_count(), 2);
    assert!(state.results.is_empty());
    assert!(!state.is_busy());
    assert_eq!(
        state.error.as_deref(),
        Some("エラー (分析ポイント #2 - b): Gemini APIエラー: boom")
    );
}

#[tokio::test]
async fn test_controller_overall_needs_two_points() {
    let fake = Arc::new(FakeAnalyzer::default());
    let mut controller = Controller::new(state_with(&["only"]), fake.clone());

    let err = controller.generate_overall().await.unwrap_err();
    assert_eq!(err.to_string(), MSG_NEED_TWO_POINTS);
    assert_eq!(fake.call_count(), 0);
    assert_eq!(controller.state().error.as_deref(), Some(MSG_NEED_TWO_POINTS));
    assert!(!controller.state().is_busy());
}

#[tokio::test]
async fn test_controller_requires_api_key() {
    let fake = Arc::new(FakeAnalyzer::default());
    let state = state_with(&["a", "b"]).reduce(Action::SetApiKeyPresent(false));
    let mut controller = Controller::new(state, fake.clone());

    assert!(controller.analyze_individual().await.is_err());
    assert_eq!(fake.call_count(), 0);
    assert_eq!(controller.state().error.as_deref(), Some(MSG_MISSING_API_KEY));
}

#[tokio::test]
async fn test_controller_requires_files_for_every_point() {
    let fake = Arc::new(FakeAnalyzer::default());
    let state = state_with(&["a", "b"]);
    let id = state.points[1].id.clone();
    let file_id = state.points[1].files[0].id.clone();
    let state = state.reduce(Action::RemoveFile { id, file_id });
    let mut controller = Controller::new(state, fake.clone());

    let err = controller.analyze_individual().await.unwrap_err();
    assert_eq!(err.to_string(), MSG_MISSING_FILES);
    assert_eq!(fake.call_count(), 0);
    assert_eq!(controller.state().error.as_deref(), Some(MSG_MISSING_FILES));
    assert!(!controller.state().is_busy());
}

#[tokio::test]
async fn test_controller_overall_failure_keeps_results() {
    let fake = Arc::new(FakeAnalyzer::failing_overall());
    let mut controller = Controller::new(state_with(&["1", "2", "3"]), fake.clone());

    let err = controller.generate_overall().await.unwrap_err();
    assert!(matches!(err, SkinAiError::OverallFailed(_)));

    let state = controller.state();
    assert_eq!(fake.call_count(), 3);
    assert_eq!(state.results.len(), 3);
    assert_eq!(state.overall_report, None);
    assert!(!state.is_busy());
    assert_eq!(
        state.error.as_deref(),
        Some("総合経過分析レポート生成エラー: Gemini APIエラー (総合経過分析): quota")
    );
}

#[tokio::test]
async fn test_controller_overall_success() {
    let fake = Arc::new(FakeAnalyzer::default());
    let mut controller = Controller::new(state_with(&["1", "2"]), fake.clone());

    let report = controller.generate_overall().await.unwrap();

    let state = controller.state();
    assert_eq!(state.overall_report.as_ref(), Some(&report));
    assert_eq!(state.results.len(), 2);
    assert_eq!(state.caption, "総合レポート作成完了");
}

#[tokio::test]
async fn test_controller_refuses_without_session() {
    let backend = Arc::new(MemoryBackend::new());
    let bridge = PersistenceBridge::connect(backend, "user_abc").await.unwrap();
    let fake = Arc::new(FakeAnalyzer::default());
    let mut controller = Controller::new(state_with(&["a"]), fake.clone()).with_bridge(bridge);

    let err = controller.analyze_individual().await.unwrap_err();
    assert!(matches!(err, SkinAiError::NoSession));
    assert_eq!(fake.call_count(), 0);
    assert!(controller.state().error.is_some());
}

#[tokio::test]
async fn test_controller_mirrors_run_to_backend() {
    let backend = Arc::new(MemoryBackend::new());
    let bridge = PersistenceBridge::connect(backend.clone(), "user_abc").await.unwrap();
    let session = bridge.create_session("テスト").await.unwrap();
    let fake = Arc::new(FakeAnalyzer::default());
    let mut controller = Controller::new(state_with(&["前", "後"]), fake).with_bridge(bridge);

    controller.generate_overall().await.unwrap();

    let points = backend.list_points(&session.id).await.unwrap();
    assert_eq!(points.len(), 2);
    assert_eq!(points[0].label, "前");
    assert_eq!(backend.list_results(&points[1].id).await.unwrap().len(), 1);
    assert_eq!(backend.list_reports(&session.id).await.unwrap().len(), 1);
    assert_eq!(backend.object_paths().len(), 2);
}

#[tokio::test]
async fn test_controller_backend_failure_does_not_block_analysis() {
    let backend = Arc::new(MemoryBackend::new());
    let bridge = PersistenceBridge::connect(backend.clone(), "user_abc").await.unwrap();
    bridge.create_session("テスト").await.unwrap();
    backend.set_fail_writes(true);

    let fake = Arc::new(FakeAnalyzer::default());
    let mut controller = Controller::new(state_with(&["a", "b"]), fake.clone()).with_bridge(bridge);

    let results = controller.analyze_individual().await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(controller.state().error, None);
    assert!(backend.object_paths().is_empty());
}
