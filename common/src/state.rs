//! アプリケーション状態
//!
//! 分析ポイントの集合・解析結果・総合レポート・処理中フラグを一つの
//! `AppState` にまとめ、`reduce` で次の状態を返す。
//! 解析結果と総合レポートは分析ポイントから導出される値なので、
//! ファイルやラベルが変わるたびに破棄する。

use crate::error::{Error, Result};
use crate::intake::{intake_files, CandidateFile, IntakeFile, DEFAULT_MAX_FILES};
use crate::types::{LabeledResult, OverallReport, PointSummary, RunRecord, SkinAnalysisResult};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// 自動採番されたラベル（「時期」「時期3」など）
    static ref DEFAULT_LABEL_RE: Regex = Regex::new(r"^時期\d*$").expect("label regex");
}

pub const CAPTION_READY: &str = "準備完了";
pub const CAPTION_ERROR: &str = "エラーが発生しました";

pub const MSG_BUSY: &str = "処理中です。完了までお待ちください。";
pub const MSG_NO_POINTS: &str = "分析ポイントがありません。分析ポイントを追加してください。";
pub const MSG_MISSING_FILES: &str = "すべての分析ポイントにファイルを選択してください。";
pub const MSG_MISSING_LABELS: &str = "すべての分析ポイントに時期/ラベルを入力してください。";
pub const MSG_MISSING_API_KEY: &str =
    "APIキーが設定されていません。アプリケーションを正しく実行できません。";
pub const MSG_NEED_TWO_POINTS: &str =
    "総合経過分析レポートを作成するには、少なくとも2つの分析ポイントが必要です。";
pub const MSG_MISSING_FILES_OR_LABELS: &str =
    "すべての分析ポイントにファイルとラベルを入力してください。";

/// n番目の分析ポイントの表示名
pub fn point_name(n: usize) -> String {
    format!("分析ポイント #{}", n)
}

/// n番目の分析ポイントの既定ラベル
pub fn default_label(n: usize) -> String {
    format!("時期{}", n)
}

/// 分析ポイント（1つの時点の画像グループ）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisPoint {
    pub id: String,
    pub name: String,
    pub label: String,
    pub files: Vec<IntakeFile>,
}

impl AnalysisPoint {
    fn is_ready(&self) -> bool {
        !self.files.is_empty() && !self.label.trim().is_empty()
    }
}

/// 解析の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// 各ポイントを個別に分析
    Individual,
    /// 個別分析の後に総合経過分析レポートを作成
    Overall,
}

/// 検証済みの解析計画（開始時点の分析ポイントのスナップショット）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisPlan {
    pub mode: RunMode,
    pub points: Vec<AnalysisPoint>,
}

impl AnalysisPlan {
    /// 解析結果を元の順序のままラベルと組にする
    pub fn labeled(&self, results: &[SkinAnalysisResult]) -> Vec<LabeledResult> {
        results
            .iter()
            .enumerate()
            .map(|(i, result)| LabeledResult {
                result: result.clone(),
                label: self
                    .points
                    .get(i)
                    .map(|p| p.label.clone())
                    .filter(|l| !l.is_empty())
                    .unwrap_or_else(|| format!("時期 {}", i + 1)),
            })
            .collect()
    }
}

/// 状態遷移
#[derive(Debug, Clone)]
pub enum Action {
    AddPoint,
    RemovePoint { id: String },
    SetLabel { id: String, label: String },
    /// ファイル選択（取り込み処理を行い、ポイントのファイルを置き換える）
    SelectFiles { id: String, candidates: Vec<CandidateFile> },
    RemoveFile { id: String, file_id: String },
    SetApiKeyPresent(bool),
    /// 事前検証に失敗（エラー表示のみ更新）
    ValidationFailed(String),
    RunStarted(RunMode),
    Progress(String),
    /// 個別分析の完了
    IndividualFinished(std::result::Result<Vec<SkinAnalysisResult>, String>),
    /// 総合分析前の個別分析ループの完了
    PointsFinished(std::result::Result<Vec<SkinAnalysisResult>, String>),
    /// 総合経過分析レポート作成の完了
    OverallFinished(std::result::Result<OverallReport, String>),
    ClearError,
}

/// アプリケーション状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    pub points: Vec<AnalysisPoint>,
    pub results: Vec<SkinAnalysisResult>,
    pub overall_report: Option<OverallReport>,
    pub busy: Option<RunMode>,
    pub caption: String,
    pub error: Option<String>,
    /// 直近のファイル選択で出た警告
    pub intake_warnings: Vec<String>,
    pub api_key_present: bool,
    pub max_files: usize,
    point_counter: usize,
    next_point_seq: u64,
    next_file_id: u64,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(false)
    }
}

impl AppState {
    /// 分析ポイント #1 を1つ持つ初期状態
    pub fn new(api_key_present: bool) -> Self {
        let mut state = Self {
            points: Vec::new(),
            results: Vec::new(),
            overall_report: None,
            busy: None,
            caption: CAPTION_READY.to_string(),
            error: None,
            intake_warnings: Vec::new(),
            api_key_present,
            max_files: DEFAULT_MAX_FILES,
            point_counter: 0,
            next_point_seq: 0,
            next_file_id: 0,
        };
        state.push_new_point();
        state
    }

    /// 1回の選択で受け付けるファイル数の上限（1以上）
    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files.max(1);
        self
    }

    pub fn point(&self, id: &str) -> Option<&AnalysisPoint> {
        self.points.iter().find(|p| p.id == id)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_some()
    }

    /// 次の状態を返す
    ///
    /// 処理中は分析ポイントの編集を受け付けない（状態はそのまま）。
    pub fn reduce(mut self, action: Action) -> Self {
        let editing = matches!(
            action,
            Action::AddPoint
                | Action::RemovePoint { .. }
                | Action::SetLabel { .. }
                | Action::SelectFiles { .. }
                | Action::RemoveFile { .. }
        );
        if editing && self.is_busy() {
            return self;
        }

        match action {
            Action::AddPoint => {
                self.push_new_point();
                self.clear_outputs();
            }
            Action::RemovePoint { id } => {
                if self.point(&id).is_none() {
                    return self;
                }
                self.points.retain(|p| p.id != id);
                self.renumber();
                self.clear_outputs();
                self.error = None;
            }
            Action::SetLabel { id, label } => {
                if let Some(point) = self.points.iter_mut().find(|p| p.id == id) {
                    point.label = label;
                    self.clear_outputs();
                }
            }
            Action::SelectFiles { id, candidates } => {
                if self.point(&id).is_none() {
                    return self;
                }
                let outcome = intake_files(candidates, self.max_files, &mut self.next_file_id);
                if let Some(point) = self.points.iter_mut().find(|p| p.id == id) {
                    point.files = outcome.files;
                }
                self.intake_warnings = outcome.warnings;
                self.error = None;
                self.clear_outputs();
            }
            Action::RemoveFile { id, file_id } => {
                if let Some(point) = self.points.iter_mut().find(|p| p.id == id) {
                    point.files.retain(|f| f.id != file_id);
                    self.error = None;
                    self.clear_outputs();
                }
            }
            Action::SetApiKeyPresent(present) => {
                self.api_key_present = present;
            }
            Action::ValidationFailed(message) => {
                self.error = Some(message);
            }
            Action::RunStarted(mode) => {
                self.busy = Some(mode);
                self.error = None;
                self.overall_report = None;
                match mode {
                    RunMode::Individual => self.results.clear(),
                    RunMode::Overall => {
                        self.caption = "個別分析を開始しています...".to_string();
                    }
                }
            }
            Action::Progress(caption) => {
                self.caption = caption;
            }
            Action::IndividualFinished(outcome) => {
                self.busy = None;
                match outcome {
                    Ok(results) => {
                        self.results = results;
                        self.caption = "個別分析完了".to_string();
                    }
                    Err(message) => self.fail(message),
                }
            }
            Action::PointsFinished(outcome) => match outcome {
                Ok(results) => {
                    self.results = results;
                    self.caption = "総合経過分析レポートを作成中...".to_string();
                }
                Err(message) => {
                    self.busy = None;
                    self.fail(message);
                }
            },
            Action::OverallFinished(outcome) => {
                self.busy = None;
                match outcome {
                    Ok(report) => {
                        self.overall_report = Some(report);
                        self.caption = "総合レポート作成完了".to_string();
                    }
                    Err(message) => {
                        // 個別分析の結果は残す
                        self.error = Some(message);
                        self.caption = CAPTION_ERROR.to_string();
                    }
                }
            }
            Action::ClearError => {
                self.error = None;
            }
        }

        self
    }

    /// 事前条件を検証して解析計画を返す（状態は変更しない）
    pub fn plan(&self, mode: RunMode) -> Result<AnalysisPlan> {
        if self.is_busy() {
            return Err(Error::Validation(MSG_BUSY.into()));
        }

        match mode {
            RunMode::Individual => {
                if self.points.is_empty() {
                    return Err(Error::Validation(MSG_NO_POINTS.into()));
                }
                if self.points.iter().any(|p| p.files.is_empty()) {
                    return Err(Error::Validation(MSG_MISSING_FILES.into()));
                }
                if self.points.iter().any(|p| p.label.trim().is_empty()) {
                    return Err(Error::Validation(MSG_MISSING_LABELS.into()));
                }
                if !self.api_key_present {
                    return Err(Error::Validation(MSG_MISSING_API_KEY.into()));
                }
            }
            RunMode::Overall => {
                if !self.api_key_present {
                    return Err(Error::Validation(MSG_MISSING_API_KEY.into()));
                }
                if self.points.len() < 2 {
                    return Err(Error::Validation(MSG_NEED_TWO_POINTS.into()));
                }
                if !self.points.iter().all(AnalysisPoint::is_ready) {
                    return Err(Error::Validation(MSG_MISSING_FILES_OR_LABELS.into()));
                }
            }
        }

        Ok(AnalysisPlan {
            mode,
            points: self.points.clone(),
        })
    }

    pub fn can_analyze_individual(&self) -> bool {
        !self.points.is_empty() && self.points.iter().all(AnalysisPoint::is_ready) && self.api_key_present
    }

    pub fn can_generate_overall(&self) -> bool {
        self.points.len() >= 2 && self.can_analyze_individual()
    }

    /// 総合分析ボタンが無効な理由
    pub fn overall_disabled_reason(&self) -> Option<&'static str> {
        if self.can_generate_overall() {
            None
        } else if !self.api_key_present {
            Some("APIキーが設定されていません。")
        } else if self.points.len() < 2 {
            Some("総合分析には最低2つの分析ポイントが必要です")
        } else {
            Some("すべての分析ポイントにファイルとラベルを入力してください")
        }
    }

    pub fn point_summaries(&self) -> Vec<PointSummary> {
        self.points
            .iter()
            .map(|p| PointSummary {
                name: p.name.clone(),
                label: p.label.clone(),
                files: p.files.iter().map(|f| f.name.clone()).collect(),
            })
            .collect()
    }

    /// 保存用レコードを作成
    pub fn to_run_record(&self, generated_at: String) -> RunRecord {
        RunRecord {
            generated_at,
            points: self.point_summaries(),
            results: self.results.clone(),
            overall: self.overall_report.clone(),
        }
    }

    fn push_new_point(&mut self) {
        self.point_counter += 1;
        self.next_point_seq += 1;
        self.points.push(AnalysisPoint {
            id: format!("set-{}", self.next_point_seq),
            name: point_name(self.point_counter),
            label: default_label(self.point_counter),
            files: Vec::new(),
        });
    }

    /// 表示名を1..Nに詰め直す（既定形のラベルも追従）
    fn renumber(&mut self) {
        for (i, point) in self.points.iter_mut().enumerate() {
            point.name = point_name(i + 1);
            if DEFAULT_LABEL_RE.is_match(&point.label) {
                point.label = default_label(i + 1);
            }
        }
        self.point_counter = self.points.len();
    }

    fn clear_outputs(&mut self) {
        self.results.clear();
        self.overall_report = None;
    }

    fn fail(&mut self, message: String) {
        self.results.clear();
        self.error = Some(message);
        self.caption = CAPTION_ERROR.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::{sample_report, sample_result};

    fn image(name: &str) -> CandidateFile {
        CandidateFile {
            name: name.to_string(),
            mime_type: "image/jpeg".to_string(),
            bytes: vec![0xFF, 0xD8, 0xFF],
            source: None,
        }
    }

    fn ids(state: &AppState) -> Vec<String> {
        state.points.iter().map(|p| p.id.clone()).collect()
    }

    /// 3ポイント・各1枚・ラベル付きの状態
    fn ready_state() -> AppState {
        let mut state = AppState::new(true)
            .reduce(Action::AddPoint)
            .reduce(Action::AddPoint);
        for (i, id) in ids(&state).into_iter().enumerate() {
            state = state
                .reduce(Action::SelectFiles { id: id.clone(), candidates: vec![image("face.jpg")] })
                .reduce(Action::SetLabel { id, label: format!("2024-0{}", i + 1) });
        }
        state
    }

    // =============================================
    // 分析ポイントの追加・削除
    // =============================================

    #[test]
    fn test_initial_state_has_point_one() {
        let state = AppState::new(true);
        assert_eq!(state.points.len(), 1);
        assert_eq!(state.points[0].name, "分析ポイント #1");
        assert_eq!(state.points[0].label, "時期1");
        assert_eq!(state.caption, CAPTION_READY);
    }

    #[test]
    fn test_add_point_numbers_sequentially() {
        let state = AppState::new(true).reduce(Action::AddPoint).reduce(Action::AddPoint);
        let names: Vec<_> = state.points.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["分析ポイント #1", "分析ポイント #2", "分析ポイント #3"]);
        assert_eq!(state.points[2].label, "時期3");
    }

    #[test]
    fn test_remove_point_renumbers_names_and_default_labels() {
        let state = AppState::new(true).reduce(Action::AddPoint).reduce(Action::AddPoint);
        let ids = ids(&state);
        let state = state
            .reduce(Action::SetLabel { id: ids[2].clone(), label: "施術後".to_string() })
            .reduce(Action::RemovePoint { id: ids[0].clone() });

        assert_eq!(state.points.len(), 2);
        assert_eq!(state.points[0].name, "分析ポイント #1");
        assert_eq!(state.points[0].label, "時期1");
        assert_eq!(state.points[1].name, "分析ポイント #2");
        // ユーザーが入力したラベルは維持
        assert_eq!(state.points[1].label, "施術後");

        // 次に追加するポイントは #3
        let state = state.reduce(Action::AddPoint);
        assert_eq!(state.points[2].name, "分析ポイント #3");
    }

    #[test]
    fn test_remove_point_keeps_non_numeric_period_label() {
        let state = AppState::new(true).reduce(Action::AddPoint).reduce(Action::AddPoint);
        let ids = ids(&state);
        let state = state
            .reduce(Action::SetLabel { id: ids[1].clone(), label: "時期春".to_string() })
            .reduce(Action::RemovePoint { id: ids[0].clone() });

        assert_eq!(state.points[0].label, "時期春");
        assert_eq!(state.points[1].label, "時期2");
    }

    #[test]
    fn test_remove_all_then_add_resets_numbering() {
        let state = AppState::new(true).reduce(Action::AddPoint);
        let mut state = state;
        for id in ids(&state) {
            state = state.reduce(Action::RemovePoint { id });
        }
        assert!(state.points.is_empty());

        let state = state.reduce(Action::AddPoint);
        assert_eq!(state.points.len(), 1);
        assert_eq!(state.points[0].name, "分析ポイント #1");
        assert_eq!(state.points[0].label, "時期1");
    }

    #[test]
    fn test_point_ids_stay_unique_after_removal() {
        let state = AppState::new(true).reduce(Action::AddPoint);
        let first = ids(&state);
        let state = state
            .reduce(Action::RemovePoint { id: first[1].clone() })
            .reduce(Action::AddPoint);
        let after = ids(&state);
        assert_eq!(after.len(), 2);
        assert_ne!(after[0], after[1]);
        assert!(!first[1..].contains(&after[1]));
    }

    // =============================================
    // 結果の破棄
    // =============================================

    #[test]
    fn test_label_and_file_changes_clear_outputs() {
        let mut state = ready_state();
        state.results = vec![sample_result("30代")];
        state.overall_report = Some(sample_report());
        let id = state.points[0].id.clone();

        let state = state.reduce(Action::SetLabel { id: id.clone(), label: "変更".to_string() });
        assert!(state.results.is_empty());
        assert!(state.overall_report.is_none());

        let mut state = state;
        state.results = vec![sample_result("30代")];
        state.error = Some("前のエラー".to_string());
        let file_id = state.points[0].files[0].id.clone();
        let state = state.reduce(Action::RemoveFile { id, file_id });
        assert!(state.results.is_empty());
        assert!(state.error.is_none());
        assert!(state.points[0].files.is_empty());
    }

    #[test]
    fn test_select_files_records_intake_warnings() {
        let state = AppState::new(true);
        let id = state.points[0].id.clone();
        let mut text = image("memo.txt");
        text.mime_type = "text/plain".to_string();

        let state = state.reduce(Action::SelectFiles { id, candidates: vec![image("a.jpg"), text] });
        assert_eq!(state.points[0].files.len(), 1);
        assert_eq!(state.intake_warnings.len(), 1);
    }

    #[test]
    fn test_file_ids_unique_across_points() {
        let state = ready_state();
        let mut file_ids: Vec<_> = state
            .points
            .iter()
            .flat_map(|p| p.files.iter().map(|f| f.id.clone()))
            .collect();
        file_ids.dedup();
        assert_eq!(file_ids, ["file-0", "file-1", "file-2"]);
    }

    #[test]
    fn test_edits_ignored_while_busy() {
        let state = ready_state().reduce(Action::RunStarted(RunMode::Individual));
        let before = state.clone();
        let state = state.reduce(Action::AddPoint);
        assert_eq!(state, before);
    }

    // =============================================
    // 事前検証
    // =============================================

    #[test]
    fn test_plan_requires_files() {
        let state = AppState::new(true);
        let err = state.plan(RunMode::Individual).unwrap_err();
        assert_eq!(err.to_string(), MSG_MISSING_FILES);
    }

    #[test]
    fn test_plan_requires_trimmed_label() {
        let state = ready_state();
        let id = state.points[1].id.clone();
        let state = state.reduce(Action::SetLabel { id, label: "   ".to_string() });
        let err = state.plan(RunMode::Individual).unwrap_err();
        assert_eq!(err.to_string(), MSG_MISSING_LABELS);
        assert!(!state.can_analyze_individual());
    }

    #[test]
    fn test_plan_requires_api_key() {
        let state = ready_state().reduce(Action::SetApiKeyPresent(false));
        assert_eq!(state.plan(RunMode::Individual).unwrap_err().to_string(), MSG_MISSING_API_KEY);
        assert_eq!(state.plan(RunMode::Overall).unwrap_err().to_string(), MSG_MISSING_API_KEY);
        assert_eq!(state.overall_disabled_reason(), Some("APIキーが設定されていません。"));
    }

    #[test]
    fn test_plan_overall_requires_two_points() {
        let state = AppState::new(true);
        let id = state.points[0].id.clone();
        let state = state.reduce(Action::SelectFiles { id, candidates: vec![image("a.jpg")] });

        assert!(state.plan(RunMode::Individual).is_ok());
        assert_eq!(state.plan(RunMode::Overall).unwrap_err().to_string(), MSG_NEED_TWO_POINTS);
        assert!(!state.can_generate_overall());
    }

    #[test]
    fn test_plan_snapshot_preserves_order() {
        let state = ready_state();
        let plan = state.plan(RunMode::Overall).unwrap();
        let labels: Vec<_> = plan.points.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, ["2024-01", "2024-02", "2024-03"]);

        let labeled = plan.labeled(&[sample_result("a"), sample_result("b"), sample_result("c")]);
        assert_eq!(labeled[2].label, "2024-03");
        assert_eq!(labeled[2].result.skin_age.estimated_age, "c");
    }

    #[test]
    fn test_plan_rejected_while_busy() {
        let state = ready_state().reduce(Action::RunStarted(RunMode::Overall));
        assert_eq!(state.plan(RunMode::Individual).unwrap_err().to_string(), MSG_BUSY);
    }

    // =============================================
    // 実行の開始と完了
    // =============================================

    #[test]
    fn test_individual_run_publishes_results() {
        let state = ready_state()
            .reduce(Action::RunStarted(RunMode::Individual))
            .reduce(Action::Progress("分析中".to_string()));
        assert!(state.is_busy());
        assert_eq!(state.caption, "分析中");

        let state = state.reduce(Action::IndividualFinished(Ok(vec![sample_result("30代")])));
        assert!(!state.is_busy());
        assert_eq!(state.results.len(), 1);
        assert_eq!(state.caption, "個別分析完了");
    }

    #[test]
    fn test_individual_failure_discards_results() {
        let mut state = ready_state();
        state.results = vec![sample_result("前回")];
        let state = state
            .reduce(Action::RunStarted(RunMode::Individual))
            .reduce(Action::IndividualFinished(Err("エラー (分析ポイント #2 - 2024-02): x".into())));
        assert!(state.results.is_empty());
        assert_eq!(state.error.as_deref(), Some("エラー (分析ポイント #2 - 2024-02): x"));
        assert_eq!(state.caption, CAPTION_ERROR);
    }

    #[test]
    fn test_overall_failure_keeps_point_results() {
        let state = ready_state()
            .reduce(Action::RunStarted(RunMode::Overall))
            .reduce(Action::PointsFinished(Ok(vec![sample_result("a"), sample_result("b")])));
        assert!(state.is_busy());

        let state = state.reduce(Action::OverallFinished(Err("総合経過分析レポート生成エラー: x".into())));
        assert!(!state.is_busy());
        assert_eq!(state.results.len(), 2);
        assert!(state.overall_report.is_none());
        assert!(state.error.as_deref().unwrap().starts_with("総合経過分析レポート生成エラー"));
    }

    #[test]
    fn test_overall_success_replaces_previous_report() {
        let mut old = sample_report();
        old.content.summary = "古い".to_string();
        let mut state = ready_state();
        state.overall_report = Some(old);

        let state = state.reduce(Action::RunStarted(RunMode::Overall));
        assert!(state.overall_report.is_none());
        let state = state
            .reduce(Action::PointsFinished(Ok(vec![sample_result("a")])))
            .reduce(Action::OverallFinished(Ok(sample_report())));
        assert_eq!(state.overall_report, Some(sample_report()));
        assert_eq!(state.caption, "総合レポート作成完了");
    }

    #[test]
    fn test_validation_failure_only_sets_error() {
        let mut state = ready_state();
        state.results = vec![sample_result("a")];
        let state = state.reduce(Action::ValidationFailed(MSG_NEED_TWO_POINTS.to_string()));
        assert_eq!(state.results.len(), 1);
        assert_eq!(state.error.as_deref(), Some(MSG_NEED_TWO_POINTS));
    }

    #[test]
    fn test_run_record_lists_points_and_files() {
        let state = ready_state().reduce(Action::RunStarted(RunMode::Individual)).reduce(
            Action::IndividualFinished(Ok(vec![sample_result("a"), sample_result("b"), sample_result("c")])),
        );
        let record = state.to_run_record("2026-01-01T00:00:00Z".to_string());
        assert_eq!(record.points.len(), 3);
        assert_eq!(record.points[0].files, ["face.jpg"]);
        assert_eq!(record.results.len(), 3);
    }
}
