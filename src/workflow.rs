//! 解析ワークフロー
//!
//! 分析ポイントを並び順に1つずつ解析し、直前の結果を次の解析に引き継ぐ。
//! 総合分析では個別分析をやり直してから総合経過分析レポートを作成する。

use crate::error::{Result, SkinAiError};
use crate::sync::PersistenceBridge;
use async_trait::async_trait;
use skin_ai_common::{
    Action, AnalysisPlan, AppState, IntakeFile, LabeledResult, OverallReport, RunMode,
    SkinAnalysisResult,
};
use std::sync::Arc;

pub const CAPTION_CREATING_OVERALL: &str = "総合経過分析レポートを作成中...";

/// 外部AIとの境界
#[async_trait]
pub trait SkinAnalyzer: Send + Sync {
    /// 1つの分析ポイントを解析する。`previous` は直前ポイントの結果JSON
    async fn analyze_point(
        &self,
        files: &[IntakeFile],
        previous: Option<&str>,
    ) -> Result<SkinAnalysisResult>;

    /// ラベル付きの結果群から総合経過分析レポートを作成する
    async fn generate_overall(&self, items: &[LabeledResult]) -> Result<OverallReport>;
}

fn point_caption(mode: RunMode, name: &str, label: &str, i: usize, total: usize) -> String {
    match mode {
        RunMode::Individual => format!("{} ({}) を分析中 ({}/{})...", name, label, i, total),
        RunMode::Overall => format!("{} ({}) の個別分析を実行中 ({}/{})...", name, label, i, total),
    }
}

/// 全ポイントを順番に解析する
///
/// 途中で失敗したらそこで打ち切り、どのポイントで失敗したかを返す。
pub async fn run_points<A, F>(
    analyzer: &A,
    plan: &AnalysisPlan,
    mut on_progress: F,
) -> Result<Vec<SkinAnalysisResult>>
where
    A: SkinAnalyzer + ?Sized,
    F: FnMut(String),
{
    let total = plan.points.len();
    let mut results = Vec::with_capacity(total);
    let mut previous: Option<String> = None;

    for (i, point) in plan.points.iter().enumerate() {
        on_progress(point_caption(plan.mode, &point.name, &point.label, i + 1, total));
        tracing::debug!(point = %point.name, files = point.files.len(), chained = previous.is_some(), "analyzing point");

        let result = analyzer
            .analyze_point(&point.files, previous.as_deref())
            .await
            .map_err(|e| SkinAiError::PointFailed {
                name: point.name.clone(),
                label: point.label.clone(),
                source: Box::new(e),
            })?;

        if i + 1 < total {
            previous = Some(serde_json::to_string(&result)?);
        }
        results.push(result);
    }

    Ok(results)
}

/// 個別分析
pub async fn run_individual<A, F>(
    analyzer: &A,
    plan: &AnalysisPlan,
    on_progress: F,
) -> Result<Vec<SkinAnalysisResult>>
where
    A: SkinAnalyzer + ?Sized,
    F: FnMut(String),
{
    run_points(analyzer, plan, on_progress).await
}

/// 総合分析の結果
///
/// 個別分析が成功していれば `results` は常に埋まる。
/// `report` の失敗は `SkinAiError::OverallFailed`。
#[derive(Debug)]
pub struct OverallRun {
    pub results: Vec<SkinAnalysisResult>,
    pub report: Result<OverallReport>,
}

/// 総合分析（個別分析 → 総合経過分析レポート）
pub async fn run_overall<A, F>(
    analyzer: &A,
    plan: &AnalysisPlan,
    mut on_progress: F,
) -> Result<OverallRun>
where
    A: SkinAnalyzer + ?Sized,
    F: FnMut(String),
{
    let results = run_points(analyzer, plan, &mut on_progress).await?;

    on_progress(CAPTION_CREATING_OVERALL.to_string());
    let items = plan.labeled(&results);
    let report = analyzer
        .generate_overall(&items)
        .await
        .map_err(|e| SkinAiError::OverallFailed(Box::new(e)));

    Ok(OverallRun { results, report })
}

type Observer = Box<dyn Fn(&str) + Send + Sync>;

fn apply(state: &mut AppState, action: Action) {
    let current = std::mem::take(state);
    *state = current.reduce(action);
}

/// 状態・解析器・永続化をまとめて扱う
pub struct Controller {
    state: AppState,
    analyzer: Arc<dyn SkinAnalyzer>,
    bridge: Option<PersistenceBridge>,
    observer: Option<Observer>,
}

impl Controller {
    pub fn new(state: AppState, analyzer: Arc<dyn SkinAnalyzer>) -> Self {
        Self {
            state,
            analyzer,
            bridge: None,
            observer: None,
        }
    }

    pub fn with_bridge(mut self, bridge: PersistenceBridge) -> Self {
        self.bridge = Some(bridge);
        self
    }

    /// 進捗キャプションの通知先
    pub fn with_observer(mut self, observer: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn bridge(&self) -> Option<&PersistenceBridge> {
        self.bridge.as_ref()
    }

    pub fn dispatch(&mut self, action: Action) {
        apply(&mut self.state, action);
    }

    async fn prepare(&mut self, mode: RunMode) -> Result<AnalysisPlan> {
        if let Some(bridge) = &self.bridge {
            if !bridge.has_session().await {
                self.dispatch(Action::ValidationFailed(SkinAiError::NoSession.to_string()));
                return Err(SkinAiError::NoSession);
            }
        }

        let plan = match self.state.plan(mode) {
            Ok(plan) => plan,
            Err(e) => {
                self.dispatch(Action::ValidationFailed(e.to_string()));
                return Err(e.into());
            }
        };

        self.dispatch(Action::RunStarted(mode));
        if let Some(bridge) = &self.bridge {
            bridge.mirror_points(&plan.points).await;
        }
        Ok(plan)
    }

    /// 個別分析を実行
    pub async fn analyze_individual(&mut self) -> Result<Vec<SkinAnalysisResult>> {
        let plan = self.prepare(RunMode::Individual).await?;
        let analyzer = Arc::clone(&self.analyzer);

        let outcome = {
            let state = &mut self.state;
            let observer = &self.observer;
            run_individual(analyzer.as_ref(), &plan, |caption| {
                if let Some(notify) = observer {
                    notify(&caption);
                }
                apply(state, Action::Progress(caption));
            })
            .await
        };

        match outcome {
            Ok(results) => {
                self.dispatch(Action::IndividualFinished(Ok(results.clone())));
                if let Some(bridge) = &self.bridge {
                    bridge.mirror_results(&plan.points, &results).await;
                }
                Ok(results)
            }
            Err(e) => {
                tracing::error!("{}", e);
                self.dispatch(Action::IndividualFinished(Err(e.to_string())));
                Err(e)
            }
        }
    }

    /// 総合経過分析レポートを作成
    pub async fn generate_overall(&mut self) -> Result<OverallReport> {
        let plan = self.prepare(RunMode::Overall).await?;
        let analyzer = Arc::clone(&self.analyzer);

        let outcome = {
            let state = &mut self.state;
            let observer = &self.observer;
            run_overall(analyzer.as_ref(), &plan, |caption| {
                if let Some(notify) = observer {
                    notify(&caption);
                }
                apply(state, Action::Progress(caption));
            })
            .await
        };

        let run = match outcome {
            Ok(run) => run,
            Err(e) => {
                tracing::error!("{}", e);
                self.dispatch(Action::PointsFinished(Err(e.to_string())));
                return Err(e);
            }
        };

        self.dispatch(Action::PointsFinished(Ok(run.results.clone())));
        if let Some(bridge) = &self.bridge {
            bridge.mirror_results(&plan.points, &run.results).await;
        }

        match run.report {
            Ok(report) => {
                self.dispatch(Action::OverallFinished(Ok(report.clone())));
                if let Some(bridge) = &self.bridge {
                    bridge.mirror_report(&report).await;
                }
                Ok(report)
            }
            Err(e) => {
                tracing::error!("{}", e);
                self.dispatch(Action::OverallFinished(Err(e.to_string())));
                Err(e)
            }
        }
    }
}
