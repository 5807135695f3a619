use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use skin_ai_common::export::excel_core::generate_excel_buffer;
use skin_ai_common::report::{render_overall, render_result};
use skin_ai_common::state::MSG_MISSING_API_KEY;
use skin_ai_common::{Action, AppState, RunRecord};
use skin_ai_rust::backend::memory::MemoryBackend;
use skin_ai_rust::backend::supabase::SupabaseBackend;
use skin_ai_rust::backend::{health_check, Backend};
use skin_ai_rust::cli::{Cli, Commands, RunArgs};
use skin_ai_rust::config::Config;
use skin_ai_rust::error::SkinAiError;
use skin_ai_rust::gemini::GeminiClient;
use skin_ai_rust::sync::{delete_all_user_data, export_user_data, PersistenceBridge};
use skin_ai_rust::scanner;
use skin_ai_rust::workflow::Controller;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const OFFLINE_USER: &str = "offline-user";

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn remote_backend(config: &Config) -> anyhow::Result<Arc<dyn Backend>> {
    let settings = config.backend_settings()?;
    if !settings.uses_service_role {
        tracing::warn!("service role キーが無いため anon キーで接続します");
    }
    Ok(Arc::new(SupabaseBackend::new(&settings)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let saved = Config::load()?;
    let config = saved.clone().with_env();

    match cli.command {
        Commands::Analyze { run } => {
            println!("🔬 skin-ai - 個別分析\n");
            run_analysis(&config, run, false).await?;
        }

        Commands::Report { run } => {
            println!("🔬 skin-ai - 総合経過分析\n");
            run_analysis(&config, run, true).await?;
        }

        Commands::Export { input, output } => {
            println!("📄 skin-ai - エクスポート\n");

            let content = std::fs::read_to_string(&input)
                .with_context(|| format!("{} を読み込めません", input.display()))?;
            let record: RunRecord = serde_json::from_str(&content)?;
            let buffer = generate_excel_buffer(&record).map_err(SkinAiError::ExcelGeneration)?;

            let output = output.unwrap_or_else(|| input.with_extension("xlsx"));
            std::fs::write(&output, buffer)?;
            println!("✔ Excelを保存: {}", output.display());
        }

        Commands::Account { export, delete, yes } => {
            let user_id = config.get_user_id()?;
            let backend = remote_backend(&config)?;

            if let Some(path) = export {
                let data = export_user_data(backend.as_ref(), &user_id).await?;
                std::fs::write(&path, serde_json::to_string_pretty(&data)?)?;
                println!("✔ {}件のセッションを書き出しました: {}", data.sessions.len(), path.display());
            } else if delete {
                let confirmed = yes
                    || dialoguer::Confirm::new()
                        .with_prompt(format!("ユーザー {} の全データを削除しますか？", user_id))
                        .default(false)
                        .interact()?;
                if !confirmed {
                    println!("中止しました");
                    return Ok(());
                }
                delete_all_user_data(backend.as_ref(), &user_id).await?;
                println!("✔ 全データを削除しました");
            } else {
                println!("--export FILE または --delete を指定してください");
            }
        }

        Commands::Health => {
            let backend = remote_backend(&config)?;
            let report = health_check(backend.as_ref()).await;
            let mark = if report.is_healthy() { "✔" } else { "✖" };
            println!("{} {}", mark, report.message);
            if !report.missing_tables.is_empty() {
                println!("  不足テーブル: {}", report.missing_tables.join(", "));
            }
            if !report.available_buckets.is_empty() {
                println!("  バケット: {}", report.available_buckets.join(", "));
            }
            if !report.is_healthy() {
                std::process::exit(1);
            }
        }

        Commands::Config { set_api_key, set_user_id, show } => {
            let mut saved = saved;

            if let Some(key) = set_api_key {
                saved.set_api_key(key)?;
                println!("✔ APIキーを設定しました");
            }
            if let Some(id) = set_user_id {
                saved.set_user_id(id)?;
                println!("✔ ユーザーIDを設定しました");
            }

            if show {
                let config = saved.with_env();
                let configured = |v: &Option<String>| if v.is_some() { "設定済み" } else { "未設定" };
                println!("設定:");
                println!("  モデル: {}", config.model);
                println!("  総合分析モデル: {}", config.overall_model);
                println!("  最大ファイル数: {}", config.max_files);
                println!("  APIキー: {}", configured(&config.api_key));
                println!("  ユーザーID: {}", config.user_id.as_deref().unwrap_or("未設定"));
                println!("  Supabase URL: {}", config.supabase_url.as_deref().unwrap_or("未設定"));
                println!("  anon キー: {}", configured(&config.supabase_anon_key));
                println!("  service role キー: {}", configured(&config.supabase_service_role_key));
            }
        }
    }

    Ok(())
}

async fn run_analysis(config: &Config, run: RunArgs, overall: bool) -> anyhow::Result<()> {
    if !config.has_api_key() {
        eprintln!("⚠ {}", MSG_MISSING_API_KEY);
        return Err(SkinAiError::MissingApiKey.into());
    }
    let client = GeminiClient::from_config(config)?;

    // 1. セッション
    println!("[1/3] セッションを準備中...");
    let (backend, user_id): (Arc<dyn Backend>, String) = if run.offline {
        (Arc::new(MemoryBackend::new()), OFFLINE_USER.to_string())
    } else {
        (remote_backend(config)?, config.get_user_id()?)
    };
    let bridge = PersistenceBridge::connect(backend, &user_id).await?;
    let session_name = run
        .session
        .clone()
        .unwrap_or_else(|| format!("肌分析 {}", chrono::Local::now().format("%Y-%m-%d %H:%M")));
    let session = bridge.create_session(&session_name).await?;
    println!("✔ セッション: {}\n", session.session_name);

    // 2. ファイル取り込み
    println!("[2/3] ファイルを読み込み中...");
    let state = AppState::new(config.has_api_key()).with_max_files(config.max_files);
    let pb = spinner();
    let observer = pb.clone();
    let mut controller = Controller::new(state, Arc::new(client))
        .with_bridge(bridge)
        .with_observer(move |caption| observer.set_message(caption.to_string()));
    pb.set_message("ファイルを読み込み中...");

    for (i, point) in run.points.iter().enumerate() {
        if i > 0 {
            controller.dispatch(Action::AddPoint);
        }
        let Some(id) = controller.state().points.last().map(|p| p.id.clone()) else {
            continue;
        };

        let candidates = scanner::load_candidates(&point.path)?;
        controller.dispatch(Action::SelectFiles {
            id: id.clone(),
            candidates,
        });
        for warning in &controller.state().intake_warnings {
            pb.println(format!("⚠ {}", warning));
        }
        if let Some(label) = &point.label {
            controller.dispatch(Action::SetLabel {
                id: id.clone(),
                label: label.clone(),
            });
        }
    }
    for point in &controller.state().points {
        pb.println(format!("✔ {} ({}): {}ファイル", point.name, point.label, point.files.len()));
    }

    // 3. 解析
    pb.println("\n[3/3] AI解析中...");
    let outcome = if overall {
        controller.generate_overall().await.map(Some)
    } else {
        controller.analyze_individual().await.map(|_| None)
    };
    pb.finish_and_clear();

    let state = controller.state();
    for (i, (point, result)) in state.points.iter().zip(&state.results).enumerate() {
        println!("{}", render_result(i + 1, &point.label, result));
    }
    if let Some(report) = &state.overall_report {
        println!("{}", render_overall(report));
    }

    if let Some(path) = &run.output {
        if !state.results.is_empty() {
            write_record(path, state)?;
        }
    }

    outcome?;
    println!("\n✅ {}", state.caption);
    Ok(())
}

fn write_record(path: &Path, state: &AppState) -> anyhow::Result<()> {
    let record = state.to_run_record(chrono::Utc::now().to_rfc3339());
    std::fs::write(path, serde_json::to_string_pretty(&record)?)?;
    println!("✔ 結果を保存: {}", path.display());
    Ok(())
}
