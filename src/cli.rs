use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "skin-ai")]
#[command(about = "AI肌経過分析ツール（複数時点の顔画像を比較）", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// 分析ポイントの指定 `[LABEL=]PATH`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PointArg {
    pub label: Option<String>,
    pub path: PathBuf,
}

impl std::str::FromStr for PointArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (label, path) = match s.split_once('=') {
            Some((label, path)) if !label.trim().is_empty() => (Some(label.trim().to_string()), path),
            Some((_, path)) => (None, path),
            None => (None, s),
        };
        if path.trim().is_empty() {
            return Err(format!("パスが指定されていません: {}", s));
        }
        Ok(PointArg {
            label,
            path: PathBuf::from(path),
        })
    }
}

/// analyze / report 共通の引数
#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// 分析ポイント（古い順に指定）。`ラベル=パス` または `パス`
    #[arg(short, long = "point", required = true)]
    pub points: Vec<PointArg>,

    /// 実行結果JSONの保存先
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// セッション名（省略時は日時）
    #[arg(short, long)]
    pub session: Option<String>,

    /// データベースに保存しない
    #[arg(long)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 各分析ポイントを個別に分析
    Analyze {
        #[command(flatten)]
        run: RunArgs,
    },

    /// 個別分析の後に総合経過分析レポートを作成（2ポイント以上）
    Report {
        #[command(flatten)]
        run: RunArgs,
    },

    /// 実行結果JSONからExcelを生成
    Export {
        /// 入力JSONファイル
        #[arg(required = true)]
        input: PathBuf,

        /// 出力ファイル（デフォルト: 入力と同じ名前の .xlsx）
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// ユーザーデータのエクスポート/削除
    Account {
        /// 全データをJSONに書き出す
        #[arg(long, conflicts_with = "delete")]
        export: Option<PathBuf>,

        /// 全データを削除
        #[arg(long)]
        delete: bool,

        /// 確認を省略
        #[arg(short, long)]
        yes: bool,
    },

    /// データベースの状態を確認
    Health,

    /// 設定を表示/編集
    Config {
        /// APIキーを設定
        #[arg(long)]
        set_api_key: Option<String>,

        /// ユーザーIDを設定
        #[arg(long)]
        set_user_id: Option<String>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },
}
