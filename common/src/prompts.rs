//! プロンプト生成モジュール
//!
//! - SYSTEM_INSTRUCTION: 個別分析（1ポイント）の指示
//! - build_chaining_preamble: 前回結果を引き継ぐ指示
//! - OVERALL_SYSTEM_INSTRUCTION / OVERALL_INTRODUCTION: 総合経過分析の指示
//! - build_labeled_result_block: 時期/ラベル付きの結果ブロック

use crate::types::SkinAnalysisResult;

/// 個別分析のシステム指示
pub const SYSTEM_INSTRUCTION: &str = r#"あなたは美容皮膚の観察に精通したアドバイザーです。提供された顔の画像/動画（同一人物・同一時点）を観察し、美容的観点から肌質と輪郭を評価してください。これは医学的診断ではありません。

## 出力形式（厳密にこのJSONオブジェクト形式で出力）
{
  "重要事項": "この評価が美容的観点によるものであること、画像条件による限界など、最初に伝えるべき事項",
  "肌年齢": { "推定肌年齢": "例: 30代前半", "所見": "根拠となる観察" },
  "ハリ（弾力）": { "評価": "良好/普通/低下 など", "所見": "具体的な観察" },
  "毛穴（なめらかさ）": { "評価": "...", "所見": "..." },
  "キメ": { "評価": "...", "所見": "..." },
  "シミ": { "評価": "...", "種類と所見": "種類（そばかす、肝斑など）と位置" },
  "シワ": { "評価": "...", "種類と所見": "種類（小ジワ、表情ジワなど）と位置" },
  "赤み": { "評価": "...", "所見": "..." },
  "輪郭分析": {
    "主要寸法": {
      "顔全体の縦の長さ（髪の生え際～顎先）": "約◯mm",
      "顔全体の横の最大幅": "約◯mm",
      "額の幅（こめかみ間）": "約◯mm",
      "頬骨の幅": "約◯mm",
      "エラの幅": "約◯mm",
      "顎先の幅": "約◯mm"
    },
    "顔のタイプ": { "推定": "卵型/丸型/面長/ベース型 など", "根拠": "寸法比などの根拠" },
    "左右対称性": { "所見": "..." }
  },
  "総合所見": "全体のまとめとスキンケアのアドバイス"
}

## 注意
- すべてのキーを必ず出力する（判断できない項目は「判定不能」と記載）
- 寸法は画像からの推定値であることを前提に、ミリ単位で記載
- 見えるものだけを記載し、推測で病名を挙げない
- JSONオブジェクトのみ出力。説明文は不要"#;

/// 総合経過分析のシステム指示
pub const OVERALL_SYSTEM_INSTRUCTION: &str = r#"あなたは美容皮膚の経過観察に精通したアドバイザーです。時系列に並んだ複数の肌分析結果を比較し、変化の経過をまとめてください。これは医学的診断ではありません。

## 出力形式（厳密にこのJSONオブジェクト形式で出力）
{
  "総合経過分析レポート": {
    "概要": "期間全体を通した変化の要約",
    "改善点": "改善が見られた項目と時期",
    "要注意点または悪化点": "悪化した、または注意が必要な項目",
    "観察された主な傾向": "肌年齢・ハリ・毛穴・キメ・シミ・シワ・赤み・輪郭の傾向",
    "推奨事項": "今後のスキンケア・生活習慣のアドバイス"
  }
}

## 注意
- 分析結果はラベルの順（古い順）に並んでいる
- 各項目で具体的な時期/ラベルに言及する
- JSONオブジェクトのみ出力。説明文は不要"#;

/// 総合経過分析の導入文
pub const OVERALL_INTRODUCTION: &str = "# 複数の肌分析結果に基づく総合経過分析の指示\n提供された以下の複数の肌分析結果（それぞれに時期/ラベルが付与されています）を時系列で比較検討し、総合的な経過分析レポートを作成してください。\n";

/// 前回の分析結果を引き継ぐ指示を生成
///
/// # Arguments
/// * `previous_json` - 直前のポイントの解析結果（JSON文字列）
pub fn build_chaining_preamble(previous_json: &str) -> String {
    format!(
        r#"# 前回の分析結果と今回の変化点についての指示
前回の分析結果(JSON形式)は以下の通りです:
```json
{previous_json}
```
今回の画像セットを分析する際は、上記の前回結果と比較し、肌の状態（肌年齢、ハリ、毛穴、キメ、シミ、シワ、赤み）と輪郭にどのような変化があるか、または維持されているかを具体的に指摘してください。改善点・悪化点・変わらない点を明確にし、総合所見には経過を踏まえたアドバイスを含めてください。
あくまで今回の画像セットの分析を主とし、前回結果は参考情報として扱ってください。
---
次に、通常の分析指示を開始します。
"#
    )
}

/// 時期/ラベル付きの結果ブロックを生成（JSONは整形して埋め込む）
pub fn build_labeled_result_block(label: &str, result: &SkinAnalysisResult) -> String {
    let json = serde_json::to_string_pretty(result).unwrap_or_default();
    format!("## 分析時期/ラベル: {label}\n```json\n{json}\n```\n")
}
