//! Excel生成（共通ライブラリ）
//!
//! RunRecord から分析ポイントごとのシートと「総合」シートを作る。

use crate::report::{overall_sections, result_sections, Section};
use crate::types::RunRecord;
use rust_xlsxwriter::*;

const SECTION_COL_WIDTH: f64 = 22.0;
const ITEM_COL_WIDTH: f64 = 18.0;
const VALUE_COL_WIDTH: f64 = 70.0;

/// シート名に使えない文字を除き31文字に収める
fn sheet_name(base: &str) -> String {
    base.chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .take(31)
        .collect()
}

struct Formats {
    title: Format,
    section: Format,
    label: Format,
    value: Format,
}

impl Formats {
    fn new() -> Self {
        let title = Format::new()
            .set_bold()
            .set_font_size(14.0)
            .set_align(FormatAlign::Left)
            .set_align(FormatAlign::VerticalCenter);

        let section = Format::new()
            .set_bold()
            .set_font_size(10.0)
            .set_background_color(Color::RGB(0xE8EEF7))
            .set_align(FormatAlign::Left)
            .set_align(FormatAlign::VerticalCenter)
            .set_text_wrap()
            .set_border(FormatBorder::Hair)
            .set_border_color(Color::RGB(0xAAAAAA));

        let label = Format::new()
            .set_bold()
            .set_font_size(9.0)
            .set_font_color(Color::RGB(0x555555))
            .set_background_color(Color::RGB(0xF5F5F5))
            .set_align(FormatAlign::Center)
            .set_align(FormatAlign::VerticalCenter)
            .set_border(FormatBorder::Hair)
            .set_border_color(Color::RGB(0xAAAAAA));

        let value = Format::new()
            .set_font_size(11.0)
            .set_align(FormatAlign::Left)
            .set_align(FormatAlign::VerticalCenter)
            .set_text_wrap()
            .set_border(FormatBorder::Hair)
            .set_border_color(Color::RGB(0xCCCCCC));

        Self { title, section, label, value }
    }
}

/// 見出し行と (セクション, 項目, 値) の表を書き込む
fn write_sheet(
    worksheet: &mut Worksheet,
    title: &str,
    sections: &[Section],
    formats: &Formats,
) -> Result<(), String> {
    worksheet
        .set_column_width(0, SECTION_COL_WIDTH)
        .map_err(|e| format!("列幅設定エラー: {}", e))?;
    worksheet
        .set_column_width(1, ITEM_COL_WIDTH)
        .map_err(|e| format!("列幅設定エラー: {}", e))?;
    worksheet
        .set_column_width(2, VALUE_COL_WIDTH)
        .map_err(|e| format!("列幅設定エラー: {}", e))?;

    worksheet
        .merge_range(0, 0, 0, 2, title, &formats.title)
        .map_err(|e| format!("見出し書き込みエラー: {}", e))?;

    let mut row: u32 = 2;
    for section in sections {
        let span = section.entries.len().max(1) as u32;

        // セクション名（A列）
        if span > 1 {
            worksheet
                .merge_range(row, 0, row + span - 1, 0, &section.title, &formats.section)
                .map_err(|e| format!("セクションマージエラー: {}", e))?;
        } else {
            worksheet
                .write_string_with_format(row, 0, &section.title, &formats.section)
                .map_err(|e| format!("セクション書き込みエラー: {}", e))?;
        }

        for (offset, (key, value)) in section.entries.iter().enumerate() {
            let r = row + offset as u32;
            worksheet
                .write_string_with_format(r, 1, key, &formats.label)
                .map_err(|e| format!("ラベル書き込みエラー: {}", e))?;
            worksheet
                .write_string_with_format(r, 2, value, &formats.value)
                .map_err(|e| format!("値書き込みエラー: {}", e))?;
        }

        row += span;
    }

    Ok(())
}

/// Excelをバッファに生成
///
/// # Arguments
/// * `record` - 保存済みの実行結果
pub fn generate_excel_buffer(record: &RunRecord) -> Result<Vec<u8>, String> {
    if record.results.is_empty() && record.overall.is_none() {
        return Err("出力する分析結果がありません".to_string());
    }

    let formats = Formats::new();
    let mut workbook = Workbook::new();

    for (i, result) in record.results.iter().enumerate() {
        let label = record.label_for(i);
        let worksheet = workbook.add_worksheet();
        worksheet
            .set_name(sheet_name(&format!("{} {}", i + 1, label)))
            .map_err(|e| format!("シート名設定エラー: {}", e))?;

        let title = format!("分析結果 #{}: {}", i + 1, label);
        write_sheet(worksheet, &title, &result_sections(result), &formats)?;
    }

    if let Some(report) = &record.overall {
        let worksheet = workbook.add_worksheet();
        worksheet
            .set_name("総合")
            .map_err(|e| format!("シート名設定エラー: {}", e))?;
        write_sheet(worksheet, "総合経過分析レポート", &overall_sections(report), &formats)?;
    }

    workbook
        .save_to_buffer()
        .map_err(|e| format!("Excel保存エラー: {}", e))
}
