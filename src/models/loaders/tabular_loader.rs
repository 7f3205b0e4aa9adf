//! 制表符分隔的题目表格
//!
//! 第 0 行交替存放 id / 题目模板；可选的若干行存放每列的前缀、后缀、相邻范围；
//! 数据块从 `answers_line` 开始，遇到首格为 `truncate at` 的行结束。

use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;
use tracing::{info, warn};

use crate::error::{AppError, SourceError};
use crate::services::question_generator::{GeneratorBuilder, GeneratorVariant, QuestionGenerator};

/// 数据块结束标记
const SENTINEL: &str = "truncate at";

/// 表格布局：各类信息所在的行号
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TabularLayout {
    pub variant: GeneratorVariant,
    pub answers_line: usize,
    pub prefixes_line: Option<usize>,
    pub suffixes_line: Option<usize>,
    pub adjacent_line: Option<usize>,
    pub weight: f32,
}

impl TabularLayout {
    pub const COMPLETE_COMPARISON: Self = Self {
        variant: GeneratorVariant::Sorted,
        answers_line: 13,
        prefixes_line: Some(11),
        suffixes_line: Some(12),
        adjacent_line: None,
        weight: 1.0,
    };

    pub const MATCHING: Self = Self {
        variant: GeneratorVariant::Match,
        answers_line: 9,
        prefixes_line: None,
        suffixes_line: None,
        adjacent_line: Some(7),
        weight: 1.0,
    };

    pub const TOP_N_COMPARISON: Self = Self {
        variant: GeneratorVariant::Sorted,
        answers_line: 13,
        prefixes_line: Some(12),
        suffixes_line: Some(11),
        adjacent_line: None,
        weight: 1.0,
    };

    pub const REGIONAL_TOP_N_COMPARISON: Self = Self {
        variant: GeneratorVariant::Sorted,
        answers_line: 12,
        prefixes_line: None,
        suffixes_line: Some(11),
        adjacent_line: None,
        weight: 0.2,
    };

    pub const MULTISET_COMPARISON: Self = Self {
        variant: GeneratorVariant::SortedMultiset,
        answers_line: 12,
        prefixes_line: None,
        suffixes_line: Some(11),
        adjacent_line: None,
        weight: 1.0,
    };

    /// 按表格文件名找到预设布局
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "CompleteComparisonQuestions" => Some(Self::COMPLETE_COMPARISON),
            "MatchingQuestions" => Some(Self::MATCHING),
            "TopNComparisonQuestions" => Some(Self::TOP_N_COMPARISON),
            "RegionalTopNComparisonQuestions" => Some(Self::REGIONAL_TOP_N_COMPARISON),
            "MultisetComparisonQuestions" => Some(Self::MULTISET_COMPARISON),
            _ => None,
        }
    }
}

/// 解析表格文本
///
/// 相邻范围格式错误的列会被跳过，不影响其他列
pub fn parse_tabular(
    text: &str,
    layout: &TabularLayout,
    tags: &[String],
    database_url: &str,
) -> Result<Vec<QuestionGenerator>, AppError> {
    let separator = if text.contains('\r') { "\r\n" } else { "\n" };
    let lines: Vec<&str> = text.split(separator).collect();
    let row = |line: usize| row_cells(&lines, line);

    let header = row(0)?;
    let column_count = header.len().saturating_sub(1) / 2;
    let mut builders: Vec<Option<GeneratorBuilder>> = (0..column_count)
        .map(|n| {
            Some(
                GeneratorBuilder::new(layout.variant, header[2 * n + 1])
                    .tags(tags.iter().cloned())
                    .weight(layout.weight)
                    .database_url(database_url),
            )
        })
        .collect();

    if let Some(line) = layout.prefixes_line {
        let cells = row(line)?;
        for (n, builder) in builders.iter_mut().enumerate() {
            if let (Some(builder), Some(prefix)) = (builder.as_mut(), cells.get(2 * n + 2)) {
                builder.set_prefix(*prefix);
            }
        }
    }

    if let Some(line) = layout.suffixes_line {
        let cells = row(line)?;
        for (n, builder) in builders.iter_mut().enumerate() {
            if let (Some(builder), Some(suffix)) = (builder.as_mut(), cells.get(2 * n + 2)) {
                builder.set_suffix(*suffix);
            }
        }
    }

    if let Some(line) = layout.adjacent_line {
        let cells = row(line)?;
        for (n, slot) in builders.iter_mut().enumerate() {
            let cell = cells.get(2 * n + 1).map(|c| c.trim()).unwrap_or("");
            if cell.is_empty() {
                continue;
            }
            match cell.parse::<i64>() {
                Ok(within) => {
                    if let Some(builder) = slot.as_mut() {
                        builder.set_adjacent_within(within.max(0) as usize);
                    }
                }
                Err(_) => {
                    warn!("第 {} 列相邻范围格式错误 '{}'，跳过该生成器", n, cell);
                    *slot = None;
                }
            }
        }
    }

    for line in lines.iter().skip(layout.answers_line) {
        let cells: Vec<&str> = line.split('\t').collect();
        if cells.first().copied() == Some(SENTINEL) {
            break;
        }
        for (n, builder) in builders.iter_mut().enumerate() {
            if let (Some(builder), Some(label), Some(value)) =
                (builder.as_mut(), cells.get(2 * n + 1), cells.get(2 * n + 2))
            {
                builder.add_entry(label, value);
            }
        }
    }

    Ok(builders
        .into_iter()
        .flatten()
        .filter_map(GeneratorBuilder::build)
        .collect())
}

fn row_cells<'a>(lines: &[&'a str], line: usize) -> Result<Vec<&'a str>, AppError> {
    lines
        .get(line)
        .map(|l| l.split('\t').collect())
        .ok_or(AppError::Source(SourceError::MissingLine { line }))
}

/// 从文件加载表格，文件名（不含扩展名）决定预设布局
pub async fn load_tabular_file(
    path: &Path,
    tags: &[String],
    database_url: &str,
) -> Result<Vec<QuestionGenerator>> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let layout = TabularLayout::preset(stem)
        .with_context(|| format!("未知的表格布局: {}", path.display()))?;

    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取表格文件: {}", path.display()))?;

    let generators = parse_tabular(&content, &layout, tags, database_url)
        .with_context(|| format!("无法解析表格文件: {}", path.display()))?;
    info!("从 {} 加载 {} 个生成器", path.display(), generators.len());
    Ok(generators)
}
