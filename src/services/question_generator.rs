//! 题目生成器 - 业务能力层
//!
//! 一个生成器 = 一张数据表 + 一个题目模板，只负责"生成一道题"
//!
//! ## 三种算法
//! - `Sorted` / `SortedMultiset`：随机抽两行，数组下标小的一行是正确答案。
//!   数据表本身已按 value 排好序，这里不再比较 value 大小。
//! - `Match`：随机抽正确行，把模板中的 `__` 换成它的 label，
//!   错误答案取另一行的 value（可限制在正确行附近 `adjacent_within` 行内）。

use rand::Rng;
use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use crate::models::{Entry, Question};

/// 模板中的占位符
const TEMPLATE_PLACEHOLDER: &str = "__";

/// 生成算法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeneratorVariant {
    Sorted,
    Match,
    SortedMultiset,
}

impl FromStr for GeneratorVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Sorted" => Ok(GeneratorVariant::Sorted),
            "Match" => Ok(GeneratorVariant::Match),
            "SortedMultiset" => Ok(GeneratorVariant::SortedMultiset),
            other => Err(format!("未知的生成器类型: {}", other)),
        }
    }
}

/// 题目生成器
///
/// 加载完成后只有 `active` 会变化，且只在显式重算激活状态时修改
#[derive(Debug, Clone)]
pub struct QuestionGenerator {
    pub variant: GeneratorVariant,
    pub tags: BTreeSet<String>,
    pub weight: f32,
    pub adjacent_within: Option<usize>,
    pub question_template: String,
    pub prefix: String,
    pub suffix: String,
    pub active: bool,
    /// 所属题库的 url
    pub database_url: String,
    entries: Arc<[Entry]>,
    distinct_values: bool,
}

impl QuestionGenerator {
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// 数据是否足以出一道题
    pub fn can_generate(&self) -> bool {
        match self.variant {
            GeneratorVariant::Match => self.entries.len() >= 2,
            GeneratorVariant::Sorted | GeneratorVariant::SortedMultiset => self.distinct_values,
        }
    }

    /// 生成一道题；数据不足时返回 `None`
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Question> {
        if !self.can_generate() {
            debug!("生成器数据不足，跳过: {}", self.question_template);
            return None;
        }
        let question = match self.variant {
            GeneratorVariant::Match => self.generate_match(rng),
            GeneratorVariant::Sorted | GeneratorVariant::SortedMultiset => {
                self.generate_sorted(rng)
            }
        };
        Some(question)
    }

    fn generate_match<R: Rng + ?Sized>(&self, rng: &mut R) -> Question {
        let correct_index = rng.gen_range(0..self.entries.len());
        let wrong_index = self.draw_wrong_index(correct_index, rng);

        let correct = &self.entries[correct_index];
        let wrong = &self.entries[wrong_index];

        Question {
            question_text: self
                .question_template
                .replace(TEMPLATE_PLACEHOLDER, correct.label()),
            correct_answer_text: correct.value().to_string(),
            wrong_answer_text: wrong.value().to_string(),
            correct_response_text: format!("The answer is {}.", correct.value()),
            wrong_response_text: format!(
                "The right answer is {}, not {}.",
                correct.value(),
                wrong.value()
            ),
        }
    }

    /// 为 `Match` 抽取错误答案下标
    ///
    /// 设置了 `adjacent_within` 时在 `[correct - a, correct + a]` 内抽取（截断到合法范围），
    /// 直到与正确下标不同
    pub(crate) fn draw_wrong_index<R: Rng + ?Sized>(&self, correct_index: usize, rng: &mut R) -> usize {
        let last = self.entries.len() - 1;
        let (low, high) = match self.adjacent_within {
            Some(within) => (
                correct_index.saturating_sub(within),
                (correct_index + within).min(last),
            ),
            None => (0, last),
        };

        loop {
            let wrong_index = rng.gen_range(low..=high);
            if wrong_index != correct_index {
                return wrong_index;
            }
        }
    }

    fn generate_sorted<R: Rng + ?Sized>(&self, rng: &mut R) -> Question {
        let (index1, index2) = loop {
            let index1 = rng.gen_range(0..self.entries.len());
            let index2 = rng.gen_range(0..self.entries.len());
            if self.entries[index1].value() != self.entries[index2].value() {
                break (index1, index2);
            }
        };

        // 下标小的一行为正确答案
        let correct = &self.entries[index1.min(index2)];
        let wrong = &self.entries[index1.max(index2)];

        let comparison = format!(
            "{} ({}{}{}) vs {} ({}{}{}).",
            correct.label(),
            self.prefix,
            correct.value(),
            self.suffix,
            wrong.label(),
            self.prefix,
            wrong.value(),
            self.suffix
        );

        Question {
            question_text: self.question_template.clone(),
            correct_answer_text: correct.label().to_string(),
            wrong_answer_text: wrong.label().to_string(),
            correct_response_text: format!("The answer is {}", comparison),
            wrong_response_text: format!("The right answer is {}", comparison),
        }
    }
}

/// 生成器构造器
///
/// 逐行收集数据，`build()` 时丢弃没有任何数据的生成器
#[derive(Debug, Clone)]
pub struct GeneratorBuilder {
    variant: GeneratorVariant,
    tags: BTreeSet<String>,
    weight: f32,
    adjacent_within: Option<usize>,
    question_template: String,
    prefix: String,
    suffix: String,
    database_url: String,
    entries: Vec<Entry>,
}

impl GeneratorBuilder {
    pub fn new(variant: GeneratorVariant, question_template: impl Into<String>) -> Self {
        Self {
            variant,
            tags: BTreeSet::new(),
            weight: 1.0,
            adjacent_within: None,
            question_template: question_template.into(),
            prefix: String::new(),
            suffix: String::new(),
            database_url: String::new(),
            entries: Vec::new(),
        }
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags
            .into_iter()
            .map(Into::into)
            .map(|t: String| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        self
    }

    pub fn weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    /// 0 表示不限制
    pub fn adjacent_within(mut self, within: usize) -> Self {
        self.adjacent_within = (within > 0).then_some(within);
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = url.into();
        self
    }

    pub fn set_prefix(&mut self, prefix: impl Into<String>) {
        self.prefix = prefix.into();
    }

    pub fn set_suffix(&mut self, suffix: impl Into<String>) {
        self.suffix = suffix.into();
    }

    pub fn set_adjacent_within(&mut self, within: usize) {
        self.adjacent_within = (within > 0).then_some(within);
    }

    /// 加入一行数据
    ///
    /// 规范化后为空的行被丢弃；`SortedMultiset` 会跳过 label 重复的行
    pub fn add_entry(&mut self, label: &str, value: &str) {
        let Some(entry) = Entry::normalize(label, value) else {
            return;
        };
        if self.variant == GeneratorVariant::SortedMultiset
            && self.entries.iter().any(|e| e.label() == entry.label())
        {
            return;
        }
        self.entries.push(entry);
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// 没有任何数据时返回 `None`
    pub fn build(self) -> Option<QuestionGenerator> {
        if self.entries.is_empty() {
            debug!("丢弃空生成器: {}", self.question_template);
            return None;
        }

        let distinct_values = self
            .entries
            .iter()
            .any(|e| e.value() != self.entries[0].value());

        Some(QuestionGenerator {
            variant: self.variant,
            tags: self.tags,
            weight: self.weight,
            adjacent_within: self.adjacent_within,
            question_template: self.question_template,
            prefix: self.prefix,
            suffix: self.suffix,
            active: true,
            database_url: self.database_url,
            entries: self.entries.into(),
            distinct_values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sorted_generator() -> QuestionGenerator {
        let mut builder = GeneratorBuilder::new(GeneratorVariant::Sorted, "Which is bigger?")
            .prefix("$")
            .suffix("M");
        builder.add_entry("A", "10");
        builder.add_entry("B", "20");
        builder.add_entry("C", "15");
        builder.build().unwrap()
    }

    fn match_generator(count: usize, within: usize) -> QuestionGenerator {
        let mut builder =
            GeneratorBuilder::new(GeneratorVariant::Match, "What is the capital of __?")
                .adjacent_within(within);
        for i in 0..count {
            builder.add_entry(&format!("Country{}", i), &format!("City{}", i));
        }
        builder.build().unwrap()
    }

    fn index_of(generator: &QuestionGenerator, label: &str) -> usize {
        generator
            .entries()
            .iter()
            .position(|e| e.label() == label)
            .unwrap()
    }

    #[test]
    fn test_sorted_prefers_lower_array_index() {
        let generator = sorted_generator();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..500 {
            let question = generator.generate(&mut rng).unwrap();
            let correct = index_of(&generator, &question.correct_answer_text);
            let wrong = index_of(&generator, &question.wrong_answer_text);
            assert!(correct < wrong, "{:?}", question);
        }
    }

    #[test]
    fn test_sorted_response_uses_prefix_and_suffix() {
        let generator = sorted_generator();
        let mut rng = StdRng::seed_from_u64(1);
        let question = generator.generate(&mut rng).unwrap();

        assert_eq!(question.question_text, "Which is bigger?");
        assert!(question.correct_response_text.starts_with("The answer is "));
        assert!(question.correct_response_text.contains("($"));
        assert!(question.wrong_response_text.starts_with("The right answer is "));
        assert!(question.wrong_response_text.contains("M) vs "));
    }

    #[test]
    fn test_match_wrong_index_stays_within_window() {
        let generator = match_generator(10, 2);
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..500 {
            let wrong = generator.draw_wrong_index(5, &mut rng);
            assert!([3, 4, 6, 7].contains(&wrong), "wrong index {}", wrong);
        }
        for _ in 0..200 {
            assert!([1, 2].contains(&generator.draw_wrong_index(0, &mut rng)));
            assert!([7, 8].contains(&generator.draw_wrong_index(9, &mut rng)));
        }
    }

    #[test]
    fn test_match_substitutes_label_into_template() {
        let generator = match_generator(4, 0);
        let mut rng = StdRng::seed_from_u64(11);

        for _ in 0..100 {
            let question = generator.generate(&mut rng).unwrap();
            let country = question
                .question_text
                .trim_start_matches("What is the capital of ")
                .trim_end_matches('?');
            let expected_city = country.replace("Country", "City");
            assert_eq!(question.correct_answer_text, expected_city);
            assert_ne!(question.correct_answer_text, question.wrong_answer_text);
            assert_eq!(
                question.wrong_response_text,
                format!(
                    "The right answer is {}, not {}.",
                    question.correct_answer_text, question.wrong_answer_text
                )
            );
        }
    }

    #[test]
    fn test_multiset_suppresses_duplicate_labels() {
        let mut builder = GeneratorBuilder::new(GeneratorVariant::SortedMultiset, "Q");
        builder.add_entry("A", "1");
        builder.add_entry("A", "2");
        builder.add_entry("B", "3");
        assert_eq!(builder.entry_count(), 2);

        let mut builder = GeneratorBuilder::new(GeneratorVariant::Sorted, "Q");
        builder.add_entry("A", "1");
        builder.add_entry("A", "2");
        assert_eq!(builder.entry_count(), 2);
    }

    #[test]
    fn test_empty_and_degenerate_generators() {
        let builder = GeneratorBuilder::new(GeneratorVariant::Sorted, "Q");
        assert!(builder.build().is_none());

        let mut builder = GeneratorBuilder::new(GeneratorVariant::Sorted, "Q");
        builder.add_entry("A", "1");
        builder.add_entry("B", "1");
        let generator = builder.build().unwrap();
        assert!(!generator.can_generate());
        assert!(generator.generate(&mut StdRng::seed_from_u64(0)).is_none());

        let generator = match_generator(1, 0);
        assert!(generator.generate(&mut StdRng::seed_from_u64(0)).is_none());
    }

    #[test]
    fn test_variant_parsing() {
        assert_eq!("Match".parse::<GeneratorVariant>(), Ok(GeneratorVariant::Match));
        assert!("Shuffled".parse::<GeneratorVariant>().is_err());
    }
}
