//! 表格条目
//!
//! 一行 (label, value) 数据，加载后不可变

use serde::Serialize;

/// 大于该值的整数按千位分组显示
const GROUPING_THRESHOLD: i64 = 9999;

/// 题库中的一行数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    label: String,
    value: String,
}

impl Entry {
    /// 规范化一行原始数据
    ///
    /// 去除首尾空白，大整数加千位分隔符；label 或 value 为空时返回 `None`
    pub fn normalize(label: &str, value: &str) -> Option<Self> {
        let label = label.trim();
        let value = value.trim();
        if label.is_empty() || value.is_empty() {
            return None;
        }

        Some(Self {
            label: label.to_string(),
            value: group_large_integer(value),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// 1234567 → "1,234,567"；非整数或不超过 9999 的值原样返回
///
/// 只加千位分隔符，不补 `.00` 小数位
fn group_large_integer(value: &str) -> String {
    match value.parse::<i64>() {
        Ok(number) if number > GROUPING_THRESHOLD => {
            let digits = number.to_string();
            let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
            for (i, ch) in digits.chars().enumerate() {
                if i > 0 && (digits.len() - i) % 3 == 0 {
                    grouped.push(',');
                }
                grouped.push(ch);
            }
            grouped
        }
        _ => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_trims_and_drops_empty() {
        let entry = Entry::normalize("  France ", " Paris\t").unwrap();
        assert_eq!(entry.label(), "France");
        assert_eq!(entry.value(), "Paris");

        assert!(Entry::normalize("   ", "1").is_none());
        assert!(Entry::normalize("A", "").is_none());
    }

    #[test]
    fn test_large_integers_are_grouped() {
        assert_eq!(Entry::normalize("A", "9999").unwrap().value(), "9999");
        assert_eq!(Entry::normalize("A", "10000").unwrap().value(), "10,000");
        assert_eq!(Entry::normalize("A", "1234567").unwrap().value(), "1,234,567");
        assert_eq!(Entry::normalize("A", "-50000").unwrap().value(), "-50000");
        assert_eq!(Entry::normalize("A", "12.5").unwrap().value(), "12.5");
    }
}
