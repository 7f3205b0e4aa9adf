//! 作答记录
//!
//! 校准统计模块只消费这些记录，本模块只负责生成

use serde::{Deserialize, Serialize};

/// 信心值下限（百分比）
pub const MIN_CREDENCE: f64 = 50.0;
/// 信心值上限（百分比）
pub const MAX_CREDENCE: f64 = 99.0;

/// 一次作答
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    /// 玩家对所选答案的信心（50-99）
    pub credence_percent: f64,
    pub correct: bool,
    /// 信息得分（centibits）
    pub score: i32,
}

impl AnswerRecord {
    pub fn new(credence_percent: f64, correct: bool) -> Self {
        let credence_percent = credence_percent.clamp(MIN_CREDENCE, MAX_CREDENCE);
        let prob_of_correct = if correct {
            credence_percent
        } else {
            100.0 - credence_percent
        };
        Self {
            credence_percent,
            correct,
            score: information_score(prob_of_correct),
        }
    }
}

/// score = round(100 * (log2(p / 100) + 1))
pub fn information_score(prob_of_correct_percent: f64) -> i32 {
    (100.0 * ((prob_of_correct_percent / 100.0).log2() + 1.0)).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_information_score_known_values() {
        assert_eq!(information_score(50.0), 0);
        assert_eq!(information_score(100.0), 100);
        assert_eq!(information_score(80.0), 68);
        assert_eq!(information_score(20.0), -132);
    }

    #[test]
    fn test_record_clamps_credence() {
        let record = AnswerRecord::new(120.0, true);
        assert_eq!(record.credence_percent, 99.0);
        assert_eq!(record.score, information_score(99.0));

        let record = AnswerRecord::new(80.0, false);
        assert_eq!(record.score, -132);
    }
}
