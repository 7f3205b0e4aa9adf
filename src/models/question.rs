use serde::{Deserialize, Serialize};

/// 生成好的二选一题目，写入缓冲区后不再修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub question_text: String,
    pub correct_answer_text: String,
    pub wrong_answer_text: String,
    /// 答对时显示的反馈
    pub correct_response_text: String,
    /// 答错时显示的反馈
    pub wrong_response_text: String,
}

impl std::fmt::Display for Question {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 截断题干以便显示（最多80个字符）
        let preview = crate::utils::logging::truncate_text(&self.question_text, 80);
        write!(
            f,
            "{} [{} / {}]",
            preview, self.correct_answer_text, self.wrong_answer_text
        )
    }
}
