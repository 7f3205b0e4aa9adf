//! 标签使用策略

use serde::{Deserialize, Serialize};
use std::fmt;

/// 父子标签分隔符
pub const SUBTAG_DELIMITER: &str = "::";

/// 标签使用策略（三态）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TagUsage {
    /// 不出该标签的题
    None,
    /// 与其他标签共同决定
    #[default]
    Some,
    /// 只要带该标签就出题
    All,
}

impl TagUsage {
    /// 界面循环切换：None → Some → All → None
    pub fn next(self) -> Self {
        match self {
            TagUsage::None => TagUsage::Some,
            TagUsage::Some => TagUsage::All,
            TagUsage::All => TagUsage::None,
        }
    }
}

impl fmt::Display for TagUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TagUsage::None => "None",
            TagUsage::Some => "Some",
            TagUsage::All => "All",
        };
        write!(f, "{}", name)
    }
}

/// 拆出父标签，`"Capitals::Europe"` → `Some("Capitals")`
pub fn parent_tag(tag: &str) -> Option<&str> {
    tag.find(SUBTAG_DELIMITER).map(|pos| &tag[..pos])
}
