//! 标签注册表 - 业务能力层
//!
//! 持有 标签 → 使用策略 的映射，并负责父子标签的解析。
//! 激活状态不会在每次修改时自动重算，由调用方在一批修改后显式触发。

use std::collections::BTreeMap;
use tracing::debug;

use crate::models::tag::{parent_tag, TagUsage};
use crate::services::question_generator::QuestionGenerator;

#[derive(Debug, Clone, Default)]
pub struct TagRegistry {
    tags: BTreeMap<String, TagUsage>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册标签，新标签默认为 `Some`，子标签会顺带注册父标签
    pub fn register_tags<'a, I>(&mut self, tags: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        for tag in tags {
            if let Some(parent) = parent_tag(tag) {
                self.register(parent);
            }
            self.register(tag);
        }
    }

    fn register(&mut self, tag: &str) {
        if !self.tags.contains_key(tag) {
            debug!("注册标签: {}", tag);
            self.tags.insert(tag.to_string(), TagUsage::default());
        }
    }

    /// 读取存储的值；未注册的标签视为 `Some`
    pub fn usage(&self, tag: &str) -> TagUsage {
        self.tags.get(tag).copied().unwrap_or_default()
    }

    pub fn set_usage(&mut self, tag: &str, usage: TagUsage) {
        self.tags.insert(tag.to_string(), usage);
    }

    /// 切换到下一个状态并返回新值
    pub fn cycle_usage(&mut self, tag: &str) -> TagUsage {
        let next = self.usage(tag).next();
        self.set_usage(tag, next);
        next
    }

    /// 父标签为 `All` 时子标签一律视为 `All`
    pub fn resolved_usage(&self, tag: &str) -> TagUsage {
        if let Some(parent) = parent_tag(tag) {
            if self.resolved_usage(parent) == TagUsage::All {
                return TagUsage::All;
            }
        }
        self.usage(tag)
    }

    /// 任一标签为 `All`，或所有标签都不是 `None`
    pub fn is_generator_active(&self, generator: &QuestionGenerator) -> bool {
        let mut resolved = generator.tags.iter().map(|t| self.resolved_usage(t));
        let any_all = resolved.clone().any(|u| u == TagUsage::All);
        any_all || resolved.all(|u| u != TagUsage::None)
    }

    /// 按当前策略重算所有生成器的 `active`，返回激活数量
    pub fn recompute_activation(&self, generators: &mut [QuestionGenerator]) -> usize {
        let mut active_count = 0;
        for generator in generators.iter_mut() {
            generator.active = self.is_generator_active(generator);
            if generator.active {
                active_count += 1;
            }
        }
        debug!("激活生成器: {}/{}", active_count, generators.len());
        active_count
    }

    /// 按字典序遍历全部标签
    pub fn iter(&self) -> impl Iterator<Item = (&str, TagUsage)> {
        self.tags.iter().map(|(tag, usage)| (tag.as_str(), *usage))
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn clear(&mut self) {
        self.tags.clear();
    }
}
