use serde::Serialize;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// 题库描述
///
/// 以 url 作为身份：相等与哈希只看 url
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseDescriptor {
    pub name: String,
    pub url: String,
    /// 本地存储槽位，对应 `<data_dir>/<slot>.xml`
    pub storage_slot: u32,
    pub used: bool,
    pub downloaded: bool,
}

impl DatabaseDescriptor {
    /// 从远程清单新发现的题库，尚未分配槽位
    pub fn discovered(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            storage_slot: 0,
            used: false,
            downloaded: false,
        }
    }

    pub fn file_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(format!("{}.xml", self.storage_slot))
    }

    /// 由 url 推出题库名（去掉路径与扩展名）
    pub fn name_from_url(url: &str) -> String {
        let file = url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(url);
        match file.rfind('.') {
            Some(pos) if pos > 0 => file[..pos].to_string(),
            _ => file.to_string(),
        }
    }
}

impl PartialEq for DatabaseDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for DatabaseDescriptor {}

impl Hash for DatabaseDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}
