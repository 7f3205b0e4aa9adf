//! 题库注册表 - 业务能力层
//!
//! 记录所有已知题库（按 url 去重）、槽位分配、下载/启用状态，
//! 以及题库内容在本地的存取与删除。网络请求不在这里，见 `orchestrator::database_sync`。

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::loaders::manifest::{parse_local_manifest, write_local_manifest, LocalManifest};
use crate::models::DatabaseDescriptor;

/// 本地题库列表文件名
pub const DATABASES_FILENAME: &str = "Databases.txt";

#[derive(Debug, Clone)]
pub struct DatabaseRegistry {
    data_dir: PathBuf,
    next_slot: u32,
    databases: Vec<DatabaseDescriptor>,
}

impl DatabaseRegistry {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            next_slot: 0,
            databases: Vec::new(),
        }
    }

    /// 读取本地题库列表；文件不存在时返回空注册表
    pub async fn load(data_dir: impl Into<PathBuf>) -> AppResult<Self> {
        let data_dir = data_dir.into();
        let path = data_dir.join(DATABASES_FILENAME);

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("⚠️ 未找到本地题库列表: {}", path.display());
                return Ok(Self::new(data_dir));
            }
            Err(e) => return Err(AppError::file_read_failed(path.display().to_string(), e)),
        };

        let manifest = parse_local_manifest(&content)?;
        let mut registry = Self {
            data_dir,
            next_slot: manifest.next_slot,
            databases: Vec::with_capacity(manifest.databases.len()),
        };
        for descriptor in manifest.databases {
            registry.add(descriptor);
        }
        info!("✓ 读取本地题库列表: {} 个题库", registry.len());
        Ok(registry)
    }

    /// 写回本地题库列表
    pub async fn save(&self) -> AppResult<()> {
        fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|e| AppError::file_write_failed(self.data_dir.display().to_string(), e))?;

        let path = self.data_dir.join(DATABASES_FILENAME);
        let text = write_local_manifest(&LocalManifest {
            next_slot: self.next_slot,
            databases: self.databases.clone(),
        });
        fs::write(&path, text)
            .await
            .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))?;
        debug!("保存题库列表: {}", path.display());
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn next_slot(&self) -> u32 {
        self.next_slot
    }

    /// 加入题库；url 已存在时什么也不做并返回 `false`
    pub fn add(&mut self, descriptor: DatabaseDescriptor) -> bool {
        if self.contains(&descriptor.url) {
            return false;
        }
        self.databases.push(descriptor);
        true
    }

    /// 分配下一个存储槽位
    pub fn allocate_slot(&mut self) -> u32 {
        let slot = self.next_slot;
        self.next_slot += 1;
        slot
    }

    /// 合并远程清单：新题库分配槽位，默认未启用、未下载；返回新增数量
    pub fn merge_manifest(&mut self, discovered: Vec<DatabaseDescriptor>) -> usize {
        let mut added = 0;
        for mut descriptor in discovered {
            if self.contains(&descriptor.url) {
                continue;
            }
            descriptor.storage_slot = self.allocate_slot();
            descriptor.used = false;
            descriptor.downloaded = false;
            debug!("发现新题库: {} ({})", descriptor.name, descriptor.url);
            self.databases.push(descriptor);
            added += 1;
        }
        added
    }

    pub fn contains(&self, url: &str) -> bool {
        self.databases.iter().any(|db| db.url == url)
    }

    pub fn get(&self, url: &str) -> Option<&DatabaseDescriptor> {
        self.databases.iter().find(|db| db.url == url)
    }

    fn get_mut(&mut self, url: &str) -> Option<&mut DatabaseDescriptor> {
        self.databases.iter_mut().find(|db| db.url == url)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DatabaseDescriptor> {
        self.databases.iter()
    }

    pub fn urls(&self) -> Vec<String> {
        self.databases.iter().map(|db| db.url.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.databases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.databases.is_empty()
    }

    /// 启用/停用题库，题库不存在时返回 `false`
    pub fn set_used(&mut self, url: &str, used: bool) -> bool {
        match self.get_mut(url) {
            Some(db) => {
                db.used = used;
                true
            }
            None => false,
        }
    }

    /// 内容损坏：本次会话内视为未启用、未下载
    pub fn mark_broken(&mut self, url: &str) {
        if let Some(db) = self.get_mut(url) {
            db.used = false;
            db.downloaded = false;
        }
    }

    /// 已启用的题库 url
    pub fn used_urls(&self) -> HashSet<String> {
        self.databases
            .iter()
            .filter(|db| db.used)
            .map(|db| db.url.clone())
            .collect()
    }

    /// 题库内容文件路径
    pub fn file_path(&self, descriptor: &DatabaseDescriptor) -> PathBuf {
        descriptor.file_path(&self.data_dir)
    }

    /// 把下载到的内容写入题库槽位，并标记为已下载
    pub async fn store_content(&mut self, url: &str, content: &[u8]) -> AppResult<PathBuf> {
        let path = match self.get(url) {
            Some(db) => self.file_path(db),
            None => {
                return Err(AppError::UnknownDatabase {
                    url: url.to_string(),
                });
            }
        };
        write_file(&self.data_dir, &path, content).await?;
        if let Some(db) = self.get_mut(url) {
            db.downloaded = true;
        }
        Ok(path)
    }

    /// 删除所有未启用的题库及其文件，但至少保留一个题库
    ///
    /// 返回被删除的题库
    pub async fn remove_unselected(&mut self) -> Vec<DatabaseDescriptor> {
        if self.databases.is_empty() {
            return Vec::new();
        }

        // 全部未启用时保留一个（优先保留已下载的）
        let keep_url = if self.databases.iter().all(|db| !db.used) {
            self.databases
                .iter()
                .find(|db| db.downloaded)
                .or_else(|| self.databases.first())
                .map(|db| db.url.clone())
        } else {
            None
        };

        let (kept, removed): (Vec<_>, Vec<_>) = std::mem::take(&mut self.databases)
            .into_iter()
            .partition(|db| db.used || keep_url.as_deref() == Some(db.url.as_str()));
        self.databases = kept;

        for db in &removed {
            let path = self.file_path(db);
            match fs::remove_file(&path).await {
                Ok(()) => debug!("删除题库文件: {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(
                    "{}",
                    AppError::file_delete_failed(path.display().to_string(), e)
                ),
            }
        }

        info!("🗑️ 删除 {} 个未启用的题库，剩余 {} 个", removed.len(), self.len());
        removed
    }
}

/// 写入文件，必要时创建目录
pub(crate) async fn write_file(data_dir: &Path, path: &Path, content: &[u8]) -> AppResult<()> {
    fs::create_dir_all(data_dir)
        .await
        .map_err(|e| AppError::file_write_failed(data_dir.display().to_string(), e))?;
    fs::write(path, content)
        .await
        .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(url: &str, used: bool) -> DatabaseDescriptor {
        DatabaseDescriptor {
            name: url.to_string(),
            url: url.to_string(),
            storage_slot: 0,
            used,
            downloaded: true,
        }
    }

    #[test]
    fn test_duplicate_url_is_ignored() {
        let mut registry = DatabaseRegistry::new("unused");
        assert!(registry.add(descriptor("http://a", true)));
        assert!(!registry.add(descriptor("http://a", false)));
        assert_eq!(registry.len(), 1);
        assert!(registry.get("http://a").unwrap().used);
    }

    #[test]
    fn test_merge_assigns_increasing_slots_to_new_entries_only() {
        let mut registry = DatabaseRegistry::new("unused");
        let slot = registry.allocate_slot();
        let mut existing = descriptor("http://a", true);
        existing.storage_slot = slot;
        registry.add(existing);

        let added = registry.merge_manifest(vec![
            DatabaseDescriptor::discovered("A again", "http://a"),
            DatabaseDescriptor::discovered("B", "http://b"),
            DatabaseDescriptor::discovered("C", "http://c"),
        ]);

        assert_eq!(added, 2);
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.get("http://a").unwrap().name, "http://a");
        assert_eq!(registry.get("http://b").unwrap().storage_slot, 1);
        assert_eq!(registry.get("http://c").unwrap().storage_slot, 2);
        assert!(!registry.get("http://c").unwrap().used);
        assert_eq!(registry.next_slot(), 3);
    }

    #[tokio::test]
    async fn test_remove_unselected_keeps_used() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = DatabaseRegistry::new(dir.path());
        registry.add(descriptor("http://a", true));
        let mut b = descriptor("http://b", false);
        b.storage_slot = 1;
        registry.add(b);
        registry.store_content("http://b", b"<x/>").await.unwrap();

        let removed = registry.remove_unselected().await;
        assert_eq!(removed.len(), 1);
        assert_eq!(registry.urls(), vec!["http://a".to_string()]);
        assert!(!dir.path().join("1.xml").exists());
    }

    #[tokio::test]
    async fn test_remove_unselected_never_empties_registry() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = DatabaseRegistry::new(dir.path());
        let mut a = descriptor("http://a", false);
        a.downloaded = false;
        registry.add(a);
        registry.add(descriptor("http://b", false));

        registry.remove_unselected().await;
        assert_eq!(registry.len(), 1);
        // 优先保留已下载的题库
        assert!(registry.contains("http://b"));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = DatabaseRegistry::new(dir.path());
        registry.merge_manifest(vec![DatabaseDescriptor::discovered("A", "http://a")]);
        registry.set_used("http://a", true);
        registry.save().await.unwrap();

        let loaded = DatabaseRegistry::load(dir.path()).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.next_slot(), 1);
        assert!(loaded.get("http://a").unwrap().used);
    }

    #[tokio::test]
    async fn test_missing_registry_file_yields_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let registry = DatabaseRegistry::load(dir.path().join("nothing")).await.unwrap();
        assert!(registry.is_empty());
    }
}
