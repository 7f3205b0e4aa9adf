//! 题库同步 - 编排层
//!
//! ## 职责
//!
//! 1. **清单合并**：下载远程清单，把新题库合并进注册表
//! 2. **逐个下载**：严格串行，一个题库下载完才开始下一个
//! 3. **容错**：单个题库失败只记录错误消息，继续下一个
//! 4. **进度**：通过 `watch` 通道发布 `SyncProgress`，界面随时读取，不会阻塞
//! 5. **按 url 添加**：下载、校验、分配槽位

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::clients::FetchClient;
use crate::error::AppResult;
use crate::models::loaders::{load_question_bank, parse_remote_manifest};
use crate::models::DatabaseDescriptor;
use crate::services::database_registry::{write_file, DatabaseRegistry};
use crate::utils::logging::log_sync_complete;

pub const MSG_UPDATED: &str = "Updated all databases successfully.";
pub const MSG_ALREADY_EXISTS: &str = "Current database already exists.";
pub const MSG_ADDED: &str = "Added new database successfully.";
pub const MSG_INVALID_FORMAT: &str = "The database file is not in a valid format.";

/// 同步进度快照
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncProgress {
    pub running: bool,
    /// 已处理（无论成败）的题库数
    pub completed: usize,
    pub total: usize,
    /// 当前题库的下载比例
    pub current_fraction: f32,
    /// 最近一条状态消息；出错时只保留最新的错误
    pub message: Option<String>,
}

impl SyncProgress {
    /// 总体进度 `(completed + current_fraction) / total`
    pub fn overall(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        ((self.completed as f32 + self.current_fraction) / self.total as f32).min(1.0)
    }
}

/// 一次批量同步的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// 清单中新发现的题库
    pub added: usize,
    pub downloaded: usize,
    pub failed: usize,
}

/// 按 url 添加题库的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    AlreadyExists,
    InvalidFormat,
}

/// 题库同步器
pub struct DatabaseSync {
    client: FetchClient,
    progress: watch::Sender<SyncProgress>,
}

impl DatabaseSync {
    pub fn new(client: FetchClient) -> Self {
        let (progress, _) = watch::channel(SyncProgress::default());
        Self { client, progress }
    }

    /// 订阅进度
    pub fn subscribe(&self) -> watch::Receiver<SyncProgress> {
        self.progress.subscribe()
    }

    /// 当前进度快照
    pub fn progress(&self) -> SyncProgress {
        self.progress.borrow().clone()
    }

    /// 同步远程清单并下载所有题库
    ///
    /// 清单本身下载或解析失败时只记录消息，已有题库仍然逐个下载
    pub async fn update_all(
        &self,
        registry: &mut DatabaseRegistry,
        manifest_url: &str,
    ) -> SyncReport {
        let mut report = SyncReport::default();
        self.progress.send_replace(SyncProgress {
            running: true,
            ..SyncProgress::default()
        });

        info!("📥 下载题库清单: {}", manifest_url);
        match self.fetch_manifest(manifest_url).await {
            Ok(discovered) => {
                report.added = registry.merge_manifest(discovered);
                info!("✓ 清单合并完成，新增 {} 个题库", report.added);
            }
            Err(e) => {
                error!("❌ 清单同步失败: {}", e);
                self.set_message(e.to_string());
                report.failed += 1;
            }
        }

        let urls = registry.urls();
        self.progress.send_modify(|p| p.total = urls.len());

        for (index, url) in urls.iter().enumerate() {
            info!("[{}/{}] 下载题库: {}", index + 1, urls.len(), url);
            let fetched = self
                .client
                .fetch_with_progress(url, |fraction| {
                    self.progress.send_modify(|p| p.current_fraction = fraction)
                })
                .await;

            let stored = match fetched {
                Ok(content) => registry.store_content(url, &content).await.map(|_| ()),
                Err(e) => Err(e),
            };
            match stored {
                Ok(()) => report.downloaded += 1,
                Err(e) => {
                    error!("[{}/{}] ❌ {}", index + 1, urls.len(), e);
                    self.set_message(e.to_string());
                    report.failed += 1;
                }
            }

            self.progress.send_modify(|p| {
                p.completed = index + 1;
                p.current_fraction = 0.0;
            });
        }

        if let Err(e) = registry.save().await {
            error!("❌ 保存题库列表失败: {}", e);
            self.set_message(e.to_string());
            report.failed += 1;
        }

        if report.failed == 0 {
            let mut message = MSG_UPDATED.to_string();
            if report.added > 0 {
                message.push_str(&format!(" Added {} new databases.", report.added));
            }
            self.set_message(message);
        }
        self.progress.send_modify(|p| p.running = false);

        log_sync_complete(&report);
        report
    }

    /// 按 url 添加单个题库
    ///
    /// 内容先写入下一个槽位再尝试解析；解析失败则删除文件，槽位计数不前进
    pub async fn add_new_database(
        &self,
        registry: &mut DatabaseRegistry,
        url: &str,
    ) -> AppResult<AddOutcome> {
        let url = url.trim();
        if registry.contains(url) {
            self.set_message(MSG_ALREADY_EXISTS.to_string());
            return Ok(AddOutcome::AlreadyExists);
        }

        self.progress.send_replace(SyncProgress {
            running: true,
            total: 1,
            ..SyncProgress::default()
        });

        let result = self.fetch_and_register(registry, url).await;
        let message = match &result {
            Ok(AddOutcome::Added) => MSG_ADDED.to_string(),
            Ok(AddOutcome::InvalidFormat) => MSG_INVALID_FORMAT.to_string(),
            Ok(AddOutcome::AlreadyExists) => MSG_ALREADY_EXISTS.to_string(),
            Err(e) => e.to_string(),
        };
        self.progress.send_modify(|p| {
            p.running = false;
            p.completed = 1;
            p.current_fraction = 0.0;
            p.message = Some(message);
        });
        result
    }

    async fn fetch_and_register(
        &self,
        registry: &mut DatabaseRegistry,
        url: &str,
    ) -> AppResult<AddOutcome> {
        let content = self
            .client
            .fetch_with_progress(url, |fraction| {
                self.progress.send_modify(|p| p.current_fraction = fraction)
            })
            .await?;

        let mut descriptor = DatabaseDescriptor::discovered(DatabaseDescriptor::name_from_url(url), url);
        descriptor.storage_slot = registry.next_slot();
        let path = registry.file_path(&descriptor);
        write_file(registry.data_dir(), &path, &content).await?;

        if let Err(e) = load_question_bank(&path, url).await {
            warn!("⚠️ 新题库格式错误 {}: {}", url, e);
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!("删除无效题库文件失败 {}: {}", path.display(), e);
            }
            return Ok(AddOutcome::InvalidFormat);
        }

        descriptor.storage_slot = registry.allocate_slot();
        descriptor.used = true;
        descriptor.downloaded = true;
        info!("✓ 添加题库 '{}' (槽位 {})", descriptor.name, descriptor.storage_slot);
        registry.add(descriptor);
        registry.save().await?;
        Ok(AddOutcome::Added)
    }

    async fn fetch_manifest(&self, manifest_url: &str) -> AppResult<Vec<DatabaseDescriptor>> {
        let text = self.client.fetch_text(manifest_url).await?;
        parse_remote_manifest(&text)
    }

    fn set_message(&self, message: String) {
        self.progress.send_modify(|p| p.message = Some(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BANK: &str = r#"<QuestionGenerators>
  <QuestionGenerator Used="y" Tags="Capitals" Type="Match" Weight="1" QuestionText="Capital of __?">
    <Answer Text="France" Value="Paris"/>
    <Answer Text="Italy" Value="Rome"/>
  </QuestionGenerator>
</QuestionGenerators>"#;

    fn sync() -> DatabaseSync {
        let config = Config {
            fetch_timeout_secs: 5,
            ..Config::default()
        };
        DatabaseSync::new(FetchClient::new(&config).unwrap())
    }

    async fn mount(server: &MockServer, route: &str, status: u16, body: &str) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_update_continues_after_failed_download() {
        let _ = tracing_subscriber::fmt::try_init();
        let server = MockServer::start().await;
        let manifest = format!(
            "0\n3\nGood\n{uri}/good.xml\nMissing\n{uri}/missing.xml\nAlso good\n{uri}/also.xml\n",
            uri = server.uri()
        );
        mount(&server, "/Databases.txt", 200, &manifest).await;
        mount(&server, "/good.xml", 200, BANK).await;
        mount(&server, "/missing.xml", 500, "").await;
        mount(&server, "/also.xml", 200, BANK).await;

        let dir = tempfile::tempdir().unwrap();
        let mut registry = DatabaseRegistry::new(dir.path());
        let sync = sync();
        let report = sync
            .update_all(&mut registry, &format!("{}/Databases.txt", server.uri()))
            .await;

        assert_eq!(report, SyncReport { added: 3, downloaded: 2, failed: 1 });
        let progress = sync.progress();
        assert!(!progress.running);
        assert_eq!(progress.completed, 3);
        assert_eq!(progress.overall(), 1.0);
        // 有失败时保留错误消息，而不是成功消息
        assert!(progress.message.unwrap().contains("500"));

        let missing = registry.get(&format!("{}/missing.xml", server.uri())).unwrap();
        assert!(!missing.downloaded);
        assert!(dir.path().join("0.xml").exists());
        assert!(dir.path().join("2.xml").exists());
        assert!(dir.path().join("Databases.txt").exists());
    }

    #[tokio::test]
    async fn test_failed_redownload_keeps_previous_copy() {
        let server = MockServer::start().await;
        let url = format!("{}/flaky.xml", server.uri());
        let manifest = format!("0\n1\nFlaky\n{}\n", url);
        mount(&server, "/Databases.txt", 200, &manifest).await;
        mount(&server, "/flaky.xml", 500, "").await;

        let dir = tempfile::tempdir().unwrap();
        let mut registry = DatabaseRegistry::new(dir.path());
        let mut descriptor = DatabaseDescriptor::discovered("Flaky", url.as_str());
        descriptor.storage_slot = registry.allocate_slot();
        descriptor.used = true;
        registry.add(descriptor);
        let path = registry.store_content(&url, BANK.as_bytes()).await.unwrap();

        let report = sync()
            .update_all(&mut registry, &format!("{}/Databases.txt", server.uri()))
            .await;

        assert_eq!(report, SyncReport { added: 0, downloaded: 0, failed: 1 });
        let flaky = registry.get(&url).unwrap();
        assert!(flaky.downloaded && flaky.used);
        assert_eq!(std::fs::read_to_string(path).unwrap(), BANK);
    }

    #[tokio::test]
    async fn test_update_success_message_counts_new_databases() {
        let server = MockServer::start().await;
        let manifest = format!("0\n1\nGood\n{}/good.xml\n", server.uri());
        mount(&server, "/Databases.txt", 200, &manifest).await;
        mount(&server, "/good.xml", 200, BANK).await;

        let dir = tempfile::tempdir().unwrap();
        let mut registry = DatabaseRegistry::new(dir.path());
        let sync = sync();
        let mut receiver = sync.subscribe();
        sync.update_all(&mut registry, &format!("{}/Databases.txt", server.uri()))
            .await;

        assert!(receiver.has_changed().unwrap());
        let progress = receiver.borrow_and_update().clone();
        assert_eq!(
            progress.message.as_deref(),
            Some("Updated all databases successfully. Added 1 new databases.")
        );
    }

    #[tokio::test]
    async fn test_add_new_database() {
        let server = MockServer::start().await;
        mount(&server, "/extra.xml", 200, BANK).await;
        mount(&server, "/junk.txt", 200, "not a bank").await;

        let dir = tempfile::tempdir().unwrap();
        let mut registry = DatabaseRegistry::new(dir.path());
        let sync = sync();

        let url = format!("{}/extra.xml", server.uri());
        let outcome = sync.add_new_database(&mut registry, &url).await.unwrap();
        assert_eq!(outcome, AddOutcome::Added);
        let added = registry.get(&url).unwrap();
        assert_eq!(added.name, "extra");
        assert!(added.used && added.downloaded);
        assert_eq!(registry.next_slot(), 1);

        let outcome = sync.add_new_database(&mut registry, &url).await.unwrap();
        assert_eq!(outcome, AddOutcome::AlreadyExists);
        assert_eq!(sync.progress().message.as_deref(), Some(MSG_ALREADY_EXISTS));

        let junk = format!("{}/junk.txt", server.uri());
        let outcome = sync.add_new_database(&mut registry, &junk).await.unwrap();
        assert_eq!(outcome, AddOutcome::InvalidFormat);
        assert_eq!(sync.progress().message.as_deref(), Some(MSG_INVALID_FORMAT));
        assert!(!registry.contains(&junk));
        assert!(!dir.path().join("1.xml").exists());
        assert_eq!(registry.next_slot(), 1);
    }
}
