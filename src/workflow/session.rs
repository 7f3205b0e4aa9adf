//! 出题会话 - 流程层
//!
//! 持有一次游戏所需的全部状态（标签、题库、生成器、调度器），没有全局变量。
//! 界面层只通过这里读写标签策略、管理题库、按下标取题。

use std::collections::HashMap;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::clients::FetchClient;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{load_question_bank, AnswerRecord, DatabaseDescriptor, Question, TagUsage};
use crate::orchestrator::{AddOutcome, DatabaseSync, SyncProgress, SyncReport};
use crate::services::{DatabaseRegistry, QuestionGenerator, TagRegistry};
use crate::utils::logging::log_databases_loaded;
use crate::workflow::scheduler::{GenerationScheduler, GeneratorPool, SchedulerState};

pub struct QuizSession {
    config: Config,
    tags: TagRegistry,
    databases: DatabaseRegistry,
    /// 已启用题库中的生成器
    generators: Vec<QuestionGenerator>,
    scheduler: GenerationScheduler,
    sync: DatabaseSync,
    answers: Vec<AnswerRecord>,
}

impl QuizSession {
    pub fn new(config: Config) -> AppResult<Self> {
        let sync = DatabaseSync::new(FetchClient::new(&config)?);
        let scheduler = GenerationScheduler::from_config(&config);
        Ok(Self {
            tags: TagRegistry::new(),
            databases: DatabaseRegistry::new(config.data_dir.clone()),
            generators: Vec::new(),
            scheduler,
            sync,
            answers: Vec::new(),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tags(&self) -> &TagRegistry {
        &self.tags
    }

    pub fn databases(&self) -> &DatabaseRegistry {
        &self.databases
    }

    pub fn generators(&self) -> &[QuestionGenerator] {
        &self.generators
    }

    pub fn scheduler(&self) -> &GenerationScheduler {
        &self.scheduler
    }

    /// 重新读取题库列表和所有题库内容
    ///
    /// 内容损坏的题库标记为未启用、未下载，不影响其他题库；标记在下次保存题库列表时写入。
    /// 所有题库的标签都会注册；只有已启用题库的生成器参与出题。
    /// 没有任何"已启用且已下载"的题库时，自动启用第一个已下载的题库。
    pub async fn load_all_questions(&mut self) -> AppResult<usize> {
        self.databases = DatabaseRegistry::load(self.config.data_dir.clone()).await?;

        let descriptors: Vec<DatabaseDescriptor> = self.databases.iter().cloned().collect();
        let mut loaded: HashMap<String, Vec<QuestionGenerator>> = HashMap::new();
        for db in &descriptors {
            if !db.downloaded {
                debug!("题库未下载，跳过: {}", db.name);
                continue;
            }
            let path = self.databases.file_path(db);
            match load_question_bank(&path, &db.url).await {
                Ok(generators) => {
                    for generator in &generators {
                        self.tags.register_tags(&generator.tags);
                    }
                    loaded.insert(db.url.clone(), generators);
                }
                Err(e) => {
                    warn!("⚠️ 题库 '{}' 加载失败，本次会话停用: {}", db.name, e);
                    self.databases.mark_broken(&db.url);
                }
            }
        }

        let has_playable = self.databases.iter().any(|db| db.used && db.downloaded);
        if !has_playable {
            let fallback = self
                .databases
                .iter()
                .find(|db| db.downloaded)
                .map(|db| (db.url.clone(), db.name.clone()));
            if let Some((url, name)) = fallback {
                warn!("⚠️ 没有已启用的题库，自动启用 '{}'", name);
                self.databases.set_used(&url, true);
            }
        }

        let used = self.databases.used_urls();
        self.generators = self
            .databases
            .iter()
            .filter(|db| used.contains(&db.url))
            .filter_map(|db| loaded.remove(&db.url))
            .flatten()
            .collect();

        log_databases_loaded(self.databases.len(), used.len(), self.generators.len());
        self.recompute_activation();
        Ok(self.generators.len())
    }

    pub fn get_usage(&self, tag: &str) -> TagUsage {
        self.tags.usage(tag)
    }

    /// 修改标签策略；生效需要随后调用 `recompute_activation`
    pub fn set_usage(&mut self, tag: &str, usage: TagUsage) {
        self.tags.set_usage(tag, usage);
    }

    pub fn cycle_usage(&mut self, tag: &str) -> TagUsage {
        self.tags.cycle_usage(tag)
    }

    /// 重算生成器激活状态并把新的生成器池交给调度器（未读题目被丢弃）
    ///
    /// 返回激活的生成器数量
    pub fn recompute_activation(&mut self) -> usize {
        let active = self.tags.recompute_activation(&mut self.generators);
        info!("🏷️ 激活生成器: {}/{}", active, self.generators.len());
        self.scheduler.set_pool(GeneratorPool::new(
            self.generators.clone(),
            self.databases.used_urls(),
        ));
        active
    }

    pub fn start(&mut self) {
        self.scheduler.start();
    }

    pub fn pause(&self) {
        self.scheduler.pause();
    }

    pub fn resume(&self) {
        self.scheduler.resume();
    }

    pub async fn stop(&mut self) {
        self.scheduler.stop().await;
    }

    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub async fn get_question(&self, index: usize) -> AppResult<Question> {
        self.scheduler.get_question(index).await
    }

    /// 启用/停用题库并写回题库列表；生效需要随后重新加载
    pub async fn set_database_used(&mut self, url: &str, used: bool) -> AppResult<()> {
        if !self.databases.set_used(url, used) {
            return Err(AppError::UnknownDatabase {
                url: url.to_string(),
            });
        }
        self.databases.save().await
    }

    pub async fn remove_unselected_databases(&mut self) -> AppResult<Vec<DatabaseDescriptor>> {
        let removed = self.databases.remove_unselected().await;
        self.databases.save().await?;
        Ok(removed)
    }

    /// 同步远程清单并下载所有题库
    pub async fn update_databases(&mut self) -> SyncReport {
        self.sync
            .update_all(&mut self.databases, &self.config.manifest_url)
            .await
    }

    pub async fn add_new_database(&mut self, url: &str) -> AppResult<AddOutcome> {
        self.sync.add_new_database(&mut self.databases, url).await
    }

    /// 订阅同步进度
    pub fn sync_progress(&self) -> watch::Receiver<SyncProgress> {
        self.sync.subscribe()
    }

    pub fn record_answer(&mut self, credence_percent: f64, correct: bool) -> AnswerRecord {
        let record = AnswerRecord::new(credence_percent, correct);
        debug!(
            "作答: 信心 {}%，{}，得分 {}",
            record.credence_percent,
            if record.correct { "正确" } else { "错误" },
            record.score
        );
        self.answers.push(record);
        record
    }

    pub fn answers(&self) -> &[AnswerRecord] {
        &self.answers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::loaders::{write_local_manifest, LocalManifest};
    use std::path::Path;

    const BANK: &str = r#"<QuestionGenerators>
  <QuestionGenerator Used="y" Tags="Capitals;Capitals::Europe" Type="Match" Weight="1" QuestionText="Capital of __?">
    <Answer Text="France" Value="Paris"/>
    <Answer Text="Italy" Value="Rome"/>
  </QuestionGenerator>
</QuestionGenerators>"#;

    fn descriptor(slot: u32, used: bool, downloaded: bool) -> DatabaseDescriptor {
        DatabaseDescriptor {
            name: format!("db{}", slot),
            url: format!("http://example.org/{}.xml", slot),
            storage_slot: slot,
            used,
            downloaded,
        }
    }

    fn write_registry(dir: &Path, databases: Vec<DatabaseDescriptor>) {
        let manifest = LocalManifest {
            next_slot: databases.len() as u32,
            databases,
        };
        std::fs::write(
            dir.join(crate::services::DATABASES_FILENAME),
            write_local_manifest(&manifest),
        )
        .unwrap();
    }

    fn session(dir: &Path) -> QuizSession {
        QuizSession::new(Config {
            data_dir: dir.to_path_buf(),
            rng_seed: Some(11),
            question_wait_ms: 1000,
            ..Config::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_first_downloaded_database_is_enabled_when_none_used() {
        let dir = tempfile::tempdir().unwrap();
        write_registry(
            dir.path(),
            vec![descriptor(0, false, false), descriptor(1, false, true)],
        );
        std::fs::write(dir.path().join("1.xml"), BANK).unwrap();

        let mut session = session(dir.path());
        let count = session.load_all_questions().await.unwrap();

        assert_eq!(count, 1);
        assert!(session.databases().get("http://example.org/1.xml").unwrap().used);
        assert_eq!(session.get_usage("Capitals::Europe"), TagUsage::Some);
    }

    #[tokio::test]
    async fn test_broken_database_is_disabled_for_the_session() {
        let dir = tempfile::tempdir().unwrap();
        write_registry(
            dir.path(),
            vec![descriptor(0, true, true), descriptor(1, true, true)],
        );
        std::fs::write(dir.path().join("0.xml"), "<QuestionGenerators><oops").unwrap();
        std::fs::write(dir.path().join("1.xml"), BANK).unwrap();

        let mut session = session(dir.path());
        assert_eq!(session.load_all_questions().await.unwrap(), 1);

        let broken = session.databases().get("http://example.org/0.xml").unwrap();
        assert!(!broken.used && !broken.downloaded);
    }

    #[tokio::test]
    async fn test_broken_flags_are_saved_by_the_next_write() {
        let dir = tempfile::tempdir().unwrap();
        write_registry(
            dir.path(),
            vec![descriptor(0, true, true), descriptor(1, true, true)],
        );
        std::fs::write(dir.path().join("0.xml"), "<QuestionGenerators><oops").unwrap();
        std::fs::write(dir.path().join("1.xml"), BANK).unwrap();

        let mut session = session(dir.path());
        session.load_all_questions().await.unwrap();
        let on_disk = DatabaseRegistry::load(dir.path()).await.unwrap();
        assert!(on_disk.get("http://example.org/0.xml").unwrap().downloaded);

        session
            .set_database_used("http://example.org/1.xml", true)
            .await
            .unwrap();
        let on_disk = DatabaseRegistry::load(dir.path()).await.unwrap();
        let broken = on_disk.get("http://example.org/0.xml").unwrap();
        assert!(!broken.used && !broken.downloaded);
    }

    #[tokio::test]
    async fn test_tag_policy_change_reaches_the_scheduler() {
        let dir = tempfile::tempdir().unwrap();
        write_registry(dir.path(), vec![descriptor(0, true, true)]);
        std::fs::write(dir.path().join("0.xml"), BANK).unwrap();

        let mut session = session(dir.path());
        session.load_all_questions().await.unwrap();
        session.set_usage("Capitals::Europe", TagUsage::None);
        assert_eq!(session.recompute_activation(), 0);

        session.cycle_usage("Capitals");
        assert_eq!(session.get_usage("Capitals"), TagUsage::All);
        assert_eq!(session.recompute_activation(), 1);

        session.start();
        assert!(session.get_question(0).await.is_ok());
        session.stop().await;
    }

    #[tokio::test]
    async fn test_set_database_used_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        write_registry(dir.path(), vec![descriptor(0, true, true)]);
        std::fs::write(dir.path().join("0.xml"), BANK).unwrap();

        let mut session = session(dir.path());
        session.load_all_questions().await.unwrap();
        session
            .set_database_used("http://example.org/0.xml", false)
            .await
            .unwrap();
        assert!(session
            .set_database_used("http://example.org/none.xml", true)
            .await
            .is_err());

        let reloaded = DatabaseRegistry::load(dir.path()).await.unwrap();
        assert!(!reloaded.get("http://example.org/0.xml").unwrap().used);
    }

    #[test]
    fn test_record_answer_keeps_history() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = session(dir.path());
        let record = session.record_answer(80.0, true);
        session.record_answer(120.0, false);

        assert_eq!(record.score, 68);
        assert_eq!(session.answers().len(), 2);
        assert_eq!(session.answers()[1].credence_percent, 99.0);
    }
}
