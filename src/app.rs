use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::Config;
use crate::utils::logging::{log_startup, print_final_stats};
use crate::workflow::QuizSession;

/// 应用主结构
pub struct App {
    config: Config,
    session: QuizSession,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        let session = QuizSession::new(config.clone()).context("无法创建出题会话")?;
        Ok(Self { config, session })
    }

    /// 运行应用主逻辑：（可选）同步题库 → 加载 → 输出若干道题
    pub async fn run(&mut self) -> Result<()> {
        if self.config.update_on_start {
            info!("\n📥 正在同步远程题库...");
            self.session.update_databases().await;
            let progress = self.session.sync_progress().borrow().clone();
            if let Some(message) = progress.message {
                info!("{}", message);
            }
        }

        let generators = self
            .session
            .load_all_questions()
            .await
            .context("无法加载题库")?;
        if generators == 0 {
            warn!("⚠️ 没有可用的生成器，程序结束");
            return Ok(());
        }

        self.session.start();

        let requested = self.config.demo_question_count;
        let mut printed = 0;
        for index in 0..requested {
            match self.session.get_question(index).await {
                Ok(question) => {
                    println!("{}", serde_json::to_string(&question)?);
                    printed += 1;
                }
                Err(e) => {
                    warn!("⚠️ 第 {} 题获取失败: {}", index, e);
                    break;
                }
            }
        }

        self.session.stop().await;
        print_final_stats(printed, requested, self.session.answers().len());
        Ok(())
    }

    pub fn session(&self) -> &QuizSession {
        &self.session
    }
}
