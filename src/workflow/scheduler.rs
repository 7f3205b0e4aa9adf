//! 题目生成调度器 - 流程层
//!
//! ## 职责
//!
//! 后台唯一的生产任务：轮流访问生成器，把题目追加到预读缓冲，
//! 前台按下标读取题目。
//!
//! ## 规则
//!
//! - **轮次**：每一轮把生成器池完整洗牌一次（Fisher-Yates），每个生成器恰好访问一次
//! - **跳过**：`!active` 或所属题库未启用的生成器直接跳过
//! - **权重**：抽 `u ~ [0, 1)`，`u <= weight` 才生成
//! - **背压**：`已生成 - 已读取 >= look_ahead.max` 时挂起，读取后恢复
//! - **预热**：缓冲中至少有 `look_ahead.warmup` 道题之后，第 0 题才可读
//! - **重新生成**：换生成器池时丢弃所有未读的题目，已读的题目保持不变
//!
//! 生产任务在每次访问之间让出执行权，没有可用生成器时按 `idle_tick` 等待，不会空转。

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{Config, LookAhead};
use crate::error::{AppError, AppResult};
use crate::models::Question;
use crate::services::QuestionGenerator;

/// 调度器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// 未启动或已停止
    Idle,
    /// 未读题目少于 `look_ahead.min`
    Warming,
    Steady,
    Paused,
}

/// 交给调度器的生成器池
#[derive(Debug, Clone, Default)]
pub struct GeneratorPool {
    pub generators: Vec<QuestionGenerator>,
    /// 已启用题库的 url
    pub used_databases: HashSet<String>,
}

impl GeneratorPool {
    pub fn new(generators: Vec<QuestionGenerator>, used_databases: HashSet<String>) -> Self {
        Self {
            generators,
            used_databases,
        }
    }

    pub fn is_eligible(&self, generator: &QuestionGenerator) -> bool {
        generator.active
            && self.used_databases.contains(&generator.database_url)
            && generator.can_generate()
    }

    pub fn eligible_count(&self) -> usize {
        self.generators
            .iter()
            .filter(|g| self.is_eligible(g))
            .count()
    }
}

/// 调度器的等待参数
#[derive(Debug, Clone, Copy)]
pub struct SchedulerTiming {
    /// `get_question` 的最长等待时间
    pub question_wait: Duration,
    /// 没有可用生成器时的轮询间隔
    pub idle_tick: Duration,
}

impl SchedulerTiming {
    pub fn from_config(config: &Config) -> Self {
        Self {
            question_wait: Duration::from_millis(config.question_wait_ms),
            idle_tick: Duration::from_millis(config.idle_tick_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Running,
    Paused,
    Stopped,
}

/// 预读缓冲
///
/// `questions[..consumed]` 已经交给前台，之后不再改动
struct Buffer {
    questions: Vec<Question>,
    consumed: usize,
    /// 每次重新生成加一，旧轮次产出的题目不再写入
    epoch: u64,
    pool: Arc<GeneratorPool>,
    state: SchedulerState,
}

impl Buffer {
    fn pending(&self) -> usize {
        self.questions.len() - self.consumed
    }

    fn refresh_state(&mut self, look_ahead: &LookAhead) {
        if matches!(self.state, SchedulerState::Warming | SchedulerState::Steady) {
            self.state = if self.pending() >= look_ahead.min {
                SchedulerState::Steady
            } else {
                SchedulerState::Warming
            };
        }
    }
}

struct Shared {
    buffer: Mutex<Buffer>,
    /// 有新题目写入，或者调度器停止
    produced: Notify,
    /// 题目被读取、生成器池更换、恢复运行
    wake: Notify,
    look_ahead: LookAhead,
}

/// 题目生成调度器
pub struct GenerationScheduler {
    shared: Arc<Shared>,
    control: watch::Sender<Control>,
    task: Option<JoinHandle<StdRng>>,
    /// 下次启动时交给生产任务的随机源
    rng: Option<StdRng>,
    timing: SchedulerTiming,
}

impl GenerationScheduler {
    pub fn new(look_ahead: LookAhead, timing: SchedulerTiming, rng: StdRng) -> Self {
        let (control, _) = watch::channel(Control::Stopped);
        Self {
            shared: Arc::new(Shared {
                buffer: Mutex::new(Buffer {
                    questions: Vec::new(),
                    consumed: 0,
                    epoch: 0,
                    pool: Arc::new(GeneratorPool::default()),
                    state: SchedulerState::Idle,
                }),
                produced: Notify::new(),
                wake: Notify::new(),
                look_ahead,
            }),
            control,
            task: None,
            rng: Some(rng),
            timing,
        }
    }

    /// 按配置创建；设置了 `rng_seed` 时结果可复现
    pub fn from_config(config: &Config) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::new(config.look_ahead(), SchedulerTiming::from_config(config), rng)
    }

    pub fn state(&self) -> SchedulerState {
        self.shared.buffer.lock().state
    }

    /// 已生成的题目总数（包括已读的）
    pub fn len(&self) -> usize {
        self.shared.buffer.lock().questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 已读的题目数
    pub fn consumed(&self) -> usize {
        self.shared.buffer.lock().consumed
    }

    /// 未读的题目数
    pub fn pending(&self) -> usize {
        self.shared.buffer.lock().pending()
    }

    /// 启动后台生产任务；已在运行时只恢复运行
    pub fn start(&mut self) {
        if let Some(task) = &self.task {
            if !task.is_finished() {
                self.resume();
                return;
            }
        }

        let rng = self.rng.take().unwrap_or_else(StdRng::from_entropy);
        self.control.send_replace(Control::Running);
        self.shared.buffer.lock().state = SchedulerState::Warming;

        let producer = Producer {
            shared: self.shared.clone(),
            control: self.control.subscribe(),
            rng,
            idle_tick: self.timing.idle_tick,
            pass: Vec::new(),
            position: 0,
            pass_epoch: None,
        };
        self.task = Some(tokio::spawn(producer.run()));
        info!("▶️ 题目生成任务已启动");
    }

    pub fn pause(&self) {
        if *self.control.borrow() != Control::Running {
            return;
        }
        self.control.send_replace(Control::Paused);
        self.shared.buffer.lock().state = SchedulerState::Paused;
        info!("⏸️ 题目生成已暂停");
    }

    pub fn resume(&self) {
        if *self.control.borrow() != Control::Paused {
            return;
        }
        {
            let mut buffer = self.shared.buffer.lock();
            buffer.state = SchedulerState::Warming;
            buffer.refresh_state(&self.shared.look_ahead);
        }
        self.control.send_replace(Control::Running);
        self.shared.wake.notify_one();
        info!("▶️ 题目生成已恢复");
    }

    /// 停止生产任务并等待其退出；缓冲和随机源保留，再次启动时继续
    pub async fn stop(&mut self) {
        self.control.send_replace(Control::Stopped);
        self.shared.wake.notify_one();
        if let Some(task) = self.task.take() {
            match task.await {
                Ok(rng) => self.rng = Some(rng),
                Err(e) => warn!("题目生成任务异常退出: {}", e),
            }
        }
        self.shared.buffer.lock().state = SchedulerState::Idle;
        self.shared.produced.notify_waiters();
        info!("⏹️ 题目生成已停止");
    }

    /// 更换生成器池并重新生成
    pub fn set_pool(&self, pool: GeneratorPool) {
        info!(
            "🔄 更换生成器池: {} 个生成器，{} 个可用",
            pool.generators.len(),
            pool.eligible_count()
        );
        self.shared.buffer.lock().pool = Arc::new(pool);
        self.regenerate();
    }

    /// 丢弃所有未读题目，生产任务从新的一轮洗牌开始
    pub fn regenerate(&self) {
        let discarded = {
            let mut buffer = self.shared.buffer.lock();
            let consumed = buffer.consumed;
            let discarded = buffer.questions.len() - consumed;
            buffer.questions.truncate(consumed);
            buffer.epoch += 1;
            buffer.refresh_state(&self.shared.look_ahead);
            discarded
        };
        self.shared.wake.notify_one();
        debug!("重新生成: 丢弃 {} 道未读题目", discarded);
    }

    /// 读取第 `index` 道题
    ///
    /// 题目尚未生成时最多等待 `question_wait`，超时返回 `NotReady`；
    /// 调度器已停止且题目不存在时返回 `Stopped`
    pub async fn get_question(&self, index: usize) -> AppResult<Question> {
        let deadline = Instant::now() + self.timing.question_wait;
        loop {
            let notified = self.shared.produced.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut buffer = self.shared.buffer.lock();
                let ready = index < buffer.consumed
                    || (index < buffer.questions.len()
                        && buffer.questions.len() >= self.shared.look_ahead.warmup);
                if ready {
                    let question = buffer.questions[index].clone();
                    if index >= buffer.consumed {
                        buffer.consumed = index + 1;
                        buffer.refresh_state(&self.shared.look_ahead);
                        drop(buffer);
                        self.shared.wake.notify_one();
                    }
                    return Ok(question);
                }
                if *self.control.borrow() == Control::Stopped {
                    return Err(AppError::Stopped);
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Err(AppError::NotReady {
                    index,
                    waited_ms: self.timing.question_wait.as_millis() as u64,
                });
            }
        }
    }
}

impl Drop for GenerationScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// 后台生产任务
///
/// 当前轮次的洗牌顺序和访问位置跨挂起保留，恢复后从原位置继续
struct Producer {
    shared: Arc<Shared>,
    control: watch::Receiver<Control>,
    rng: StdRng,
    idle_tick: Duration,
    pass: Vec<usize>,
    position: usize,
    pass_epoch: Option<u64>,
}

impl Producer {
    async fn run(mut self) -> StdRng {
        loop {
            let control = *self.control.borrow_and_update();
            match control {
                Control::Stopped => break,
                Control::Paused => {
                    if self.control.changed().await.is_err() {
                        break;
                    }
                    continue;
                }
                Control::Running => {}
            }

            let (pool, epoch, pending) = {
                let buffer = self.shared.buffer.lock();
                (buffer.pool.clone(), buffer.epoch, buffer.pending())
            };

            if pending >= self.shared.look_ahead.max {
                // 缓冲已满，等待读取
                if !self.wait(None).await {
                    break;
                }
                continue;
            }

            if self.pass_epoch != Some(epoch) || self.position >= self.pass.len() {
                if pool.eligible_count() == 0 {
                    if !self.wait(Some(self.idle_tick)).await {
                        break;
                    }
                    continue;
                }
                self.pass = (0..pool.generators.len()).collect();
                self.pass.shuffle(&mut self.rng);
                self.position = 0;
                self.pass_epoch = Some(epoch);
            }

            let generator = &pool.generators[self.pass[self.position]];
            self.position += 1;

            if pool.is_eligible(generator) {
                let roll: f32 = self.rng.gen();
                if roll <= generator.weight {
                    if let Some(question) = generator.generate(&mut self.rng) {
                        self.push(question, epoch);
                    }
                }
            }

            tokio::task::yield_now().await;
        }
        debug!("题目生成任务退出");
        self.rng
    }

    /// 写入缓冲；生成期间发生过重新生成则丢弃
    fn push(&self, question: Question, epoch: u64) {
        let mut buffer = self.shared.buffer.lock();
        if buffer.epoch != epoch {
            return;
        }
        debug!("生成第 {} 题: {}", buffer.questions.len(), question);
        buffer.questions.push(question);
        buffer.refresh_state(&self.shared.look_ahead);
        drop(buffer);
        self.shared.produced.notify_waiters();
    }

    /// 等待唤醒、控制状态变化或超时；返回 `false` 表示应退出
    async fn wait(&mut self, timeout: Option<Duration>) -> bool {
        let sleep = async {
            match timeout {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = self.shared.wake.notified() => true,
            changed = self.control.changed() => changed.is_ok(),
            _ = sleep => true,
        }
    }
}
