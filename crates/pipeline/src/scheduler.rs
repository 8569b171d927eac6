use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dockpipe_core::{config, DockingError, Result};
use dockpipe_domain::{
    BatchOutcome, DockingEngine, DockingJob, FailReason, JobStatus, ParsedReport, Receptor,
    ReportParser, WorkList,
};
use tokio::sync::{broadcast, mpsc, OwnedSemaphorePermit, Semaphore};
use tracing::{error, info, warn};

/// 重试策略
///
/// 指数退避加随机抖动，避免引擎故障恢复时的雷群效应。
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 引擎错误的最大重试次数
    pub max_retries: u32,
    /// 基础重试间隔（毫秒）
    pub base_interval_ms: u64,
    /// 最大重试间隔（毫秒）
    pub max_interval_ms: u64,
    /// 指数退避倍数
    pub backoff_multiplier: f64,
    /// 重试间隔的随机抖动范围（0.0-1.0）
    pub jitter_factor: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &config::RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_interval_ms: config.base_interval_ms,
            max_interval_ms: config.max_interval_ms,
            backoff_multiplier: config.backoff_multiplier,
            jitter_factor: config.jitter_factor,
        }
    }

    /// 计算第 `retry_count` 次重试前的等待间隔
    pub fn backoff_interval(&self, retry_count: u32) -> Duration {
        let base_interval = self.base_interval_ms as f64;
        let max_interval = self.max_interval_ms as f64;

        // 计算指数退避间隔
        let exponential_interval =
            base_interval * self.backoff_multiplier.powi(retry_count as i32);

        // 限制最大间隔
        let capped_interval = exponential_interval.min(max_interval);

        // 添加随机抖动以避免雷群效应
        let jitter = capped_interval * self.jitter_factor * (rand::random::<f64>() - 0.5) * 2.0;
        let final_interval = (capped_interval + jitter).max(base_interval);

        Duration::from_millis(final_interval as u64)
    }
}

/// 调度器配置
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// GPU执行槽位数量
    pub pool_width: usize,
    /// 单次引擎调用的超时时间
    pub engine_timeout: Duration,
    pub retry: RetryPolicy,
}

/// 等待调度的作业：工作清单加上报告输出目录
#[derive(Debug)]
pub struct ScheduledJob {
    pub job: DockingJob,
    pub report_dir: PathBuf,
}

impl ScheduledJob {
    pub fn new(worklist: WorkList, report_dir: PathBuf) -> Self {
        Self {
            job: DockingJob::new(worklist),
            report_dir,
        }
    }
}

/// 成功批次的解析后报告，交给聚合器
#[derive(Debug)]
pub struct CompletedBatch {
    pub batch_index: usize,
    pub reports: Vec<ParsedReport>,
}

/// GPU作业调度器
///
/// 固定宽度的执行槽位池：同时运行的引擎调用数永不超过 pool_width，
/// 准入按作业到达顺序（FIFO）。引擎错误按重试策略退避后重新排队准入，
/// 退避期间不占用槽位；报告缺失视为引擎与逻辑不一致，从不重试。
pub struct GpuJobScheduler {
    engine: Arc<dyn DockingEngine>,
    parser: Arc<dyn ReportParser>,
    config: SchedulerConfig,
}

impl GpuJobScheduler {
    pub fn new(
        engine: Arc<dyn DockingEngine>,
        parser: Arc<dyn ReportParser>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            engine,
            parser,
            config,
        }
    }

    /// 运行调度循环直到作业通道关闭或收到停机信号
    ///
    /// 每个进入的作业先获取一个槽位再启动，槽位在作业到达终态时释放。
    /// 返回所有作业的最终结局；收到停机信号后，未准入的作业
    /// 标记为取消，已在运行的引擎调用允许跑完或自然超时，只是不再重试。
    pub async fn run(
        &self,
        receptor: Receptor,
        mut jobs: mpsc::UnboundedReceiver<ScheduledJob>,
        completed_tx: mpsc::UnboundedSender<CompletedBatch>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<Vec<BatchOutcome>> {
        let slots = Arc::new(Semaphore::new(self.config.pool_width));
        let receptor = Arc::new(receptor);
        let mut handles = Vec::new();
        let mut outcomes = Vec::new();
        let mut cancelled = false;

        info!(pool_width = self.config.pool_width, "GPU调度器启动");

        loop {
            let scheduled = tokio::select! {
                job = jobs.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
                _ = shutdown_rx.recv() => {
                    cancelled = true;
                    break;
                }
            };

            // 先取槽位再启动，保证并发上限和FIFO准入
            let permit = tokio::select! {
                permit = slots.clone().acquire_owned() => permit
                    .map_err(|e| DockingError::Internal(format!("执行槽位池已关闭: {e}")))?,
                _ = shutdown_rx.recv() => {
                    let mut job = scheduled.job;
                    job.update_status(JobStatus::Cancelled);
                    outcomes.push(outcome_of(&job, 0));
                    cancelled = true;
                    break;
                }
            };

            let engine = Arc::clone(&self.engine);
            let parser = Arc::clone(&self.parser);
            let receptor = Arc::clone(&receptor);
            let config = self.config.clone();
            let completed_tx = completed_tx.clone();
            let job_shutdown = shutdown_rx.resubscribe();
            let job_slots = Arc::clone(&slots);

            handles.push(tokio::spawn(run_job(
                scheduled,
                engine,
                parser,
                receptor,
                config,
                completed_tx,
                job_shutdown,
                job_slots,
                permit,
            )));
        }

        // 停机后把尚未准入的作业标记为取消
        if cancelled {
            warn!("收到停机信号，取消剩余排队作业");
            while let Some(scheduled) = jobs.recv().await {
                let mut job = scheduled.job;
                job.update_status(JobStatus::Cancelled);
                outcomes.push(outcome_of(&job, 0));
            }
        }

        for handle in handles {
            let outcome = handle
                .await
                .map_err(|e| DockingError::Internal(format!("调度任务异常终止: {e}")))?;
            outcomes.push(outcome);
        }

        outcomes.sort_by_key(|o| o.batch_index);
        info!(jobs = outcomes.len(), cancelled, "GPU调度器结束");
        Ok(outcomes)
    }
}

fn outcome_of(job: &DockingJob, report_count: usize) -> BatchOutcome {
    BatchOutcome {
        batch_index: job.batch_index,
        status: job.status.clone(),
        attempts: job.attempts,
        skipped_ligands: job.worklist.skipped.clone(),
        report_count,
    }
}

/// 执行单个作业直到终态
///
/// 调用时已持有一个执行槽位。退避前释放槽位，重试按FIFO重新准入。
#[allow(clippy::too_many_arguments)]
async fn run_job(
    scheduled: ScheduledJob,
    engine: Arc<dyn DockingEngine>,
    parser: Arc<dyn ReportParser>,
    receptor: Arc<Receptor>,
    config: SchedulerConfig,
    completed_tx: mpsc::UnboundedSender<CompletedBatch>,
    mut shutdown_rx: broadcast::Receiver<()>,
    slots: Arc<Semaphore>,
    mut permit: OwnedSemaphorePermit,
) -> BatchOutcome {
    let ScheduledJob {
        mut job,
        report_dir,
    } = scheduled;

    job.update_status(JobStatus::Running);

    loop {
        job.attempts += 1;
        info!(
            batch_index = job.batch_index,
            attempt = job.attempts,
            "开始引擎调用"
        );

        // 停机不打断在途的引擎调用：让它跑完或自然超时
        let dock_result = match tokio::time::timeout(
            config.engine_timeout,
            engine.dock(&receptor, &job.worklist, &report_dir),
        )
        .await
        {
            Ok(inner) => inner,
            Err(_) => Err(DockingError::EngineError {
                batch_index: job.batch_index,
                message: format!("引擎执行超时 ({}s)", config.engine_timeout.as_secs()),
            }),
        };

        match dock_result {
            Ok(report_paths) => {
                // 解析校验每份报告；任何缺失或不可解析都判为报告缺失
                match parse_reports(parser.as_ref(), &job, &report_paths) {
                    Ok(reports) => {
                        let report_count = reports.len();
                        info!(
                            batch_index = job.batch_index,
                            reports = report_count,
                            attempts = job.attempts,
                            "批次对接成功"
                        );
                        // 聚合器先于调度器退出时丢弃即可
                        let _ = completed_tx.send(CompletedBatch {
                            batch_index: job.batch_index,
                            reports,
                        });
                        job.update_status(JobStatus::Succeeded);
                        return outcome_of(&job, report_count);
                    }
                    Err(message) => {
                        error!(batch_index = job.batch_index, %message, "报告缺失或不可解析");
                        job.update_status(JobStatus::Failed(FailReason::MissingReport(message)));
                        return outcome_of(&job, 0);
                    }
                }
            }
            Err(DockingError::MissingReport { path, .. }) => {
                error!(batch_index = job.batch_index, %path, "引擎未产出报告");
                job.update_status(JobStatus::Failed(FailReason::MissingReport(path)));
                return outcome_of(&job, 0);
            }
            Err(e) if e.is_retryable() && job.attempts <= config.retry.max_retries => {
                let interval = config.retry.backoff_interval(job.attempts - 1);
                warn!(
                    batch_index = job.batch_index,
                    attempt = job.attempts,
                    backoff_ms = interval.as_millis() as u64,
                    error = %e,
                    "引擎错误，退避后重试"
                );
                // 退避期间释放槽位，让排队中的作业先行
                drop(permit);
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = shutdown_rx.recv() => {
                        job.update_status(JobStatus::Cancelled);
                        return outcome_of(&job, 0);
                    }
                }
                permit = tokio::select! {
                    acquired = slots.clone().acquire_owned() => match acquired {
                        Ok(p) => p,
                        Err(e) => {
                            error!(batch_index = job.batch_index, error = %e, "执行槽位池已关闭");
                            job.update_status(JobStatus::Failed(FailReason::Engine(
                                "执行槽位池已关闭".to_string(),
                            )));
                            return outcome_of(&job, 0);
                        }
                    },
                    _ = shutdown_rx.recv() => {
                        job.update_status(JobStatus::Cancelled);
                        return outcome_of(&job, 0);
                    }
                };
            }
            Err(e) => {
                error!(
                    batch_index = job.batch_index,
                    attempts = job.attempts,
                    error = %e,
                    "重试预算耗尽，批次终态失败"
                );
                job.update_status(JobStatus::Failed(FailReason::Engine(e.to_string())));
                return outcome_of(&job, 0);
            }
        }
    }
}

/// 校验报告数量并逐份解析
fn parse_reports(
    parser: &dyn ReportParser,
    job: &DockingJob,
    report_paths: &[PathBuf],
) -> std::result::Result<Vec<ParsedReport>, String> {
    if report_paths.len() != job.worklist.ligand_files.len() {
        return Err(format!(
            "批次 {} 期望 {} 份报告，实际 {} 份",
            job.batch_index,
            job.worklist.ligand_files.len(),
            report_paths.len()
        ));
    }

    let mut reports = Vec::with_capacity(report_paths.len());
    for path in report_paths {
        match parser.parse(path) {
            Ok(report) => reports.push(report),
            Err(e) => return Err(format!("报告 {} 解析失败: {e}", path.display())),
        }
    }
    Ok(reports)
}
