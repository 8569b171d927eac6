use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dockpipe_core::{AppConfig, DockingError, Result};
use dockpipe_domain::{
    BatchOutcome, DockingEngine, FailReason, JobStatus, LigandConverter, LigandDatabase,
    ReceptorPreparer, ReportParser, RunReport, RunStatus, RunWorkspace,
};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use crate::aggregator::ResultAggregator;
use crate::preparer::LigandPreparer;
use crate::scheduler::{GpuJobScheduler, RetryPolicy, ScheduledJob, SchedulerConfig};
use crate::splitter::BatchSplitter;

/// 流水线协调器
///
/// 串起完整的一次运行：受体准备、批次划分、逐批配体准备、
/// GPU调度和结果聚合。批次准备与对接流水线化：第一个批次
/// 准备完成后立即进入调度，不等待全部准备完毕。
pub struct PipelineCoordinator {
    config: AppConfig,
    converter: Arc<dyn LigandConverter>,
    receptor_preparer: Arc<dyn ReceptorPreparer>,
    engine: Arc<dyn DockingEngine>,
    parser: Arc<dyn ReportParser>,
}

impl PipelineCoordinator {
    pub fn new(
        config: AppConfig,
        converter: Arc<dyn LigandConverter>,
        receptor_preparer: Arc<dyn ReceptorPreparer>,
        engine: Arc<dyn DockingEngine>,
        parser: Arc<dyn ReportParser>,
    ) -> Self {
        Self {
            config,
            converter,
            receptor_preparer,
            engine,
            parser,
        }
    }

    /// 执行完整运行，返回持久化后的运行报告
    ///
    /// 运行级致命错误（无效输入、受体准备失败）直接返回错误；
    /// 批次级失败记录在报告里，不中止运行。收到停机信号后
    /// 停止投递新批次，等待在途作业结束并产出部分报告。
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<RunReport> {
        let started_at = Utc::now();
        self.config.validate()?;

        let run = &self.config.run;
        let workspace = RunWorkspace::new(&run.work_dir, &run.structure_id, &run.database_label);
        workspace.ensure_layout().await?;
        info!(run_id = workspace.run_id(), "运行开始");

        // 受体准备失败是运行级致命错误
        let receptor = self
            .receptor_preparer
            .prepare(&run.structure_id, &workspace.receptor_dir())
            .await
            .map_err(|e| {
                error!(structure_id = %run.structure_id, error = %e, "受体准备失败，运行中止");
                e
            })?;

        let database = LigandDatabase::new(run.database_label.clone(), run.database_path.clone());
        let splitter = BatchSplitter::new(database, run.batch_size);
        let plans = splitter.split()?;

        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (completed_tx, completed_rx) = mpsc::unbounded_channel();

        let scheduler = Arc::new(GpuJobScheduler::new(
            Arc::clone(&self.engine),
            Arc::clone(&self.parser),
            SchedulerConfig {
                pool_width: self.config.gpu.pool_width,
                engine_timeout: Duration::from_secs(self.config.gpu.engine_timeout_seconds),
                retry: RetryPolicy::from_config(&self.config.retry),
            },
        ));
        let scheduler_shutdown = shutdown_rx.resubscribe();
        let scheduler_receptor = receptor.clone();
        let scheduler_handle = tokio::spawn(async move {
            scheduler
                .run(scheduler_receptor, job_rx, completed_tx, scheduler_shutdown)
                .await
        });
        let aggregator_handle = tokio::spawn(ResultAggregator::aggregate(completed_rx));

        // 逐批准备并投递；每个批次准备完立即可被调度
        let preparer = LigandPreparer::new(Arc::clone(&self.converter));
        let mut prep_outcomes: Vec<BatchOutcome> = Vec::new();
        let mut prep_error: Option<DockingError> = None;
        let mut cancelled = false;

        for (i, plan) in plans.iter().enumerate() {
            if shutdown_rx.try_recv().is_ok() {
                warn!("收到停机信号，停止准备剩余批次");
                cancelled = true;
                prep_outcomes.extend(plans[i..].iter().map(|p| cancelled_outcome(p.index)));
                break;
            }

            let batch = match splitter.materialize(plan) {
                Ok(batch) => batch,
                Err(e) => {
                    error!(batch_index = plan.index, error = %e, "批次物化失败，停止投递");
                    prep_error = Some(e);
                    break;
                }
            };
            let batch_workspace = workspace.batch(plan.index);
            let worklist = match preparer.prepare(&batch, &receptor, &batch_workspace).await {
                Ok(worklist) => worklist,
                Err(e) => {
                    error!(batch_index = plan.index, error = %e, "批次准备失败，停止投递");
                    prep_error = Some(e);
                    break;
                }
            };

            if worklist.ligand_files.is_empty() {
                warn!(batch_index = plan.index, "批次内所有配体转换失败，不调度");
                prep_outcomes.push(BatchOutcome {
                    batch_index: plan.index,
                    status: JobStatus::Failed(FailReason::Preparation(
                        "批次内所有配体转换失败".to_string(),
                    )),
                    attempts: 0,
                    skipped_ligands: worklist.skipped,
                    report_count: 0,
                });
                continue;
            }

            let job = ScheduledJob::new(worklist, batch_workspace.report_dir());
            if job_tx.send(job).is_err() {
                // 调度器已经因停机退出，当前批次也算取消
                cancelled = true;
                prep_outcomes.extend(plans[i..].iter().map(|p| cancelled_outcome(p.index)));
                break;
            }
        }
        drop(job_tx);

        // 准备出错时也要等调度器和聚合器收尾，避免任务悬空
        let scheduler_result = scheduler_handle
            .await
            .map_err(|e| DockingError::Internal(format!("调度器异常终止: {e}")))
            .and_then(|r| r);
        let aggregator_result = aggregator_handle
            .await
            .map_err(|e| DockingError::Internal(format!("聚合器异常终止: {e}")));

        if let Some(e) = prep_error {
            return Err(e);
        }
        let mut batches = scheduler_result?;
        let result = aggregator_result?;

        batches.extend(prep_outcomes);
        batches.sort_by_key(|o| o.batch_index);

        let status = if cancelled || batches.iter().any(|o| o.status == JobStatus::Cancelled) {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        };

        let report = RunReport {
            run_id: workspace.run_id().to_string(),
            structure_id: run.structure_id.clone(),
            database_label: run.database_label.clone(),
            status,
            result,
            batches,
            started_at,
            finished_at: Utc::now(),
        };
        self.persist_report(&workspace, &report).await?;

        info!(
            run_id = %report.run_id,
            status = ?report.status,
            batches = report.batches.len(),
            "运行结束"
        );
        Ok(report)
    }

    async fn persist_report(&self, workspace: &RunWorkspace, report: &RunReport) -> Result<()> {
        let json = serde_json::to_string_pretty(report)
            .map_err(|e| DockingError::Serialization(format!("运行报告序列化失败: {e}")))?;
        tokio::fs::write(workspace.run_report_path(), json).await?;
        Ok(())
    }
}

fn cancelled_outcome(batch_index: usize) -> BatchOutcome {
    BatchOutcome {
        batch_index,
        status: JobStatus::Cancelled,
        attempts: 0,
        skipped_ligands: vec![],
        report_count: 0,
    }
}
