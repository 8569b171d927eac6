use std::sync::Arc;

use anyhow::{Context, Result};
use dockpipe_core::AppConfig;
use dockpipe_domain::{RunReport, RunResult};
use dockpipe_engine::{
    AutoDockGpuEngine, DockedReportParser, ObabelConverter, ScriptReceptorPreparer,
};
use dockpipe_pipeline::PipelineCoordinator;
use tokio::sync::broadcast;
use tracing::info;

/// 主应用程序：组装真实协作者并驱动协调器
pub struct Application {
    coordinator: PipelineCoordinator,
}

impl Application {
    pub fn new(config: AppConfig) -> Self {
        info!(
            structure_id = %config.run.structure_id,
            database = %config.run.database_path.display(),
            pool_width = config.gpu.pool_width,
            "初始化对接流水线"
        );

        let converter = Arc::new(ObabelConverter::new(config.engine.converter_binary.clone()));
        let receptor_preparer = Arc::new(ScriptReceptorPreparer::new(
            config.engine.receptor_prep_binary.clone(),
        ));
        let engine = Arc::new(AutoDockGpuEngine::new(config.engine.engine_binary.clone()));
        let parser = Arc::new(DockedReportParser);

        Self {
            coordinator: PipelineCoordinator::new(
                config,
                converter,
                receptor_preparer,
                engine,
                parser,
            ),
        }
    }

    /// 执行一次完整运行并汇报结果
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<RunReport> {
        let report = self
            .coordinator
            .run(shutdown_rx)
            .await
            .context("流水线运行失败")?;

        match &report.result {
            RunResult::BestHit(hit) => {
                info!(
                    ligand_id = %hit.ligand_id,
                    energy = hit.energy,
                    batch_index = hit.batch_index,
                    "最佳命中"
                );
            }
            RunResult::NoFavorableBinding => {
                info!("没有发现任何有利结合");
            }
        }
        Ok(report)
    }
}
