use dockpipe_domain::{LigandResult, RunResult};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::scheduler::CompletedBatch;

/// 结果聚合器
///
/// 流式消费成功批次的报告，只保留当前最佳命中，
/// 不在内存里累积全部结果。只考虑排名第一的构象，
/// 且只有负的结合能才算有利结合。
pub struct ResultAggregator;

impl ResultAggregator {
    /// 消费通道直到关闭，返回最终聚合结果
    ///
    /// 批次到达顺序不影响结果：并列时按批次索引、
    /// 再按批次内序号打破，与到达先后无关。
    pub async fn aggregate(mut completed: mpsc::UnboundedReceiver<CompletedBatch>) -> RunResult {
        let mut best: Option<LigandResult> = None;

        while let Some(batch) = completed.recv().await {
            debug!(
                batch_index = batch.batch_index,
                reports = batch.reports.len(),
                "聚合批次报告"
            );
            for report in &batch.reports {
                let Some(pose) = report.rank_one() else {
                    continue;
                };
                if pose.energy >= 0.0 {
                    continue;
                }

                let candidate = LigandResult {
                    ligand_id: report.ligand_id.clone(),
                    energy: pose.energy,
                    batch_index: batch.batch_index,
                    ordinal: report.ordinal,
                };
                match &best {
                    Some(current) if !candidate.outranks(current) => {}
                    _ => best = Some(candidate),
                }
            }
        }

        match best {
            Some(hit) => {
                info!(ligand_id = %hit.ligand_id, energy = hit.energy, "聚合完成，找到最佳命中");
                RunResult::BestHit(hit)
            }
            None => {
                info!("聚合完成，没有任何有利结合");
                RunResult::NoFavorableBinding
            }
        }
    }
}
