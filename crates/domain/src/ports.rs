use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dockpipe_core::Result;

use crate::entities::{LigandRecord, ParsedReport, Receptor, WorkList};

/// 配体格式转换接口
///
/// 把一条结构记录转换成对接引擎的原生格式文件。
/// 失败返回 `ConversionFailed`，调用方按跳过策略处理。
#[async_trait]
pub trait LigandConverter: Send + Sync {
    async fn convert(&self, record: &LigandRecord, output_dir: &Path) -> Result<PathBuf>;
}

/// 受体准备接口
///
/// 抓取结构、加氢并生成格点图。运行级致命：失败时整个运行中止。
#[async_trait]
pub trait ReceptorPreparer: Send + Sync {
    async fn prepare(&self, structure_id: &str, receptor_dir: &Path) -> Result<Receptor>;
}

/// GPU对接引擎接口
///
/// 对一个批次执行对接，返回每个配体的报告文件路径。
/// 引擎进程失败返回 `EngineError`（可重试）；
/// 进程成功但报告缺失返回 `MissingReport`（不重试）。
#[async_trait]
pub trait DockingEngine: Send + Sync {
    async fn dock(
        &self,
        receptor: &Receptor,
        worklist: &WorkList,
        report_dir: &Path,
    ) -> Result<Vec<PathBuf>>;
}

/// 对接报告解析接口
pub trait ReportParser: Send + Sync {
    fn parse(&self, report: &Path) -> Result<ParsedReport>;
}
