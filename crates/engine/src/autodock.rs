use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use dockpipe_core::{DockingError, Result};
use dockpipe_domain::{DockingEngine, Receptor, WorkList};
use tokio::process::Command;
use tracing::{debug, info};

/// AutoDock-GPU引擎适配器
///
/// 以文件清单模式调用引擎，工作目录设为报告输出目录。
/// 进程失败归为引擎错误（可重试）；进程成功但某个配体的
/// 报告文件不存在归为报告缺失（不重试）。
pub struct AutoDockGpuEngine {
    binary: String,
}

impl AutoDockGpuEngine {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl DockingEngine for AutoDockGpuEngine {
    async fn dock(
        &self,
        _receptor: &Receptor,
        worklist: &WorkList,
        report_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        tokio::fs::create_dir_all(report_dir).await?;
        let batch_index = worklist.batch_index;

        info!(
            batch_index,
            ligands = worklist.ligand_files.len(),
            "调用对接引擎"
        );

        let output = Command::new(&self.binary)
            .arg("--filelist")
            .arg(&worklist.filelist)
            .current_dir(report_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| DockingError::EngineError {
                batch_index,
                message: format!("启动 {} 失败: {e}", self.binary),
            })?;

        if !output.status.success() {
            return Err(DockingError::EngineError {
                batch_index,
                message: format!(
                    "{} 退出码 {:?}: {}",
                    self.binary,
                    output.status.code(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        // 逐配体核对报告文件
        let mut reports = Vec::with_capacity(worklist.ligand_files.len());
        for ligand in &worklist.ligand_files {
            let stem = ligand
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| DockingError::Internal(format!(
                    "无效的配体文件名: {}",
                    ligand.display()
                )))?;
            let report = report_dir.join(format!("{stem}.dlg"));
            if !report.exists() {
                return Err(DockingError::MissingReport {
                    batch_index,
                    path: report.display().to_string(),
                });
            }
            debug!(batch_index, report = %report.display(), "报告就绪");
            reports.push(report);
        }

        Ok(reports)
    }
}
