use std::path::{Path, PathBuf};

use dockpipe_core::Result;

/// 一次运行的磁盘布局
///
/// ```text
/// <work_dir>/<run_id>/
///   receptor/            受体PDBQT和格点图
///   batch_<index>/
///     ligands/           转换后的配体文件
///     filelist           首行格点图描述文件，其余为配体文件
///     reports/           引擎产出的对接报告
///   run_report.json
/// ```
///
/// 布局是幂等的：重复创建同一运行的目录不报错。
#[derive(Debug, Clone)]
pub struct RunWorkspace {
    root: PathBuf,
    run_id: String,
}

impl RunWorkspace {
    pub fn new(work_dir: &Path, structure_id: &str, db_label: &str) -> Self {
        let run_id = format!("{structure_id}_{db_label}");
        Self {
            root: work_dir.join(&run_id),
            run_id,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn receptor_dir(&self) -> PathBuf {
        self.root.join("receptor")
    }

    pub fn run_report_path(&self) -> PathBuf {
        self.root.join("run_report.json")
    }

    pub fn batch(&self, index: usize) -> BatchWorkspace {
        BatchWorkspace {
            root: self.root.join(format!("batch_{index}")),
        }
    }

    /// 创建运行级目录
    pub async fn ensure_layout(&self) -> Result<()> {
        tokio::fs::create_dir_all(self.receptor_dir()).await?;
        Ok(())
    }
}

/// 单个批次的磁盘布局
#[derive(Debug, Clone)]
pub struct BatchWorkspace {
    root: PathBuf,
}

impl BatchWorkspace {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ligand_dir(&self) -> PathBuf {
        self.root.join("ligands")
    }

    pub fn filelist_path(&self) -> PathBuf {
        self.root.join("filelist")
    }

    pub fn report_dir(&self) -> PathBuf {
        self.root.join("reports")
    }

    pub async fn ensure_layout(&self) -> Result<()> {
        tokio::fs::create_dir_all(self.ligand_dir()).await?;
        tokio::fs::create_dir_all(self.report_dir()).await?;
        Ok(())
    }
}
