//! 测试用的协作者假实现

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use dockpipe_core::{DockingError, Result};
use dockpipe_domain::{
    DockingEngine, LigandConverter, LigandRecord, ParsedReport, RankedPose, Receptor,
    ReceptorPreparer, ReportParser, WorkList,
};

pub fn test_receptor() -> Receptor {
    Receptor {
        structure_id: "7cpa".to_string(),
        pdbqt: PathBuf::from("/tmp/receptor/7cpa.pdbqt"),
        maps_fld: PathBuf::from("/tmp/receptor/7cpa.maps.fld"),
        map_files: vec![],
    }
}

pub fn worklist_with_ligands(dir: &Path, batch_index: usize, count: usize) -> WorkList {
    WorkList {
        batch_index,
        filelist: dir.join(format!("filelist_{batch_index}")),
        ligand_files: (1..=count)
            .map(|n| dir.join(format!("testdb_batch{batch_index}_{n}.pdbqt")))
            .collect(),
        skipped: vec![],
    }
}

/// 按脚本行为执行的引擎假实现
///
/// 记录并发峰值和调用顺序；成功时为每个配体写出可解析的报告文件。
pub struct ScriptedEngine {
    delay: Duration,
    remaining_failures: Mutex<HashMap<usize, usize>>,
    missing_report: HashSet<usize>,
    energies: HashMap<usize, Vec<f64>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    dock_order: Mutex<Vec<usize>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            delay: Duration::from_millis(0),
            remaining_failures: Mutex::new(HashMap::new()),
            missing_report: HashSet::new(),
            energies: HashMap::new(),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            dock_order: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// 指定批次的前 `count` 次调用返回引擎错误
    pub fn with_failures(self, batch_index: usize, count: usize) -> Self {
        self.remaining_failures
            .lock()
            .unwrap()
            .insert(batch_index, count);
        self
    }

    /// 指定批次总是返回报告缺失
    pub fn with_missing_report(mut self, batch_index: usize) -> Self {
        self.missing_report.insert(batch_index);
        self
    }

    /// 指定批次内每个配体的排名第一能量
    pub fn with_energies(mut self, batch_index: usize, energies: Vec<f64>) -> Self {
        self.energies.insert(batch_index, energies);
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// 每次引擎调用开始时记录的批次序号，按发生顺序
    pub fn dock_order(&self) -> Vec<usize> {
        self.dock_order.lock().unwrap().clone()
    }
}

#[async_trait]
impl DockingEngine for ScriptedEngine {
    async fn dock(
        &self,
        _receptor: &Receptor,
        worklist: &WorkList,
        report_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        let current = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(current, Ordering::SeqCst);
        self.dock_order.lock().unwrap().push(worklist.batch_index);

        tokio::time::sleep(self.delay).await;
        let result = self.attempt(worklist, report_dir).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl ScriptedEngine {
    async fn attempt(&self, worklist: &WorkList, report_dir: &Path) -> Result<Vec<PathBuf>> {
        let batch_index = worklist.batch_index;

        {
            let mut failures = self.remaining_failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&batch_index) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(DockingError::EngineError {
                        batch_index,
                        message: "脚本引擎故障".to_string(),
                    });
                }
            }
        }

        if self.missing_report.contains(&batch_index) {
            return Err(DockingError::MissingReport {
                batch_index,
                path: format!("batch_{batch_index} 报告未产出"),
            });
        }

        tokio::fs::create_dir_all(report_dir).await?;
        let mut reports = Vec::with_capacity(worklist.ligand_files.len());
        for (i, ligand) in worklist.ligand_files.iter().enumerate() {
            let stem = ligand
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("ligand");
            let energy = self
                .energies
                .get(&batch_index)
                .and_then(|v| v.get(i))
                .copied()
                .unwrap_or(-5.0);
            let content = format!("1 {energy}\n2 {}\n", energy + 1.0);
            let path = report_dir.join(format!("{stem}.rep"));
            tokio::fs::write(&path, content).await?;
            reports.push(path);
        }
        Ok(reports)
    }
}

/// 解析 `rank energy` 行格式的报告
///
/// 配体标识取报告文件名，序号取其末尾的 `_<n>` 后缀。
pub struct LineReportParser;

impl ReportParser for LineReportParser {
    fn parse(&self, report: &Path) -> Result<ParsedReport> {
        let stem = report
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| DockingError::Serialization(format!("无效的报告文件名: {}", report.display())))?
            .to_string();
        let ordinal = stem
            .rsplit('_')
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                DockingError::Serialization(format!(
                    "报告文件名 {} 缺少批次内序号后缀",
                    report.display()
                ))
            })?;

        let content = std::fs::read_to_string(report)?;
        let mut poses = Vec::new();
        for line in content.lines() {
            let mut parts = line.split_whitespace();
            let (Some(rank), Some(energy)) = (parts.next(), parts.next()) else {
                continue;
            };
            let rank = rank
                .parse()
                .map_err(|e| DockingError::Serialization(format!("报告行无法解析: {e}")))?;
            let energy = energy
                .parse()
                .map_err(|e| DockingError::Serialization(format!("报告行无法解析: {e}")))?;
            poses.push(RankedPose { rank, energy });
        }

        if poses.is_empty() {
            return Err(DockingError::Serialization(format!(
                "报告 {} 不含任何构象",
                report.display()
            )));
        }

        Ok(ParsedReport {
            ligand_id: stem,
            ordinal,
            poses,
        })
    }
}

/// 把记录原样写成pdbqt文件的转换器假实现
///
/// `fail_ids` 中的配体返回可跳过的转换失败；`abort_ids` 中的配体
/// 返回不可跳过的内部错误。
pub struct FakeConverter {
    pub fail_ids: Vec<String>,
    pub abort_ids: Vec<String>,
}

impl FakeConverter {
    pub fn reliable() -> Self {
        Self {
            fail_ids: vec![],
            abort_ids: vec![],
        }
    }
}

#[async_trait]
impl LigandConverter for FakeConverter {
    async fn convert(&self, record: &LigandRecord, output_dir: &Path) -> Result<PathBuf> {
        if self.abort_ids.contains(&record.id) {
            return Err(DockingError::Internal(format!(
                "转换器进程异常终止: {}",
                record.id
            )));
        }
        if self.fail_ids.contains(&record.id) {
            return Err(DockingError::ConversionFailed {
                ligand_id: record.id.clone(),
                message: "无法解析结构".to_string(),
            });
        }
        let path = output_dir.join(format!("{}.pdbqt", record.id));
        tokio::fs::write(&path, &record.content).await?;
        Ok(path)
    }
}

/// 写出占位受体文件的准备器假实现
pub struct FakeReceptorPreparer {
    pub fail: bool,
}

#[async_trait]
impl ReceptorPreparer for FakeReceptorPreparer {
    async fn prepare(&self, structure_id: &str, receptor_dir: &Path) -> Result<Receptor> {
        if self.fail {
            return Err(DockingError::ReceptorPreparationFailed(
                "autogrid执行失败".to_string(),
            ));
        }
        tokio::fs::create_dir_all(receptor_dir).await?;
        let pdbqt = receptor_dir.join(format!("{structure_id}.pdbqt"));
        let maps_fld = receptor_dir.join(format!("{structure_id}.maps.fld"));
        tokio::fs::write(&pdbqt, "RECEPTOR\n").await?;
        tokio::fs::write(&maps_fld, "# AVS field file\n").await?;
        Ok(Receptor {
            structure_id: structure_id.to_string(),
            pdbqt,
            maps_fld,
            map_files: vec![],
        })
    }
}
