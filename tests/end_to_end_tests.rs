//! 端到端集成测试：用shell脚本替身串起真实的进程适配器

#![cfg(unix)]

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dockpipe_core::config::{AppConfig, GpuConfig, RetryConfig, RunConfig};
use dockpipe_domain::{JobStatus, RunResult, RunStatus};
use dockpipe_engine::{
    AutoDockGpuEngine, DockedReportParser, ObabelConverter, ScriptReceptorPreparer,
};
use dockpipe_pipeline::PipelineCoordinator;
use tokio::sync::broadcast;

fn write_script(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path.display().to_string()
}

fn write_database(dir: &Path, num_records: usize) -> PathBuf {
    let path = dir.join("testdb.sdf");
    let mut file = std::fs::File::create(&path).unwrap();
    for i in 1..=num_records {
        writeln!(file, "ligand_{i}").unwrap();
        writeln!(file, "  ATOM placeholder").unwrap();
        writeln!(file, "$$$$").unwrap();
    }
    path
}

/// 替身obabel：把输入SDF原样拷贝为输出PDBQT
fn fake_converter(dir: &Path) -> String {
    write_script(dir, "fake_obabel.sh", "cat \"$1\" > \"$3\"")
}

/// 替身受体准备：产出pdbqt、格点图描述文件和一个格点图
fn fake_receptor_prep(dir: &Path) -> String {
    write_script(
        dir,
        "fake_prep.sh",
        "touch \"$1.pdbqt\" \"$1.maps.fld\" \"$1.C.map\"",
    )
}

/// 替身引擎：跳过清单首行，为每个配体在当前目录写出DLG报告
///
/// 能量取配体序号的负值，序号越大结合越有利。
fn fake_engine(dir: &Path) -> String {
    write_script(
        dir,
        "fake_engine.sh",
        r#"FL="$2"
first=1
n=0
while IFS= read -r line; do
  if [ "$first" -eq 1 ]; then first=0; continue; fi
  n=$((n + 1))
  stem=$(basename "$line" .pdbqt)
  printf 'Estimated Free Energy of Binding    =   -%d.50 kcal/mol\n' "$n" > "$stem.dlg"
done < "$FL""#,
    )
}

fn test_config(dir: &Path, num_records: usize, batch_size: usize) -> AppConfig {
    let mut config = AppConfig::default();
    config.run = RunConfig {
        structure_id: "7cpa".to_string(),
        database_path: write_database(dir, num_records),
        database_label: "testdb".to_string(),
        batch_size,
        work_dir: dir.join("work"),
    };
    config.gpu = GpuConfig {
        pool_width: 2,
        engine_timeout_seconds: 10,
    };
    config.retry = RetryConfig {
        max_retries: 1,
        base_interval_ms: 1,
        max_interval_ms: 5,
        backoff_multiplier: 2.0,
        jitter_factor: 0.0,
    };
    config
}

fn coordinator(dir: &Path, config: AppConfig) -> PipelineCoordinator {
    PipelineCoordinator::new(
        config,
        Arc::new(ObabelConverter::new(fake_converter(dir))),
        Arc::new(ScriptReceptorPreparer::new(fake_receptor_prep(dir))),
        Arc::new(AutoDockGpuEngine::new(fake_engine(dir))),
        Arc::new(DockedReportParser),
    )
}

#[tokio::test]
async fn test_full_run_with_process_adapters() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), 5, 2);

    let (_tx, rx) = broadcast::channel(16);
    let report = coordinator(dir.path(), config).run(rx).await.unwrap();

    assert_eq!(report.run_id, "7cpa_testdb");
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.batches.len(), 3);
    assert!(report
        .batches
        .iter()
        .all(|b| b.status == JobStatus::Succeeded));

    // 每个批次内序号最大的配体能量最低；批次0和1各有2个配体，
    // 能量并列-2.5时取更早的批次
    match &report.result {
        RunResult::BestHit(hit) => {
            assert_eq!(hit.energy, -2.5);
            assert_eq!(hit.ligand_id, "testdb_batch0_2");
            assert_eq!(hit.batch_index, 0);
        }
        RunResult::NoFavorableBinding => panic!("应该找到最佳命中"),
    }

    // 磁盘布局检查
    let run_dir = dir.path().join("work/7cpa_testdb");
    assert!(run_dir.join("receptor/7cpa.maps.fld").is_file());
    assert!(run_dir.join("batch_0/filelist").is_file());
    assert!(run_dir
        .join("batch_1/reports/testdb_batch1_1.dlg")
        .is_file());
    assert!(run_dir.join("run_report.json").is_file());
}

#[tokio::test]
async fn test_crashing_engine_records_failed_batches() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path(), 4, 2);
    config.retry.max_retries = 2;

    let crashing_engine = write_script(dir.path(), "crash_engine.sh", "exit 3");
    let coordinator = PipelineCoordinator::new(
        config,
        Arc::new(ObabelConverter::new(fake_converter(dir.path()))),
        Arc::new(ScriptReceptorPreparer::new(fake_receptor_prep(dir.path()))),
        Arc::new(AutoDockGpuEngine::new(crashing_engine)),
        Arc::new(DockedReportParser),
    );

    let (_tx, rx) = broadcast::channel(16);
    let report = coordinator.run(rx).await.unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.result, RunResult::NoFavorableBinding);
    for batch in &report.batches {
        assert!(matches!(batch.status, JobStatus::Failed(_)));
        // 预算2次重试，总共3次尝试
        assert_eq!(batch.attempts, 3);
    }
}

#[tokio::test]
async fn test_failing_receptor_prep_aborts_before_any_batch() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), 4, 2);

    let failing_prep = write_script(dir.path(), "fail_prep.sh", "exit 1");
    let coordinator = PipelineCoordinator::new(
        config,
        Arc::new(ObabelConverter::new(fake_converter(dir.path()))),
        Arc::new(ScriptReceptorPreparer::new(failing_prep)),
        Arc::new(AutoDockGpuEngine::new(fake_engine(dir.path()))),
        Arc::new(DockedReportParser),
    );

    let (_tx, rx) = broadcast::channel(16);
    assert!(coordinator.run(rx).await.is_err());

    // 没有任何批次目录被创建
    assert!(!dir.path().join("work/7cpa_testdb/batch_0").exists());
}
