//! 引擎层：外部协作者的进程适配器
//!
//! obabel转换、受体准备脚本、AutoDock-GPU调用和报告解析。

pub mod autodock;
pub mod converter;
pub mod receptor;
pub mod report;

pub use autodock::AutoDockGpuEngine;
pub use converter::ObabelConverter;
pub use receptor::ScriptReceptorPreparer;
pub use report::DockedReportParser;
