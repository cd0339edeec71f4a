//! 脊髓 CSA 分析驱动.
//!
//! 读取分割 (以及可选的椎体层级标注), 运行完整流水线,
//! 在标准输出打印摘要, 并把报告与派生体数据写进结果目录.
//! 全部参数通过环境变量给出, 见 [`config`] 模块.

mod config;

use std::fs;
use std::io::Write;

use cord_berry::prelude::*;
use log::LevelFilter;
use simple_logger::SimpleLogger;

use config::RunConfig;

const SEP: &str = "--------------------------------------------------------";

/// 简单分隔线.
#[inline]
fn sep() {
    println!("{SEP}");
}

/// 在标准输出打印结果摘要.
fn summarize(out: &CsaOutcome) {
    const S4: &str = "    ";

    sep();
    println!("CSA summary:");
    match out.levels {
        Some(r) => println!("{S4}Vertebral levels: {} to {}", r.lo(), r.hi()),
        None => println!("{S4}Vertebral levels: ALL"),
    }
    println!("{S4}Slices (z): {}", out.slices);
    println!("{S4}Slices used: {}", out.stats.count);
    println!("{S4}CSA mean: {:.6} mm^2", out.stats.mean);
    println!("{S4}CSA std: {:.6} mm^2", out.stats.std);
    println!("{S4}CSA min: {:.6} mm^2", out.stats.min);
    println!("{S4}CSA max: {:.6} mm^2", out.stats.max);
    println!("{S4}Cord volume: {:.6} mm^3", out.volume_mm3);
    println!("{S4}Centerline length: {:.6} mm", out.length_mm);
    sep();
}

/// 实际运行.
fn run() -> PipelineResult<()> {
    let cfg = RunConfig::from_env()?;
    log::info!("segmentation: {}", cfg.seg_path.display());

    let seg = SegVolume::open(&cfg.seg_path)?;
    let labeling = match &cfg.labeling_path {
        Some(p) => {
            log::info!("vertebral labeling: {}", p.display());
            Some(LevelVolume::open(p)?)
        }
        None => None,
    };

    let outcome = process(&seg, labeling.as_ref(), cfg.spec())?;
    summarize(&outcome);

    // 先在临时工作目录内生成全部产物, 成功后再拷入结果目录,
    // 避免中途失败留下残缺的结果集.
    let workspace = TmpWorkspace::create(None, cfg.keep_tmp)?;
    let staged = export(&outcome, &seg, workspace.path(), &cfg.prefix)?;
    fs::create_dir_all(&cfg.out_dir)?;
    for src in &staged {
        // 产物路径均由 `export` 构造, 必然有文件名.
        let dst = cfg.out_dir.join(src.file_name().unwrap());
        fs::copy(src, &dst)?;
        println!("written: {}", dst.display());
    }
    Ok(())
}

fn main() {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .unwrap();

    if let Err(e) = run() {
        let _ = writeln!(std::io::stderr(), "error: {e}");
        std::process::exit(1);
    }
}
