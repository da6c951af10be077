// bedit - 大文件字节编辑器
//
// Copyright (c) 2025 bedit team
//
// Licensed under MIT License

use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use bedit::core::model::{ChangeKind, ChangeLog, FileModel, OpenMode};

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        bail!("Usage: {} <file> <changes-file>", args[0]);
    }

    // 装载变更日志
    let mut changes = ChangeLog::new();
    changes
        .load(Path::new(&args[2]))
        .with_context(|| format!("couldn't load changes from '{}'", args[2]))?;

    info!(changes = changes.size(), file = %args[1], "replaying change log");

    // 对文件重放每条变更
    let mut model = FileModel::new(true);
    model
        .open(Path::new(&args[1]), OpenMode::ReadWrite)
        .with_context(|| format!("error opening file '{}'", args[1]))?;

    for i in 0..changes.size() {
        let chg = match changes.get(i) {
            Some(chg) => chg,
            None => break,
        };

        let res = match (chg.kind, chg.new.as_deref()) {
            (ChangeKind::Modify, Some(new)) => model.modify(chg.off, new),
            (ChangeKind::Add, Some(new)) => model.add(chg.off, new),
            (ChangeKind::Remove, _) => model.remove(chg.off, chg.len),
            _ => bail!("change {} has no payload", i),
        };

        if !res.is_success() {
            bail!(
                "[{}] [offset = {}, length = {}] {}",
                chg.kind.as_str(),
                chg.off,
                chg.len,
                res
            );
        }
    }

    model.save().context("error saving file")?;

    info!(length = model.length(), "done");

    Ok(())
}
