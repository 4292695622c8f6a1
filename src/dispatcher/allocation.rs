use anyhow::{anyhow, Result};
use std::path::Path;

use super::{print_json, Session};
use crate::cli::formatters::format_allocation;
use crate::cli::BenchmarkArgs;
use perfana::portfolio::{AllocationCache, Category};

pub async fn dispatch_alloc(
    session: &Session,
    category: &str,
    file: &Path,
    benchmark: &BenchmarkArgs,
) -> Result<()> {
    let category: Category = category.parse().map_err(|e: String| anyhow!(e))?;
    let snapshot = session.benchmarked(file, benchmark).await?;

    let mut cache = AllocationCache::new();
    let table = cache
        .calculate(&snapshot, category, session.provider(), false)
        .await;

    if session.json {
        return print_json(table);
    }
    print!("{}", format_allocation(table));
    Ok(())
}
