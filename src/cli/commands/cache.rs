//! Cache command - inspect and prune the shared download cache

use crate::cache::{format_bytes, CacheState, CachedItem, DownloadCache};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::{Config, ConfigManager};
use crate::error::{BasinError, BasinResult};
use crate::ui::{self, TaskSpinner, UiContext};
use chrono::Utc;
use console::style;
use std::path::Path;
use tracing::debug;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> BasinResult<()> {
    let cache = DownloadCache::new(ConfigManager::cache_dir(config));

    match args.action {
        CacheAction::List { format } => list_entries(&cache, format).await,
        CacheAction::Gc { days, dry_run } => gc_entries(&cache, config, days, dry_run).await,
        CacheAction::Clear { yes } => clear_cache(&cache, yes).await,
    }
}

/// List every cached download
async fn list_entries(cache: &DownloadCache, format: OutputFormat) -> BasinResult<()> {
    let items = cache.list().await?;

    if items.is_empty() && !matches!(format, OutputFormat::Json) {
        println!("No cached downloads in {}", cache.root().display());
        return Ok(());
    }

    match format {
        OutputFormat::Table => print_table(cache.root(), &items),
        OutputFormat::Json => print_json(cache.root(), &items)?,
        OutputFormat::Plain => {
            for item in &items {
                println!("{}", display_name(cache.root(), item));
            }
        }
    }

    Ok(())
}

/// `source/region` relative to the cache root
fn display_name(root: &Path, item: &CachedItem) -> String {
    item.dir
        .strip_prefix(root)
        .unwrap_or(&item.dir)
        .display()
        .to_string()
}

fn age_days(item: &CachedItem) -> Option<i64> {
    item.entry
        .as_ref()
        .map(|e| (Utc::now() - e.fetched_at).num_days())
}

fn print_table(root: &Path, items: &[CachedItem]) {
    println!(
        "{:<40} {:<10} {:>10} {:<18} {:>6}",
        "ENTRY", "STATE", "SIZE", "FETCHED", "FILES"
    );
    println!("{}", "-".repeat(88));

    let mut total = 0;
    for item in items {
        let state = match item.state {
            CacheState::Complete => style("complete").green().to_string(),
            CacheState::Building => style("building").yellow().to_string(),
            CacheState::Miss => style("miss").dim().to_string(),
        };
        let (fetched, files) = match &item.entry {
            Some(entry) => (
                entry.fetched_at.format("%Y-%m-%d %H:%M").to_string(),
                entry.files.len().to_string(),
            ),
            None => ("-".to_string(), "-".to_string()),
        };
        total += item.size_bytes;

        println!(
            "{:<40} {:<10} {:>10} {:<18} {:>6}",
            display_name(root, item),
            state,
            format_bytes(item.size_bytes),
            fetched,
            files
        );
    }

    println!();
    println!("Total: {} entr(ies), {}", items.len(), format_bytes(total));
}

fn print_json(root: &Path, items: &[CachedItem]) -> BasinResult<()> {
    #[derive(serde::Serialize)]
    struct EntryJson {
        name: String,
        path: String,
        state: String,
        size_bytes: u64,
        fetched_at: Option<String>,
        files: usize,
        origin_urls: Vec<String>,
    }

    let entries: Vec<EntryJson> = items
        .iter()
        .map(|item| EntryJson {
            name: display_name(root, item),
            path: item.dir.display().to_string(),
            state: item.state.to_string(),
            size_bytes: item.size_bytes,
            fetched_at: item.entry.as_ref().map(|e| e.fetched_at.to_rfc3339()),
            files: item.entry.as_ref().map_or(0, |e| e.files.len()),
            origin_urls: item
                .entry
                .as_ref()
                .map(|e| e.origin_urls.clone())
                .unwrap_or_default(),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

/// Complete entries older than `days`, plus leftovers from interrupted fetches
fn expired(items: &[CachedItem], days: u32) -> Vec<&CachedItem> {
    items
        .iter()
        .filter(|item| match (&item.state, &item.entry) {
            (CacheState::Complete, Some(entry)) => entry.is_older_than_days(days),
            _ => true,
        })
        .collect()
}

/// Garbage collect old and interrupted downloads
async fn gc_entries(
    cache: &DownloadCache,
    config: &Config,
    days_override: Option<u32>,
    dry_run: bool,
) -> BasinResult<()> {
    let ctx = UiContext::detect();
    let gc_days = days_override.unwrap_or(config.cache.gc_days);

    if gc_days == 0 {
        println!("Cache GC is disabled (gc_days = 0)");
        return Ok(());
    }

    let items = cache.list().await?;
    let to_remove = expired(&items, gc_days);

    if to_remove.is_empty() {
        println!("No cached downloads older than {} days.", gc_days);
        return Ok(());
    }

    println!(
        "Found {} entr(ies) older than {} days or left incomplete:",
        to_remove.len(),
        gc_days
    );
    for item in &to_remove {
        let age = match age_days(item) {
            Some(days) => format!("{} days old", days),
            None => item.state.to_string(),
        };
        println!(
            "  {} {} ({}, {})",
            style("•").red(),
            display_name(cache.root(), item),
            age,
            format_bytes(item.size_bytes)
        );
    }

    if dry_run {
        println!();
        ui::remark(&ctx, "Dry run - nothing removed.");
        return Ok(());
    }

    let mut freed = 0;
    for item in &to_remove {
        debug!("Removing cache entry: {}", item.dir.display());
        cache.remove(item).await?;
        freed += item.size_bytes;
    }

    ui::step_ok_detail(
        &ctx,
        &format!("Removed {} entr(ies)", to_remove.len()),
        &format!("{} freed", format_bytes(freed)),
    );
    Ok(())
}

/// Remove the whole cache, downloads and derived tiles alike
async fn clear_cache(cache: &DownloadCache, skip_confirm: bool) -> BasinResult<()> {
    let ctx = UiContext::detect().with_auto_yes(skip_confirm);
    let root = cache.root();

    if !root.exists() {
        println!("No cache at {}", root.display());
        return Ok(());
    }

    let items = cache.list().await?;
    let size: u64 = items.iter().map(|i| i.size_bytes).sum();
    println!(
        "This will remove {} cached download(s) ({}) and all derived tiles under {}",
        items.len(),
        format_bytes(size),
        root.display()
    );

    if !ui::confirm(&ctx, "Clear the download cache?", false).await? {
        println!("Aborted.");
        return Ok(());
    }

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start("Clearing cache...");
    if let Err(e) = tokio::fs::remove_dir_all(root).await {
        spinner.stop_error("Could not clear cache");
        return Err(BasinError::io(format!("removing {}", root.display()), e));
    }
    spinner.stop(&format!("Cleared {}", root.display()));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheEntry, CacheKey};
    use std::path::PathBuf;

    fn item(name: &str, state: CacheState, fetched_days_ago: Option<i64>) -> CachedItem {
        let entry = fetched_days_ago.map(|days| CacheEntry {
            key: CacheKey::new("hydrography", "1701").unwrap(),
            files: vec![PathBuf::from("NHDPLUS_H_1701_HU4_GDB.zip")],
            origin_urls: vec!["https://example.test/1701.zip".to_string()],
            fetched_at: Utc::now() - chrono::Duration::days(days),
        });
        CachedItem {
            dir: PathBuf::from("/cache/hydrography").join(name),
            state,
            entry,
            size_bytes: 1024,
        }
    }

    #[test]
    fn expired_keeps_recent_entries() {
        let items = vec![
            item("1701", CacheState::Complete, Some(2)),
            item("1702", CacheState::Complete, Some(40)),
            item(".staging-1703-abc", CacheState::Building, None),
        ];
        let names: Vec<String> = expired(&items, 30)
            .iter()
            .map(|i| display_name(Path::new("/cache"), i))
            .collect();
        assert_eq!(names, vec!["hydrography/1702", "hydrography/.staging-1703-abc"]);
    }

    #[test]
    fn age_only_for_complete_entries() {
        assert_eq!(age_days(&item("1701", CacheState::Complete, Some(3))), Some(3));
        assert_eq!(age_days(&item("x", CacheState::Building, None)), None);
    }

    #[tokio::test]
    async fn clear_removes_root_when_confirmed() {
        let temp = tempfile::TempDir::new().unwrap();
        let root = temp.path().join("cache");
        std::fs::create_dir_all(root.join("derived").join("slope")).unwrap();
        std::fs::write(root.join("derived").join("slope").join("n49w116.tif"), b"tif").unwrap();

        clear_cache(&DownloadCache::new(root.clone()), true).await.unwrap();
        assert!(!root.exists());
    }
}
