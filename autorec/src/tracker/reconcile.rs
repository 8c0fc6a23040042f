//! Reconciliation of the registry against the tracked-URL list file.

use std::collections::HashSet;
use std::sync::Arc;

use notify::{EventKind, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::Result;
use crate::tracker::Shared;

/// Parse list-file contents: one URL per line, blank lines and
/// `#`-comments ignored, duplicates collapsed.
pub(crate) fn parse_list(contents: &str) -> HashSet<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Bring the registry into agreement with the list file: stale targets are
/// cancelled and removed, missing ones added concurrently. Returns once
/// every add has settled, so a reconcile observes its own effects.
pub(crate) async fn reconcile(shared: &Arc<Shared>, announce: bool) -> Result<()> {
    let path = shared.cfg.list_path();
    debug!("reading {}", path.display());
    let contents = tokio::fs::read_to_string(&path).await?;
    let desired = parse_list(&contents);
    let current = shared.registry.links();

    for link in current.difference(&desired) {
        shared.registry.remove(link);
    }

    let mut pending = Vec::new();
    for link in desired.difference(&current) {
        let shared = shared.clone();
        let link = link.clone();
        pending.push(shared.tasks.clone().spawn(async move {
            if let Err(e) = shared
                .registry
                .add(&link, shared.scheduler.as_ref())
                .await
            {
                warn!("{link}: {e}");
            }
        }));
    }
    for handle in pending {
        let _ = handle.await;
    }

    if announce {
        for tracked in shared.registry.snapshot() {
            shared.hooks.run(
                "reload",
                serde_json::json!({"Name": tracked.name(), "Link": tracked.link()}),
            );
        }
    }

    Ok(())
}

/// Watch the config directory; list-file changes trigger reconciliation
/// and config-file changes reload the options.
///
/// The directory rather than the files is watched so editors that replace
/// files wholesale (rename-over) keep being observed.
pub(crate) async fn watch(shared: Arc<Shared>) -> Result<()> {
    let dir = shared.cfg.dir().to_path_buf();
    let list_path = shared.cfg.list_path();
    let config_path = shared.cfg.config_path();

    let (tx, mut rx) = tokio::sync::mpsc::channel::<notify::Result<notify::Event>>(16);
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = tx.blocking_send(res);
    })?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    debug!("watching {}", dir.display());

    loop {
        let event = tokio::select! {
            _ = shared.shutdown.cancelled() => {
                debug!("watcher done");
                return Ok(());
            }
            event = rx.recv() => event,
        };

        match event {
            Some(Ok(event)) => {
                if !matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                ) {
                    continue;
                }
                // Compare file names: some backends report canonicalized
                // paths that differ from the watched one.
                if touches(&event, &list_path) {
                    info!("track list changed");
                    if let Err(e) = reconcile(&shared, true).await {
                        warn!("reconcile: {e}");
                    }
                }
                if touches(&event, &config_path) {
                    shared.cfg.reload();
                }
            }
            Some(Err(e)) => warn!("watch error: {e}"),
            None => return Ok(()),
        }
    }
}

fn touches(event: &notify::Event, file: &std::path::Path) -> bool {
    event
        .paths
        .iter()
        .any(|p| p.file_name().is_some() && p.file_name() == file.file_name())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lines_skipping_comments_and_blanks() {
        let list = "\n# comment\nhttps://x/a\n  https://x/b  \n\n# another\nhttps://x/a\n";
        let parsed = parse_list(list);
        assert_eq!(parsed.len(), 2);
        assert!(parsed.contains("https://x/a"));
        assert!(parsed.contains("https://x/b"));
    }

    #[test]
    fn empty_list_parses_to_nothing() {
        assert!(parse_list("").is_empty());
        assert!(parse_list("# only comments\n").is_empty());
    }
}
