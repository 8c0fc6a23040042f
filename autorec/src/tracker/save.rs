//! The saver: spawns the external downloader, supervises it, and tries to
//! recover the session when the downloader exits early.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, LazyLock};

use chrono::{Local, Utc};
use regex::Regex;
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::config::Config;
use crate::tracker::snipe::{SnipeError, wait_for_live, wait_for_stream};
use crate::tracker::{Shared, Tracked};
use crate::utils::filename::{next_save_path, sanitize_component};
use crate::{Error, Result};

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{([^}]*)\}\}").unwrap());

/// Record one session for `tracked`, including recovery attempts.
///
/// Refuses silently when a save for the link is already active. The save
/// task entry, the `on_save_end` callback and the `end-save` hook are all
/// handled here, exactly once per session, on every exit path.
pub(crate) async fn run(shared: Arc<Shared>, tracked: Arc<Tracked>, stream_url: String) {
    let link = tracked.link().to_string();
    let name = tracked.name().to_string();

    if !shared.saves.add(&link) {
        info!("already saving {name}");
        return;
    }
    info!("saving {name}");

    if let Err(e) = save_session(&shared, &tracked, stream_url).await {
        warn!("{name}: {e}");
    }

    shared.saves.remove(&link);
    tracked.target().on_save_end().await;
    shared
        .hooks
        .run("end-save", serde_json::json!({"Name": name, "Link": link}));
}

async fn save_session(
    shared: &Arc<Shared>,
    tracked: &Arc<Tracked>,
    mut stream_url: String,
) -> Result<()> {
    let name = tracked.name().to_string();
    let link = tracked.link().to_string();
    let cancel = tracked.cancel_token();

    loop {
        let cfg = shared.cfg.get();
        let (mut child, save_as) = spawn_downloader(&cfg, tracked, &stream_url)?;
        let pid = child.id();
        info!("{name} [pid {pid:?}]");

        tracked.target().on_save_start().await;
        shared.hooks.run(
            "begin-save",
            serde_json::json!({
                "Name": name,
                "Link": link,
                "SaveAs": save_as.to_string_lossy(),
            }),
        );

        tokio::select! {
            _ = shared.shutdown.cancelled() => {
                let _ = child.kill().await;
                info!("{name}: shutdown [pid {pid:?}]");
                return Ok(());
            }
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                tracked.set_finished_at(Utc::now());
                info!("{name}: cancelled [pid {pid:?}]");
                return Ok(());
            }
            status = child.wait() => {
                match status {
                    Ok(status) => info!("{name}: downloader exited ({status}) [pid {pid:?}]"),
                    Err(e) => warn!("{name}: downloader wait failed: {e} [pid {pid:?}]"),
                }

                // The stream may have hiccupped rather than ended; look
                // for the same broadcast again before giving up.
                let recovery_began = Instant::now();
                match recover(shared, tracked, &cancel).await {
                    Ok(new_url) => {
                        info!("{name}: recovered ({:.1?})", recovery_began.elapsed());
                        stream_url = new_url;
                    }
                    Err(e) => {
                        let spent = chrono::Duration::from_std(recovery_began.elapsed())
                            .unwrap_or_else(|_| chrono::Duration::zero());
                        tracked.set_finished_at(Utc::now() - spent);
                        info!("{name}: not recovered ({e})");
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Wait within the recovery window for the target to come back live with a
/// fresh stream URL.
async fn recover(
    shared: &Arc<Shared>,
    tracked: &Arc<Tracked>,
    cancel: &tokio_util::sync::CancellationToken,
) -> std::result::Result<String, SnipeError> {
    let name = tracked.name();
    info!("{name}: recovering");

    let deadline = Instant::now() + shared.cfg.get().recover_timeout();
    wait_for_live(tracked.target().as_ref(), &shared.policy, deadline, cancel).await?;
    info!("{name}: is online");
    wait_for_stream(tracked.target().as_ref(), &shared.policy, deadline, cancel).await
}

/// Build and spawn the downloader command for one recording.
fn spawn_downloader(
    cfg: &Config,
    tracked: &Tracked,
    stream_url: &str,
) -> Result<(Child, PathBuf)> {
    let subpath = sanitize_component(tracked.target().save_subpath().trim());
    let subpath = if subpath.is_empty() {
        "unnamed".to_string()
    } else {
        subpath
    };

    let save_dir = cfg.save_to.join(&subpath);
    std::fs::create_dir_all(&save_dir)?;
    let save_as = next_save_path(&save_dir, &subpath, Local::now().date_naive());

    let argv = build_command(
        &cfg.download_with,
        &cfg.user_agent,
        &save_as.to_string_lossy(),
        stream_url,
    );
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| Error::config("download_with is empty"))?;

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Other(format!("failed to spawn downloader {program}: {e}")))?;

    Ok((child, save_as))
}

/// Substitute `{{UserAgent}}`, `{{SavePath}}` and `{{StreamURL}}` in the
/// command template and split it into argv. Unknown placeholders pass
/// through literally.
fn build_command(template: &str, user_agent: &str, save_path: &str, stream_url: &str) -> Vec<String> {
    template
        .split_whitespace()
        .map(|token| {
            let Some(m) = PLACEHOLDER_RE.captures(token) else {
                return token.to_string();
            };
            let value = match &m[1] {
                "UserAgent" => user_agent,
                "SavePath" => save_path,
                "StreamURL" => stream_url,
                _ => return token.to_string(),
            };
            token.replacen(&m[0], value, 1)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_placeholders() {
        let argv = build_command(
            "streamlink --http-header User-Agent={{UserAgent}} -o {{SavePath}} {{StreamURL}} best",
            "UA/1.0",
            "/tmp/out.ts",
            "https://hls/x.m3u8",
        );
        assert_eq!(
            argv,
            vec![
                "streamlink",
                "--http-header",
                "User-Agent=UA/1.0",
                "-o",
                "/tmp/out.ts",
                "https://hls/x.m3u8",
                "best",
            ]
        );
    }

    #[test]
    fn unknown_placeholders_pass_through() {
        let argv = build_command("dl {{Mystery}} {{StreamURL}}", "ua", "p", "url");
        assert_eq!(argv, vec!["dl", "{{Mystery}}", "url"]);
    }

    #[test]
    fn plain_tokens_are_untouched() {
        let argv = build_command("ffmpeg -i {url}", "ua", "p", "u");
        assert_eq!(argv, vec!["ffmpeg", "-i", "{url}"]);
    }
}
