//! Lifecycle hook runner.
//!
//! Users drop executables into `<config>/hooks/<event>/`; on each
//! lifecycle edge every executable there is spawned with the
//! JSON-serialized payload as its sole argument. Hook processes are
//! fire-and-forget: they are reaped in the background, never joined, and
//! failures are only logged.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Spawns user hooks for lifecycle events.
pub struct HookRunner {
    hooks_dir: PathBuf,
}

impl HookRunner {
    pub fn new(hooks_dir: PathBuf) -> Self {
        Self { hooks_dir }
    }

    /// Run every hook registered for `event`.
    pub fn run(&self, event: &str, payload: serde_json::Value) {
        let dir = self.hooks_dir.join(event);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("no {event} hooks: {e}");
                return;
            }
        };

        let arg = payload.to_string();
        for entry in entries.flatten() {
            let path = entry.path();
            if !is_executable(&path) {
                continue;
            }
            debug!("{event}: executing {}", path.display());
            match tokio::process::Command::new(&path)
                .arg(&arg)
                .current_dir(&dir)
                .spawn()
            {
                Ok(mut child) => {
                    // Reap quietly so finished hooks do not linger as
                    // zombies; nothing waits on the result.
                    tokio::spawn(async move {
                        let _ = child.wait().await;
                    });
                }
                Err(e) => warn!("{event}: hook {} failed to start: {e}", path.display()),
            }
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    match path.metadata() {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[cfg(unix)]
    fn write_hook(dir: &Path, name: &str, script: &str, executable: bool) {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, script).unwrap();
        let mode = if executable { 0o755 } else { 0o644 };
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_executable_hooks_with_payload() {
        let tmp = tempfile::tempdir().unwrap();
        let event_dir = tmp.path().join("hooks").join("begin-save");
        std::fs::create_dir_all(&event_dir).unwrap();

        let out = tmp.path().join("payload.txt");
        write_hook(
            &event_dir,
            "record",
            &format!("#!/bin/sh\nprintf %s \"$1\" > {}\n", out.display()),
            true,
        );
        write_hook(&event_dir, "ignored", "#!/bin/sh\nexit 1\n", false);

        let runner = HookRunner::new(tmp.path().join("hooks"));
        runner.run(
            "begin-save",
            serde_json::json!({"Name": "mano", "Link": "https://x/mano"}),
        );

        // Fire-and-forget: poll for the side effect.
        for _ in 0..100 {
            if out.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let written = std::fs::read_to_string(&out).unwrap();
        let payload: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(payload["Name"], "mano");
        assert_eq!(payload["Link"], "https://x/mano");
    }

    #[tokio::test]
    async fn missing_event_dir_is_fine() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = HookRunner::new(tmp.path().join("hooks"));
        runner.run("end-save", serde_json::json!({"Name": "x", "Link": "y"}));
    }
}
