use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::IngressError;
use crate::queue::JobIntake;
use crate::worker::Ingress;

/// Running landing-directory watcher
pub struct WatcherHandle {
    dir: PathBuf,
    // Dropping the watcher unregisters the OS watch
    watcher: RecommendedWatcher,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stop watching
    ///
    /// Files already inside their quiescence window are still submitted until
    /// `deadline`; whatever has not been queued by then is abandoned.
    pub async fn stop(self, deadline: Instant) {
        drop(self.watcher);
        let _ = self.shutdown.send(true);
        let mut task = self.task;
        match tokio::time::timeout_at(deadline, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Watcher task ended abnormally"),
            Err(_) => {
                task.abort();
                warn!(dir = %self.dir.display(), "Pending detections abandoned at shutdown deadline");
            }
        }
        info!(dir = %self.dir.display(), "Directory watcher stopped");
    }
}

/// Watch `dir` (non-recursive) and submit every newly created regular file
///
/// A creation event only starts the quiescence window; the file is submitted
/// after `quiescence` has passed if it is still a regular file by then.
/// Renames into the directory are not creations and are ignored, as are
/// hidden entries.
pub fn spawn_watcher(
    dir: &Path,
    quiescence: Duration,
    intake: Arc<JobIntake>,
) -> Result<WatcherHandle, IngressError> {
    std::fs::create_dir_all(dir).map_err(|source| IngressError::Directory {
        path: dir.to_path_buf(),
        source,
    })?;

    let (tx, rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let _ = tx.send(res);
    })?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    info!(dir = %dir.display(), quiescence_ms = quiescence.as_millis() as u64, "Watching landing directory");

    let (shutdown, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(watch_loop(rx, shutdown_rx, quiescence, intake));

    Ok(WatcherHandle {
        dir: dir.to_path_buf(),
        watcher,
        shutdown,
        task,
    })
}

async fn watch_loop(
    mut events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    mut shutdown: watch::Receiver<bool>,
    quiescence: Duration,
    intake: Arc<JobIntake>,
) {
    let mut pending = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            Some(_) = pending.join_next(), if !pending.is_empty() => {}
            event = events.recv() => match event {
                Some(Ok(event)) => {
                    for path in created_files(&event) {
                        debug!(path = %path.display(), "Creation event");
                        pending.spawn(settle_and_submit(path, quiescence, intake.clone()));
                    }
                }
                Some(Err(e)) => warn!(error = %e, "Watch error, continuing"),
                None => break,
            },
        }
    }

    // Aborting this task drops `pending` and with it every unfinished settle task
    while pending.join_next().await.is_some() {}
}

fn created_files(event: &Event) -> Vec<PathBuf> {
    if !matches!(event.kind, EventKind::Create(_)) {
        return Vec::new();
    }
    event
        .paths
        .iter()
        .filter(|p| !is_hidden(p))
        .cloned()
        .collect()
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_none_or(|n| n.starts_with('.'))
}

async fn settle_and_submit(path: PathBuf, quiescence: Duration, intake: Arc<JobIntake>) {
    tokio::time::sleep(quiescence).await;

    let metadata = match tokio::fs::metadata(&path).await {
        Ok(m) => m,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "File vanished before relay");
            return;
        }
    };
    if !metadata.is_file() {
        return;
    }

    if let Err(e) = intake.submit(&path, metadata.len(), Ingress::Watcher).await {
        warn!(path = %path.display(), error = %e, "Detected file not relayed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RenameMode};

    #[test]
    fn test_only_creations_count() {
        let create = Event::new(EventKind::Create(CreateKind::File)).add_path("/in/a.bin".into());
        assert_eq!(created_files(&create), vec![PathBuf::from("/in/a.bin")]);

        let rename = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To))).add_path("/in/a.bin".into());
        assert!(created_files(&rename).is_empty());

        let hidden = Event::new(EventKind::Create(CreateKind::Folder)).add_path("/in/.staging".into());
        assert!(created_files(&hidden).is_empty());
    }
}
