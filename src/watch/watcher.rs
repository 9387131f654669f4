//! Watcher thread: notify + debounce, send settled paths to the async side.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use notify::{RecursiveMode, Watcher};

use crate::error::{PdfChatError, Result};

/// Watch `root` (not its subdirectories) and send each changed path over `tx`
/// once it has been quiet for `debounce_ms`. Returns when the receiver is gone.
pub fn run_watcher_thread(root: &Path, debounce_ms: u64, tx: mpsc::Sender<PathBuf>) -> Result<()> {
    let debounce = Duration::from_millis(debounce_ms);
    let (event_tx, event_rx) = mpsc::channel::<Vec<PathBuf>>();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if let Ok(ev) = res {
            let _ = event_tx.send(ev.paths);
        }
    })
    .map_err(|e| PdfChatError::Config(format!("could not start file watcher: {}", e)))?;

    // processed/ lives inside the input folder; moves into it must not retrigger
    watcher
        .watch(root, RecursiveMode::NonRecursive)
        .map_err(|e| PdfChatError::Config(format!("could not watch {}: {}", root.display(), e)))?;

    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();

    loop {
        match event_rx.recv_timeout(debounce) {
            Ok(paths) => {
                let now = Instant::now();
                for p in paths {
                    pending.insert(p, now);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let now = Instant::now();
                let ready: Vec<PathBuf> = pending
                    .iter()
                    .filter(|(_, t)| now.duration_since(**t) >= debounce)
                    .map(|(p, _)| p.clone())
                    .collect();
                for p in ready {
                    pending.remove(&p);
                    if tx.send(p).is_err() {
                        return Ok(());
                    }
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    Ok(())
}
