//! Folder watcher: re-run ingestion when PDFs appear in the input folder.
//!
//! A notify thread debounces filesystem events; the async side collapses every
//! burst of PDF events into a single coordinator run.

mod watcher;

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use crate::error::{PdfChatError, Result};
use crate::knowledge::is_pdf;
use crate::library::{ensure_folders, IngestionCoordinator};

/// Whether an event path is a PDF directly inside the input folder
pub fn is_input_pdf(path: &Path, pdf_folder: &Path) -> bool {
    path.parent() == Some(pdf_folder) && is_pdf(path)
}

/// Watch the input folder and ingest after each burst of PDF changes.
/// Runs until the watcher thread stops.
pub async fn run_watcher(
    coordinator: Arc<IngestionCoordinator>,
    processed_folder: PathBuf,
    debounce_ms: u64,
) -> Result<()> {
    ensure_folders(coordinator.pdf_folder(), &processed_folder)?;
    let root = coordinator.pdf_folder().canonicalize()?;

    let (tx, rx) = mpsc::channel();
    let rx = Arc::new(Mutex::new(rx));

    let thread_root = root.clone();
    std::thread::spawn(move || {
        if let Err(e) = watcher::run_watcher_thread(&thread_root, debounce_ms, tx) {
            log::error!("watcher thread error: {}", e);
        }
    });

    log::info!("Watching {} for new PDFs (debounce {} ms)", root.display(), debounce_ms);

    loop {
        let rx_clone = Arc::clone(&rx);
        let received = tokio::task::spawn_blocking(move || {
            let rx = rx_clone.lock().unwrap_or_else(|p| p.into_inner());
            let first = rx.recv()?;
            // Take whatever else already settled so one run covers the burst
            let mut paths = vec![first];
            paths.extend(rx.try_iter());
            Ok::<_, mpsc::RecvError>(paths)
        })
        .await
        .map_err(|e| PdfChatError::Config(format!("watcher task join: {}", e)))?;

        let paths = match received {
            Ok(paths) => paths,
            Err(_) => break,
        };

        if !paths.iter().any(|p| is_input_pdf(p, &root)) {
            continue;
        }

        match coordinator.ingest_new_documents().await {
            Ok(report) if report.count() > 0 => {
                log::info!("watch: ingested {} new PDF(s)", report.count())
            }
            Ok(_) => log::debug!("watch: nothing new to ingest"),
            Err(e) => log::error!("watch: ingestion failed: {}", e),
        }
    }

    Ok(())
}
