use crate::error::Result;
use crate::knowledge::pdf_paths;
use std::collections::BTreeSet;
use std::path::Path;

/// Create the input and processed folders if they do not exist yet
pub fn ensure_folders(pdf_folder: &Path, processed_folder: &Path) -> Result<()> {
    std::fs::create_dir_all(pdf_folder)?;
    std::fs::create_dir_all(processed_folder)?;
    log::debug!(
        "PDF folder: {}, processed folder: {}",
        pdf_folder.display(),
        processed_folder.display()
    );
    Ok(())
}

/// PDF filenames directly inside `dir`, sorted.
///
/// Names that are not valid UTF-8 are skipped with a warning.
pub fn list_pdfs(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for path in pdf_paths(dir)? {
        match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => names.push(name.to_string()),
            None => log::warn!("Skipping PDF with a non UTF-8 name: {}", path.display()),
        }
    }
    Ok(names)
}

/// Input filenames not yet processed, without creating folders or logging.
/// A missing folder counts as empty.
pub fn pending_pdfs(pdf_folder: &Path, processed_folder: &Path) -> Result<BTreeSet<String>> {
    let processed: BTreeSet<String> = list_existing(processed_folder)?.into_iter().collect();
    Ok(list_existing(pdf_folder)?
        .into_iter()
        .filter(|name| !processed.contains(name))
        .collect())
}

fn list_existing(dir: &Path) -> Result<Vec<String>> {
    if dir.is_dir() {
        list_pdfs(dir)
    } else {
        Ok(Vec::new())
    }
}

/// Filenames present in `pdf_folder` but not yet in `processed_folder`.
///
/// Identity is the filename alone: a different file reusing the name of a
/// processed one is considered processed.
pub fn classify(pdf_folder: &Path, processed_folder: &Path) -> Result<BTreeSet<String>> {
    ensure_folders(pdf_folder, processed_folder)?;
    let unprocessed = pending_pdfs(pdf_folder, processed_folder)?;

    if unprocessed.is_empty() {
        log::info!("All PDFs have been processed already");
    } else {
        log::info!("Found {} new PDF(s) to process", unprocessed.len());
        for name in &unprocessed {
            log::info!("  • {}", name);
        }
    }

    Ok(unprocessed)
}
