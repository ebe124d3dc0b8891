//! Per-run scratch-state reset (spec §4.3 step 2): the attempt-count and
//! output-log directories must start empty for every run so a previous
//! run's attempt counters and logs never leak into a new one.

use std::path::Path;

pub async fn reset(workdir: &Path) -> std::io::Result<()> {
    let cloche_dir = workdir.join(".cloche");
    for sub in ["attempt_count", "output"] {
        let dir = cloche_dir.join(sub);
        if tokio::fs::metadata(&dir).await.is_ok() {
            tokio::fs::remove_dir_all(&dir).await?;
        }
        tokio::fs::create_dir_all(&dir).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clears_stale_attempt_counts_and_logs() {
        let dir = tempfile::tempdir().unwrap();
        let attempt_dir = dir.path().join(".cloche").join("attempt_count");
        tokio::fs::create_dir_all(&attempt_dir).await.unwrap();
        tokio::fs::write(attempt_dir.join("build"), "3").await.unwrap();

        reset(dir.path()).await.unwrap();

        assert!(!attempt_dir.join("build").exists());
        assert!(dir.path().join(".cloche").join("output").is_dir());
    }

    #[tokio::test]
    async fn creates_directories_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        reset(dir.path()).await.unwrap();
        assert!(dir.path().join(".cloche").join("attempt_count").is_dir());
        assert!(dir.path().join(".cloche").join("output").is_dir());
    }
}
