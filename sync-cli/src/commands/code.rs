//! Show this device's pairing code.

use anyhow::Result;
use std::path::Path;

use super::{friendly, Session};

/// Run the code command.
///
/// Prints only the code, so it can be piped or rendered as a QR code.
pub async fn run(data_dir: &Path, compact: bool) -> Result<()> {
    let session = Session::open(data_dir, false).await?;
    let code = session
        .orchestrator
        .pairing_code(compact)
        .await
        .map_err(friendly)?;
    println!("{}", code);
    session.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::init;
    use tempfile::tempdir;

    #[tokio::test]
    async fn code_requires_init() {
        let dir = tempdir().unwrap();
        assert!(run(dir.path(), false).await.is_err());
    }

    #[tokio::test]
    async fn code_after_init() {
        let dir = tempdir().unwrap();
        init::run(dir.path(), "Laptop", None).await.unwrap();
        assert!(run(dir.path(), true).await.is_ok());
    }
}
