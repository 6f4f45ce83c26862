//! Publish a dataset.

use anyhow::{Context, Result};
use sync_client::Remote;
use sync_types::DatasetId;

/// Run the publish command.
pub async fn run<R: Remote + ?Sized>(remote: &R, dataset: &DatasetId) -> Result<()> {
    remote
        .publish_dataset(dataset)
        .await
        .with_context(|| format!("Failed to publish {}", dataset))?;
    println!("Published {}", dataset);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_client::MockRemote;

    #[tokio::test]
    async fn publish_existing_dataset() {
        let remote = MockRemote::new();
        let dataset = DatasetId::new("ds000001").unwrap();
        remote.insert_file(&dataset, "README", b"x");

        run(&remote, &dataset).await.unwrap();
        assert_eq!(remote.published(), vec!["ds000001"]);
    }

    #[tokio::test]
    async fn publish_unknown_dataset_fails() {
        let remote = MockRemote::new();
        let dataset = DatasetId::new("ds000042").unwrap();
        assert!(run(&remote, &dataset).await.is_err());
    }

    #[tokio::test]
    async fn publish_without_permission_fails() {
        let remote = MockRemote::new();
        let dataset = DatasetId::new("ds000001").unwrap();
        remote.insert_file(&dataset, "README", b"x");
        remote.deny_writes();

        let err = run(&remote, &dataset).await.unwrap_err();
        assert!(format!("{:#}", err).contains("not authorized"));
    }
}
