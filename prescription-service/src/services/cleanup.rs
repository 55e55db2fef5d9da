use crate::services::providers::{AssetReference, PrescriptionModel};
use std::sync::Arc;

/// Deletes an uploaded asset when dropped.
///
/// Deletion runs on a detached task so it never delays the response, and its
/// failures are only logged. Dropping outside a tokio runtime skips cleanup.
pub struct AssetGuard {
    client: Arc<dyn PrescriptionModel>,
    asset: Option<AssetReference>,
}

impl AssetGuard {
    pub fn new(client: Arc<dyn PrescriptionModel>, asset: AssetReference) -> Self {
        Self {
            client,
            asset: Some(asset),
        }
    }
}

impl Drop for AssetGuard {
    fn drop(&mut self) {
        let Some(asset) = self.asset.take() else {
            return;
        };

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(asset = %asset.name, "No runtime available, uploaded asset not deleted");
            return;
        };

        let client = self.client.clone();
        handle.spawn(async move {
            match client.delete_file(&asset).await {
                Ok(()) => tracing::debug!(asset = %asset.name, "Deleted uploaded asset"),
                Err(e) => tracing::warn!(
                    asset = %asset.name,
                    error = %e,
                    "Failed to delete uploaded asset"
                ),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::mock::MockModel;
    use axum::body::Bytes;
    use std::time::Duration;

    #[tokio::test]
    async fn deletes_asset_on_drop() {
        let model = Arc::new(MockModel::responding("{}"));
        let asset = model
            .upload_file("prescription", "image/png", Bytes::from_static(&[1, 2, 3]))
            .await
            .unwrap();

        drop(AssetGuard::new(model.clone(), asset.clone()));

        for _ in 0..50 {
            if !model.deleted_assets().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(model.deleted_assets(), vec![asset.name]);
    }
}
