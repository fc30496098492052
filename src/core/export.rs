use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::core::product_manager::ProductManager;
use crate::models::{PriceObservation, Product};
use crate::utils::error::Result;

/// JSON snapshot of every product and its full price history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub export_date: DateTime<Utc>,
    pub products: Vec<ProductExport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductExport {
    #[serde(flatten)]
    pub product: Product,
    pub observations: Vec<PriceObservation>,
}

impl ExportDocument {
    /// Groups observations under their products, keeping insertion order.
    pub fn build(products: Vec<Product>, observations: Vec<PriceObservation>) -> Self {
        let mut by_product: HashMap<String, Vec<PriceObservation>> = HashMap::new();
        for observation in observations {
            by_product
                .entry(observation.product_id.clone())
                .or_default()
                .push(observation);
        }

        let products = products
            .into_iter()
            .map(|product| ProductExport {
                observations: by_product.remove(&product.id).unwrap_or_default(),
                product,
            })
            .collect();

        Self {
            export_date: Utc::now(),
            products,
        }
    }

    pub async fn collect(manager: &ProductManager) -> Result<Self> {
        let products = manager.list_products().await?;
        let observations = manager.history().list_all().await?;
        Ok(Self::build(products, observations))
    }

    pub fn observation_count(&self) -> usize {
        self.products.iter().map(|p| p.observations.len()).sum()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        info!(
            "Exported {} products and {} observations to {}",
            self.products.len(),
            self.observation_count(),
            path.display()
        );
        Ok(())
    }
}
