use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use log::info;
use thiserror::Error;

use crate::models::guide::GuideCatalog;

#[derive(Debug, Error)]
pub enum GuideError {
    #[error("Guide catalog IO error: {0}")] Io(#[from] std::io::Error),
    #[error("Guide catalog JSON parsing error: {0}")] Json(#[from] serde_json::Error),
    #[error("Duplicate guide id '{0}'")] DuplicateId(String),
}

pub fn load_catalog_from_str(json: &str) -> Result<GuideCatalog, GuideError> {
    let catalog: GuideCatalog = serde_json::from_str(json)?;
    {
        let mut seen = HashSet::new();
        for doc in catalog.documents() {
            if !seen.insert(doc.id.as_str()) {
                return Err(GuideError::DuplicateId(doc.id.clone()));
            }
        }
    }
    Ok(catalog)
}

pub fn load_catalog<P: AsRef<Path>>(path: P) -> Result<Arc<GuideCatalog>, GuideError> {
    let json = fs::read_to_string(path.as_ref())?;
    let catalog = load_catalog_from_str(&json)?;
    info!(
        "Loaded guide catalog from {} ({} categories, {} guides)",
        path.as_ref().display(),
        catalog.categories.len(),
        catalog.len()
    );
    Ok(Arc::new(catalog))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_catalog_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"categories":[{{"id":"ui","label":"UI","items":[{{"id":"cards","title":"카드","description":"d","tags":["상품"]}}]}}]}}"#
        ).unwrap();
        let catalog = load_catalog(file.path()).unwrap();
        assert_eq!(catalog.ids(), vec!["cards"]);
        assert_eq!(catalog.get("cards").unwrap().tags, vec!["상품".to_string()]);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let json =
            r#"{"categories":[
            {"id":"a","label":"A","items":[{"id":"cards","title":"t","description":"d"}]},
            {"id":"b","label":"B","items":[{"id":"cards","title":"t2","description":"d2"}]}
        ]}"#;
        assert!(matches!(load_catalog_from_str(json), Err(GuideError::DuplicateId(id)) if id == "cards"));
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(load_catalog("/nonexistent/guides.json"), Err(GuideError::Io(_))));
    }
}
