//! Per-store registry of document mappings.

use super::{Document, DocumentMapping};
use crate::config::StoreOptions;
use dashmap::DashMap;
use std::any::TypeId;
use std::sync::Arc;

/// Lazily built, read-mostly table of `DocumentMapping`s keyed by type
pub struct DocumentRegistry {
    options: Arc<StoreOptions>,
    mappings: DashMap<TypeId, Arc<DocumentMapping>>,
}

impl DocumentRegistry {
    pub fn new(options: Arc<StoreOptions>) -> Self {
        Self {
            options,
            mappings: DashMap::new(),
        }
    }

    /// Mapping for `T`, registering it on first use
    pub fn mapping_for<T: Document>(&self) -> Arc<DocumentMapping> {
        self.mappings
            .entry(TypeId::of::<T>())
            .or_insert_with(|| {
                let mapping = DocumentMapping::for_document::<T>(&self.options);
                tracing::debug!(
                    "Registered document type {} as {}",
                    mapping.document_type,
                    mapping.table_name
                );
                Arc::new(mapping)
            })
            .clone()
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}
