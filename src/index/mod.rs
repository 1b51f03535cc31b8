//! In-memory document index.
//!
//! Holds the document universe, the category universe and the true
//! classification that learning and evaluation run against. Iteration order
//! of documents and categories is insertion order and is stable.

pub mod classification;
pub mod confidence;
pub mod serde;

use std::fmt;

use ::serde::{Deserialize, Serialize};
use indexmap::{IndexMap, IndexSet};

use crate::utils::math::vector::SparseVector;

pub use classification::Classification;
pub use confidence::{ClassificationScore, Confidences};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u32> for $name {
            fn from(v: u32) -> Self {
                Self(v)
            }
        }
    };
}

id_type!(
    /// Stable document identifier
    DocId
);
id_type!(
    /// Stable category identifier
    CategoryId
);
id_type!(FeatureId);

/// A document as the classifier sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub name: String,
    pub features: SparseVector<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct Index {
    categories: IndexMap<CategoryId, String>,
    documents: IndexMap<DocId, Document>,
    classification: Classification,
}

impl Index {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_category(&mut self, id: CategoryId, name: impl Into<String>) {
        self.categories.insert(id, name.into());
    }

    /// Add a document with its true categories. Unknown categories are
    /// registered with their numeric id as name.
    pub fn add_document(&mut self, id: DocId, doc: Document, categories: &[CategoryId]) {
        for cat in categories {
            if !self.categories.contains_key(cat) {
                self.categories.insert(*cat, cat.to_string());
            }
        }
        self.documents.insert(id, doc);
        self.classification.assign(id, categories.iter().copied());
    }

    pub fn document(&self, id: DocId) -> Option<&Document> {
        self.documents.get(&id)
    }

    pub fn documents(&self) -> impl Iterator<Item = (DocId, &Document)> {
        self.documents.iter().map(|(id, doc)| (*id, doc))
    }

    pub fn document_ids(&self) -> Vec<DocId> {
        self.documents.keys().copied().collect()
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn category_ids(&self) -> Vec<CategoryId> {
        self.categories.keys().copied().collect()
    }

    pub fn category_count(&self) -> usize {
        self.categories.len()
    }

    pub fn category_name(&self, id: CategoryId) -> Option<&str> {
        self.categories.get(&id).map(String::as_str)
    }

    /// True classification of the indexed documents.
    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    /// Mean number of true categories per document.
    pub fn average_cardinality(&self) -> f64 {
        if self.documents.is_empty() {
            return 0.0;
        }
        let total: usize = self
            .documents
            .keys()
            .map(|doc| self.classification.categories_of(*doc).len())
            .sum();
        total as f64 / self.documents.len() as f64
    }

    /// Copy of this index restricted to `keep`, in this index's order.
    /// The category universe is preserved.
    pub fn subset(&self, keep: &[DocId]) -> Index {
        let keep: IndexSet<DocId> = keep.iter().copied().collect();
        self.filtered(|id| keep.contains(&id))
    }

    /// Copy of this index without the documents in `drop`.
    pub fn without(&self, drop: &[DocId]) -> Index {
        let drop: IndexSet<DocId> = drop.iter().copied().collect();
        self.filtered(|id| !drop.contains(&id))
    }

    fn filtered<F>(&self, keep: F) -> Index
    where
        F: Fn(DocId) -> bool,
    {
        let mut out = Index {
            categories: self.categories.clone(),
            ..Index::default()
        };
        for (id, doc) in self.documents.iter().filter(|(id, _)| keep(**id)) {
            out.documents.insert(*id, doc.clone());
            out.classification
                .assign(*id, self.classification.categories_of(*id).iter().copied());
            if let Some(primary) = self.classification.primary(*id) {
                out.classification.set_primary(*id, primary);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(name: &str) -> Document {
        Document {
            name: name.to_string(),
            features: SparseVector::from_pairs([(0, 1.0)]),
        }
    }

    #[test]
    fn subset_keeps_categories_and_order() {
        let mut index = Index::new();
        index.add_category(CategoryId(0), "acq");
        index.add_category(CategoryId(1), "earn");
        for i in 0..5 {
            let cats = if i % 2 == 0 { vec![CategoryId(0)] } else { vec![] };
            index.add_document(DocId(i), doc(&format!("d{i}")), &cats);
        }
        let sub = index.subset(&[DocId(4), DocId(1)]);
        assert_eq!(sub.document_ids(), vec![DocId(1), DocId(4)]);
        assert_eq!(sub.category_count(), 2);
        assert!(sub.classification().contains(DocId(4), CategoryId(0)));

        let rest = index.without(&[DocId(0)]);
        assert_eq!(rest.document_count(), 4);
        assert!(rest.document(DocId(0)).is_none());
    }

    #[test]
    fn average_cardinality_counts_true_labels() {
        let mut index = Index::new();
        index.add_document(DocId(0), doc("a"), &[CategoryId(0), CategoryId(1)]);
        index.add_document(DocId(1), doc("b"), &[]);
        assert_eq!(index.average_cardinality(), 1.0);
        assert_eq!(Index::new().average_cardinality(), 0.0);
    }
}
