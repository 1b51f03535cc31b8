use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use crate::index::{CategoryId, DocId};

/// Document ↔ category relation, queryable in both directions.
///
/// A document may carry zero or more categories and optionally one primary
/// category. A document with no categories is still part of the relation's
/// document universe once it has been assigned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    by_doc: IndexMap<DocId, Vec<CategoryId>>,
    by_cat: IndexMap<CategoryId, IndexSet<DocId>>,
    primary: IndexMap<DocId, CategoryId>,
}

impl Classification {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add categories to `doc`, registering the document even when
    /// `categories` is empty.
    pub fn assign<I>(&mut self, doc: DocId, categories: I)
    where
        I: IntoIterator<Item = CategoryId>,
    {
        let cats = self.by_doc.entry(doc).or_default();
        for cat in categories {
            if !cats.contains(&cat) {
                cats.push(cat);
                self.by_cat.entry(cat).or_default().insert(doc);
            }
        }
    }

    pub fn set_primary(&mut self, doc: DocId, cat: CategoryId) {
        self.assign(doc, [cat]);
        self.primary.insert(doc, cat);
    }

    pub fn primary(&self, doc: DocId) -> Option<CategoryId> {
        self.primary.get(&doc).copied()
    }

    pub fn contains(&self, doc: DocId, cat: CategoryId) -> bool {
        self.by_doc.get(&doc).is_some_and(|cats| cats.contains(&cat))
    }

    /// Categories of `doc`, empty when the document is unknown.
    pub fn categories_of(&self, doc: DocId) -> &[CategoryId] {
        self.by_doc.get(&doc).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Documents labelled with `cat`, in assignment order.
    pub fn documents_of(&self, cat: CategoryId) -> impl Iterator<Item = DocId> + '_ {
        self.by_cat.get(&cat).into_iter().flat_map(|set| set.iter().copied())
    }

    pub fn count_of(&self, cat: CategoryId) -> usize {
        self.by_cat.get(&cat).map_or(0, IndexSet::len)
    }

    pub fn document_ids(&self) -> impl Iterator<Item = DocId> + '_ {
        self.by_doc.keys().copied()
    }

    pub fn document_count(&self) -> usize {
        self.by_doc.len()
    }

    /// Merge another relation over disjoint documents into this one.
    pub fn extend(&mut self, other: &Classification) {
        for (doc, cats) in &other.by_doc {
            self.assign(*doc, cats.iter().copied());
        }
        for (doc, cat) in &other.primary {
            self.primary.insert(*doc, *cat);
        }
    }
}
