use std::{fs::File, io::BufReader, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    index::{CategoryId, DocId, Document, Index},
    utils::math::vector::SparseVector,
};

/// Flat, serializable form of an [`Index`].
///
/// Category and document ids are their positions in the respective lists.
/// Use `into_index` to build the queryable structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexData {
    pub categories: Vec<String>,
    pub documents: Vec<DocumentData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentData {
    pub name: String,
    /// (feature id, weight) pairs in any order
    pub features: Vec<(u32, f64)>,
    /// positions in `IndexData::categories`
    #[serde(default)]
    pub labels: Vec<u32>,
}

impl IndexData {
    pub fn into_index(self) -> Result<Index> {
        let mut index = Index::new();
        for (i, name) in self.categories.into_iter().enumerate() {
            index.add_category(CategoryId(i as u32), name);
        }
        let n_cats = index.category_count() as u32;
        for (i, doc) in self.documents.into_iter().enumerate() {
            if let Some(bad) = doc.labels.iter().find(|l| **l >= n_cats) {
                return Err(Error::UnknownCategory(*bad));
            }
            let labels: Vec<CategoryId> = doc.labels.iter().map(|l| CategoryId(*l)).collect();
            index.add_document(
                DocId(i as u32),
                Document {
                    name: doc.name,
                    features: SparseVector::from_pairs(doc.features),
                },
                &labels,
            );
        }
        Ok(index)
    }

    /// Read a JSON index file.
    pub fn load(path: &Path) -> Result<Index> {
        let file = File::open(path)?;
        let data: IndexData = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::resource("index file", path, e))?;
        data.into_index()
    }
}

impl From<&Index> for IndexData {
    fn from(index: &Index) -> Self {
        let cat_ids = index.category_ids();
        let position = |c: CategoryId| cat_ids.iter().position(|x| *x == c).map(|p| p as u32);
        IndexData {
            categories: cat_ids
                .iter()
                .map(|c| index.category_name(*c).unwrap_or_default().to_string())
                .collect(),
            documents: index
                .documents()
                .map(|(id, doc)| DocumentData {
                    name: doc.name.clone(),
                    features: doc.features.iter().collect(),
                    labels: index
                        .classification()
                        .categories_of(id)
                        .iter()
                        .filter_map(|c| position(*c))
                        .collect(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_index_loads_with_positional_ids() {
        let json = r#"{
            "categories": ["sport", "politics"],
            "documents": [
                {"name": "a", "features": [[2, 1.0], [0, 0.5]], "labels": [1]},
                {"name": "b", "features": [[1, 1.0]]}
            ]
        }"#;
        let data: IndexData = serde_json::from_str(json).unwrap();
        let index = data.into_index().unwrap();
        assert_eq!(index.category_name(CategoryId(1)), Some("politics"));
        assert!(index.classification().contains(DocId(0), CategoryId(1)));
        assert!(index.classification().categories_of(DocId(1)).is_empty());
        assert_eq!(index.document(DocId(0)).unwrap().features.get(2), 1.0);
    }

    #[test]
    fn out_of_range_label_is_rejected() {
        let data = IndexData {
            categories: vec!["x".into()],
            documents: vec![DocumentData {
                name: "a".into(),
                features: vec![],
                labels: vec![3],
            }],
        };
        assert!(matches!(data.into_index(), Err(Error::UnknownCategory(3))));
    }
}
