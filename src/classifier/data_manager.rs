use std::{
    fs::{self, File},
    io::{BufReader, BufWriter},
    marker::PhantomData,
    path::Path,
};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Error, Result};

/// Persists classifier models inside a storage directory.
pub trait ClassifierDataManager<C> {
    fn write(&self, dir: &Path, classifier: &C) -> Result<()>;
    fn read(&self, dir: &Path) -> Result<C>;
}

/// Stores any serde model as `classifier.cbor`.
#[derive(Debug)]
pub struct CborDataManager<C> {
    file_name: String,
    _marker: PhantomData<fn() -> C>,
}

impl<C> CborDataManager<C> {
    pub fn new() -> Self {
        Self::with_file_name("classifier.cbor")
    }

    pub fn with_file_name(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            _marker: PhantomData,
        }
    }
}

impl<C> Default for CborDataManager<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> ClassifierDataManager<C> for CborDataManager<C>
where
    C: Serialize + DeserializeOwned,
{
    fn write(&self, dir: &Path, classifier: &C) -> Result<()> {
        fs::create_dir_all(dir)?;
        let file = File::create(dir.join(&self.file_name))?;
        serde_cbor::to_writer(BufWriter::new(file), classifier)?;
        Ok(())
    }

    fn read(&self, dir: &Path) -> Result<C> {
        let path = dir.join(&self.file_name);
        let file = File::open(&path).map_err(|e| Error::resource("classifier model", &path, e))?;
        serde_cbor::from_reader(BufReader::new(file))
            .map_err(|e| Error::resource("classifier model", path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classifier::{CentroidClassifier, CentroidLearner, Classifier, Learner},
        index::{CategoryId, DocId, Document, Index},
        utils::math::vector::SparseVector,
    };

    #[test]
    fn model_survives_storage() {
        let mut index = Index::new();
        index.add_document(
            DocId(0),
            Document { name: "a".into(), features: SparseVector::from_pairs([(0, 1.0)]) },
            &[CategoryId(0)],
        );
        index.add_document(
            DocId(1),
            Document { name: "b".into(), features: SparseVector::from_pairs([(1, 1.0)]) },
            &[],
        );
        let model = CentroidLearner::default().build(&index).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let dm = CborDataManager::<CentroidClassifier>::new();
        dm.write(dir.path(), &model).unwrap();
        let back = dm.read(dir.path()).unwrap();

        let probe = index.document(DocId(0)).unwrap();
        assert_eq!(back.score(probe, CategoryId(0)), model.score(probe, CategoryId(0)));
    }

    #[test]
    fn corrupt_model_names_the_resource() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("classifier.cbor"), b"not cbor").unwrap();
        let err = CborDataManager::<CentroidClassifier>::new().read(dir.path()).unwrap_err();
        assert!(err.to_string().contains("classifier model"));
    }
}
