use std::collections::HashMap;
use std::sync::Arc;

use ontology::ClassificationPath;
use parking_lot::RwLock;

use super::{
    BooleanClassifier, ColumnClassifier, DescriptiveClassifier, EnumClassifier,
    IdentifierClassifier, NumericClassifier, TimestampClassifier,
};

/// Thread-safe cache holding one classifier per path.
///
/// Lookups take the read lock; the first lookup of a path takes the write
/// lock and creates the classifier, so concurrent callers always share a
/// single instance.
#[derive(Default)]
pub struct ClassifierRegistry {
    classifiers: RwLock<HashMap<ClassificationPath, Arc<dyn ColumnClassifier>>>,
}

impl ClassifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every path already populated.
    pub fn preloaded() -> Self {
        let registry = Self::new();
        for path in ClassificationPath::ALL {
            registry.get(path);
        }
        registry
    }

    /// The cached classifier for `path`, created on first use.
    pub fn get(&self, path: ClassificationPath) -> Arc<dyn ColumnClassifier> {
        if let Some(classifier) = self.classifiers.read().get(&path) {
            return Arc::clone(classifier);
        }
        let mut classifiers = self.classifiers.write();
        Arc::clone(classifiers.entry(path).or_insert_with(|| create(path)))
    }

    /// Number of paths with a cached classifier.
    pub fn len(&self) -> usize {
        self.classifiers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn create(path: ClassificationPath) -> Arc<dyn ColumnClassifier> {
    match path {
        ClassificationPath::Timestamp => Arc::new(TimestampClassifier),
        ClassificationPath::Boolean => Arc::new(BooleanClassifier),
        ClassificationPath::Uuid | ClassificationPath::ExternalId => {
            Arc::new(IdentifierClassifier::new(path))
        }
        ClassificationPath::Numeric => Arc::new(NumericClassifier),
        ClassificationPath::Enum => Arc::new(EnumClassifier),
        ClassificationPath::Text | ClassificationPath::Json | ClassificationPath::Unknown => {
            Arc::new(DescriptiveClassifier::new(path))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_returns_shared_instance() {
        let registry = ClassifierRegistry::new();
        assert!(registry.is_empty());
        let first = registry.get(ClassificationPath::Enum);
        let second = registry.get(ClassificationPath::Enum);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_each_classifier_reports_its_path() {
        let registry = ClassifierRegistry::preloaded();
        assert_eq!(registry.len(), ClassificationPath::ALL.len());
        for path in ClassificationPath::ALL {
            assert_eq!(registry.get(path).path(), path);
        }
    }

    #[test]
    fn test_concurrent_lookups_share_one_instance() {
        let registry = Arc::new(ClassifierRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.get(ClassificationPath::Numeric))
            })
            .collect();
        let instances: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
