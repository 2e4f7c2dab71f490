//! Domain records and the scopes that narrow them.

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Upcast to [`Any`] so `dyn Record` can be downcast to its concrete type.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A domain record held by a record store.
pub trait Record: AsAny + Send + Sync + fmt::Debug + 'static {
    /// Primary key of the record in its store.
    fn record_id(&self) -> String;

    /// Default document body for the record.
    fn document(&self) -> Result<Value, serde_json::Error>;
}

impl<'a> dyn Record + 'a {
    /// Borrow the record as its concrete type.
    pub fn downcast_ref<T: Record>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn is<T: Record>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// Shared handle to a record of any type.
pub type RecordRef = Arc<dyn Record>;

pub type Predicate = Arc<dyn Fn(&dyn Record) -> bool + Send + Sync>;
pub type Comparator = Arc<dyn Fn(&dyn Record, &dyn Record) -> Ordering + Send + Sync>;

/// Narrowing and ordering applied to a store query.
///
/// An explicit order is a caller-declared override: result resolution will
/// not silently re-sort records fetched under it.
#[derive(Clone, Default)]
pub struct Scope {
    predicate: Option<Predicate>,
    order: Option<Comparator>,
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("filtered", &self.predicate.is_some())
            .field("ordered", &self.order.is_some())
            .finish()
    }
}

impl Scope {
    /// Every record, in store order.
    pub fn all() -> Self {
        Self::default()
    }

    /// Keep only records matching `predicate`. Combines with an existing filter.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&dyn Record) -> bool + Send + Sync + 'static,
    {
        let combined: Predicate = match self.predicate.take() {
            Some(existing) => Arc::new(move |record: &dyn Record| {
                existing(record) && predicate(record)
            }),
            None => Arc::new(predicate),
        };
        self.predicate = Some(combined);
        self
    }

    /// Typed [`Scope::filter`]; records of other types never match.
    pub fn filter_as<T, F>(self, predicate: F) -> Self
    where
        T: Record,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.filter(move |record: &dyn Record| {
            record.downcast_ref::<T>().map_or(false, &predicate)
        })
    }

    /// Impose an explicit order.
    pub fn order_by<F>(mut self, comparator: F) -> Self
    where
        F: Fn(&dyn Record, &dyn Record) -> Ordering + Send + Sync + 'static,
    {
        self.order = Some(Arc::new(comparator));
        self
    }

    pub fn matches(&self, record: &dyn Record) -> bool {
        self.predicate
            .as_ref()
            .map_or(true, |predicate| predicate(record))
    }

    pub fn has_order(&self) -> bool {
        self.order.is_some()
    }

    /// Sort records by the explicit order, if any. Stable.
    pub fn sort(&self, records: &mut [RecordRef]) {
        if let Some(order) = &self.order {
            records.sort_by(|a, b| order(a.as_ref(), b.as_ref()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{article, comment, Article};

    #[test]
    fn test_downcast() {
        let record: RecordRef = Arc::new(article(1, "Hello"));
        assert!(record.is::<Article>());
        assert_eq!(record.downcast_ref::<Article>().unwrap().title, "Hello");

        let other: RecordRef = Arc::new(comment(1, "Nice"));
        assert!(other.downcast_ref::<Article>().is_none());
    }

    #[test]
    fn test_filters_combine() {
        let scope = Scope::all()
            .filter_as::<Article, _>(|a| a.title.starts_with('H'))
            .filter(|record| record.record_id() != "00002");

        assert!(scope.matches(&article(1, "Hello")));
        assert!(!scope.matches(&article(2, "Hi")));
        assert!(!scope.matches(&article(3, "Bye")));
        assert!(!scope.matches(&comment(4, "Hey")));
    }

    #[test]
    fn test_sort_by_explicit_order() {
        let scope = Scope::all().order_by(|a, b| b.record_id().cmp(&a.record_id()));
        let mut records: Vec<RecordRef> = vec![
            Arc::new(article(1, "a")),
            Arc::new(article(3, "c")),
            Arc::new(article(2, "b")),
        ];
        scope.sort(&mut records);

        let ids: Vec<String> = records.iter().map(|r| r.record_id()).collect();
        assert_eq!(ids, vec!["00003", "00002", "00001"]);
        assert!(scope.has_order());
        assert!(!Scope::all().has_order());
    }
}
