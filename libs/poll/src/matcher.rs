//! Predicates over probed values.

use std::fmt::Debug;

/// A predicate over an observed value.
pub trait Matcher<T: ?Sized> {
    /// Returns true if the value satisfies the predicate.
    fn matches(&self, actual: &T) -> bool;

    /// Human-readable description of what is expected.
    fn describe(&self) -> String;
}

/// Order-insensitive multiset equality.
#[derive(Debug, Clone)]
pub struct ConsistOf<T> {
    expected: Vec<T>,
}

/// Matches a collection holding exactly `expected`, in any order.
pub fn consist_of<T, I>(expected: I) -> ConsistOf<T>
where
    I: IntoIterator<Item = T>,
{
    ConsistOf {
        expected: expected.into_iter().collect(),
    }
}

impl<T: PartialEq + Debug> Matcher<Vec<T>> for ConsistOf<T> {
    fn matches(&self, actual: &Vec<T>) -> bool {
        if actual.len() != self.expected.len() {
            return false;
        }

        let mut remaining: Vec<&T> = self.expected.iter().collect();
        for item in actual {
            match remaining.iter().position(|e| *e == item) {
                Some(idx) => {
                    remaining.swap_remove(idx);
                }
                None => return false,
            }
        }
        remaining.is_empty()
    }

    fn describe(&self) -> String {
        format!("to consist of {:?}", self.expected)
    }
}

/// Matches an empty collection.
#[derive(Debug, Clone, Copy, Default)]
pub struct BeEmpty;

/// Matches an empty collection.
pub fn be_empty() -> BeEmpty {
    BeEmpty
}

impl<T> Matcher<Vec<T>> for BeEmpty {
    fn matches(&self, actual: &Vec<T>) -> bool {
        actual.is_empty()
    }

    fn describe(&self) -> String {
        "to be empty".to_string()
    }
}

/// Plain equality.
#[derive(Debug, Clone)]
pub struct Equal<T> {
    expected: T,
}

/// Matches a value equal to `expected`.
pub fn equal<T>(expected: T) -> Equal<T> {
    Equal { expected }
}

impl<T: PartialEq + Debug> Matcher<T> for Equal<T> {
    fn matches(&self, actual: &T) -> bool {
        *actual == self.expected
    }

    fn describe(&self) -> String {
        format!("to equal {:?}", self.expected)
    }
}

impl<T, F> Matcher<T> for F
where
    F: Fn(&T) -> bool,
{
    fn matches(&self, actual: &T) -> bool {
        self(actual)
    }

    fn describe(&self) -> String {
        "to satisfy predicate".to_string()
    }
}
