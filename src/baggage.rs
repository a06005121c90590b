//! User-defined key/value payloads propagated alongside the trace context.
//!
//! [`Baggage`] is an ordered name/value collection that rides along with a
//! [`Context`](crate::Context) and crosses process boundaries through the
//! W3C `baggage` header (see
//! [`BaggagePropagator`](crate::propagation::BaggagePropagator)). The
//! propagation layer treats the values as opaque strings; percent-encoding
//! of reserved characters happens at the wire boundary, not here.

use std::fmt;

/// The context key under which baggage is stored.
pub const BAGGAGE_KEY: &str = "baggage";

/// W3C limit on the number of name/value pairs carried.
const MAX_KEY_VALUE_PAIRS: usize = 64;
/// W3C limit on the total serialized length of all pairs.
const MAX_LEN_OF_ALL_PAIRS: usize = 8192;

/// An ordered collection of user-defined name/value pairs.
///
/// Each name maps to exactly one value; inserting an existing name replaces
/// its value in place. Insertions that would exceed the W3C entry-count or
/// total-length limits are rejected rather than silently truncated.
///
/// # Examples
///
/// ```
/// use context_propagation::baggage::Baggage;
///
/// let mut baggage = Baggage::new();
/// assert!(baggage.insert("user_id", "42"));
/// assert_eq!(baggage.get("user_id"), Some("42"));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Baggage {
    entries: Vec<(String, String)>,
}

impl Baggage {
    /// Creates an empty `Baggage`.
    pub fn new() -> Self {
        Baggage::default()
    }

    /// Returns the value for `name`, if present.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Inserts or replaces an entry.
    ///
    /// Returns `false` and leaves the baggage unchanged when the name is not
    /// a valid baggage name or the insertion would exceed the entry-count or
    /// total-length limits.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        let (name, value) = (name.into(), value.into());
        if !Baggage::valid_name(&name) {
            return false;
        }

        let replaced_len = self
            .get(&name)
            .map(|old| name.len() + old.len() + 1)
            .unwrap_or(0);
        let added_len = name.len() + value.len() + 1;
        if self.serialized_len() - replaced_len + added_len > MAX_LEN_OF_ALL_PAIRS {
            return false;
        }

        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = value,
            None => {
                if self.entries.len() >= MAX_KEY_VALUE_PAIRS {
                    return false;
                }
                self.entries.push((name, value));
            }
        }
        true
    }

    /// Removes the entry for `name`, returning `true` if it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.entries.iter().position(|(k, _)| k == name) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// The number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// A baggage name must be a non-empty US-ASCII token without the
    /// delimiters used on the wire.
    fn valid_name(name: &str) -> bool {
        !name.is_empty()
            && name
                .bytes()
                .all(|b| b.is_ascii_graphic() && !matches!(b, b'=' | b',' | b';' | b'"'))
    }

    /// Length of the raw `name=value,...` serialization of all entries.
    fn serialized_len(&self) -> usize {
        let pairs: usize = self
            .entries
            .iter()
            .map(|(k, v)| k.len() + v.len() + 1)
            .sum();
        pairs + self.entries.len().saturating_sub(1)
    }
}

impl<K, V> FromIterator<(K, V)> for Baggage
where
    K: Into<String>,
    V: Into<String>,
{
    /// Collects entries, dropping any that fail validation or exceed limits.
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut baggage = Baggage::new();
        for (name, value) in iter {
            let _ = baggage.insert(name, value);
        }
        baggage
    }
}

impl fmt::Display for Baggage {
    /// Formats entries as `name1=value1,name2=value2` without wire escaping.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove() {
        let mut baggage = Baggage::new();
        assert!(baggage.insert("user_id", "1"));
        assert!(baggage.insert("session", "abc"));
        assert_eq!(baggage.get("user_id"), Some("1"));
        assert_eq!(baggage.len(), 2);

        // Replacing keeps the original position.
        assert!(baggage.insert("user_id", "2"));
        assert_eq!(baggage.get("user_id"), Some("2"));
        assert_eq!(baggage.to_string(), "user_id=2,session=abc");

        assert!(baggage.remove("user_id"));
        assert!(!baggage.remove("user_id"));
        assert_eq!(baggage.get("user_id"), None);
    }

    #[test]
    fn rejects_invalid_names() {
        let mut baggage = Baggage::new();
        assert!(!baggage.insert("", "v"));
        assert!(!baggage.insert("a=b", "v"));
        assert!(!baggage.insert("a,b", "v"));
        assert!(!baggage.insert("a b", "v"));
        assert!(baggage.is_empty());
    }

    #[test]
    fn enforces_entry_count_limit() {
        let mut baggage = Baggage::new();
        for i in 0..MAX_KEY_VALUE_PAIRS {
            assert!(baggage.insert(format!("key{}", i), "v"));
        }
        assert!(!baggage.insert("one_too_many", "v"));
        assert_eq!(baggage.len(), MAX_KEY_VALUE_PAIRS);

        // Replacement of an existing entry is still allowed at the limit.
        assert!(baggage.insert("key0", "replaced"));
        assert_eq!(baggage.get("key0"), Some("replaced"));
    }

    #[test]
    fn enforces_total_length_limit() {
        let mut baggage = Baggage::new();
        assert!(baggage.insert("big", "x".repeat(MAX_LEN_OF_ALL_PAIRS - "big=".len())));
        assert!(!baggage.insert("more", "y"));
        assert_eq!(baggage.len(), 1);
    }

    #[test]
    fn collects_from_iterator() {
        let baggage: Baggage = [("a", "1"), ("bad key", "2"), ("b", "3")].into_iter().collect();
        assert_eq!(baggage.len(), 2);
        assert_eq!(baggage.to_string(), "a=1,b=3");
    }
}
