//! W3C `baggage` header propagator.

use crate::baggage::Baggage;
use crate::otel_warn;
use crate::propagation::{text_map_propagator::FieldIter, Extractor, Injector, TextMapPropagator};
use crate::Context;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::sync::OnceLock;

static BAGGAGE_HEADER: &str = "baggage";

/// Characters percent-encoded on the wire: controls plus the header's own
/// delimiters.
const FRAGMENT: &AsciiSet = &CONTROLS.add(b' ').add(b'"').add(b';').add(b',').add(b'=');

static BAGGAGE_FIELDS: OnceLock<[String; 1]> = OnceLock::new();

fn baggage_fields() -> &'static [String; 1] {
    BAGGAGE_FIELDS.get_or_init(|| [BAGGAGE_HEADER.to_owned()])
}

/// Propagates name/value pairs in [W3C Baggage] format.
///
/// On injection, names and values are percent-encoded so the header's
/// delimiter characters survive arbitrary payloads. On extraction each
/// comma-separated list member is decoded independently; a malformed member
/// is logged and skipped without affecting its neighbors. A member whose
/// decoded name is not a valid baggage name (for example one containing a
/// space) is likewise dropped. Optional semicolon-separated properties on a
/// member are accepted and discarded.
///
/// # Examples
///
/// ```
/// use context_propagation::propagation::{BaggagePropagator, TextMapPropagator};
/// use std::collections::HashMap;
///
/// let mut headers = HashMap::new();
/// headers.insert("baggage".to_string(), "user_id=1,server_node=DF%2028".to_string());
///
/// let propagator = BaggagePropagator::new();
/// let cx = propagator.extract(&headers);
///
/// let baggage = cx.baggage().expect("baggage was extracted");
/// assert_eq!(baggage.get("server_node"), Some("DF 28"));
/// ```
///
/// [W3C Baggage]: https://w3c.github.io/baggage
#[derive(Debug, Default)]
pub struct BaggagePropagator {
    _private: (),
}

impl BaggagePropagator {
    /// Construct a new baggage propagator.
    pub fn new() -> Self {
        BaggagePropagator { _private: () }
    }
}

impl TextMapPropagator for BaggagePropagator {
    /// Serializes the context's baggage into the `baggage` header. An absent
    /// or empty baggage writes nothing.
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        if let Some(baggage) = cx.baggage().filter(|b| !b.is_empty()) {
            let header_value = baggage
                .iter()
                .map(|(name, value)| {
                    format!(
                        "{}={}",
                        utf8_percent_encode(name.trim(), FRAGMENT),
                        utf8_percent_encode(value.trim(), FRAGMENT)
                    )
                })
                .collect::<Vec<String>>()
                .join(",");
            injector.set(BAGGAGE_HEADER, header_value);
        }
    }

    /// Parses the `baggage` header into the context's baggage slot. A missing
    /// header leaves the context untouched; malformed members are dropped.
    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        if let Some(header_value) = extractor.get(BAGGAGE_HEADER) {
            let baggage: Baggage = header_value
                .split(',')
                .filter_map(|member| {
                    // Properties after the first `;` are legal but unused.
                    let name_and_value = member.split(';').next().unwrap_or(member);
                    let Some((name, value)) = name_and_value.split_once('=') else {
                        otel_warn!(
                            name: "BaggagePropagator.Extract.InvalidKeyValueFormat",
                            member = member,
                        );
                        return None;
                    };

                    let decoded_name = percent_decode_str(name.trim()).decode_utf8();
                    let decoded_value = percent_decode_str(value.trim()).decode_utf8();
                    match (decoded_name, decoded_value) {
                        (Ok(name), Ok(value)) => {
                            Some((name.trim().to_string(), value.trim().to_string()))
                        }
                        _ => {
                            otel_warn!(
                                name: "BaggagePropagator.Extract.InvalidUtf8",
                                member = member,
                            );
                            None
                        }
                    }
                })
                .collect();
            cx.with_baggage(baggage)
        } else {
            cx.clone()
        }
    }

    fn fields(&self) -> FieldIter<'_> {
        FieldIter::new(baggage_fields())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn extract(header_value: &str) -> Baggage {
        let mut extractor: HashMap<String, String> = HashMap::new();
        extractor.insert(BAGGAGE_HEADER.to_string(), header_value.to_string());
        BaggagePropagator::new()
            .extract_with_context(&Context::new(), &extractor)
            .baggage()
            .map(|b| (*b).clone())
            .unwrap_or_default()
    }

    #[rustfmt::skip]
    fn valid_extract_data() -> Vec<(&'static str, Vec<(&'static str, &'static str)>)> {
        vec![
            ("key1=val1,key2=val2", vec![("key1", "val1"), ("key2", "val2")]),
            ("key1 =   val1,  key2 =val2   ", vec![("key1", "val1"), ("key2", "val2")]),
            ("key1=val1,key2=val2%2Cval3", vec![("key1", "val1"), ("key2", "val2,val3")]),
            // An invalid member does not take its neighbors down with it.
            ("key1=val1,key2=val2,a,val3", vec![("key1", "val1"), ("key2", "val2")]),
            ("key1=,key2=val2", vec![("key1", ""), ("key2", "val2")]),
            // Properties are accepted and discarded.
            ("key1=val1;prop=1,key2=val2", vec![("key1", "val1"), ("key2", "val2")]),
            ("key1=val%201", vec![("key1", "val 1")]),
        ]
    }

    #[test]
    fn extract_baggage() {
        for (header_value, expected) in valid_extract_data() {
            let baggage = extract(header_value);
            assert_eq!(baggage.len(), expected.len(), "{}", header_value);
            for (name, value) in expected {
                assert_eq!(baggage.get(name), Some(value), "{}", header_value);
            }
        }
    }

    #[test]
    fn extract_baggage_missing_header() {
        let extractor: HashMap<String, String> = HashMap::new();
        let cx = BaggagePropagator::new().extract_with_context(&Context::new(), &extractor);
        assert!(cx.baggage().is_none());
    }

    #[test]
    fn extract_baggage_drops_non_token_names() {
        // A decoded name must still be a valid baggage name; "key 1" is not.
        let baggage = extract("key%201=val1,key2=val2");
        assert_eq!(baggage.len(), 1);
        assert_eq!(baggage.get("key 1"), None);
        assert_eq!(baggage.get("key2"), Some("val2"));
    }

    #[test]
    fn extract_baggage_tolerates_garbage() {
        for header in ["", "   ", "=", ",,,", "key=%80"] {
            assert!(extract(header).is_empty(), "{:?}", header);
        }
    }

    #[rustfmt::skip]
    fn valid_inject_data() -> Vec<(Vec<(&'static str, &'static str)>, &'static str)> {
        vec![
            (vec![("key1", "val1"), ("key2", "val2")], "key1=val1,key2=val2"),
            // Delimiters in values are escaped.
            (vec![("key1", "val1,val2"), ("key2", "val3=4")], "key1=val1%2Cval2,key2=val3%3D4"),
            (vec![("key1", "val 1")], "key1=val%201"),
        ]
    }

    #[test]
    fn inject_baggage() {
        let propagator = BaggagePropagator::new();
        for (entries, expected) in valid_inject_data() {
            let baggage: Baggage = entries.into_iter().collect();
            let mut injector = HashMap::new();
            propagator.inject_context(&Context::new().with_baggage(baggage), &mut injector);
            assert_eq!(
                Extractor::get(&injector, BAGGAGE_HEADER).as_deref(),
                Some(expected)
            );
        }
    }

    #[test]
    fn inject_baggage_empty_writes_nothing() {
        let propagator = BaggagePropagator::new();
        let mut injector: HashMap<String, String> = HashMap::new();

        propagator.inject_context(&Context::new(), &mut injector);
        assert!(injector.is_empty());

        propagator.inject_context(&Context::new().with_baggage(Baggage::new()), &mut injector);
        assert!(injector.is_empty());
    }

    #[test]
    fn round_trip_baggage() {
        let propagator = BaggagePropagator::new();
        let baggage: Baggage = [("user_id", "1"), ("server_node", "DF 28")].into_iter().collect();

        let mut carrier = HashMap::new();
        propagator.inject_context(&Context::new().with_baggage(baggage.clone()), &mut carrier);
        let recovered = propagator
            .extract_with_context(&Context::new(), &carrier)
            .baggage()
            .map(|b| (*b).clone());

        assert_eq!(recovered, Some(baggage));
    }

    #[test]
    fn fields_lists_baggage_header() {
        let propagator = BaggagePropagator::new();
        let fields: Vec<&str> = propagator.fields().collect();
        assert_eq!(fields, vec![BAGGAGE_HEADER]);
    }
}
