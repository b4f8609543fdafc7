//! Prefix tree over route regexes.
//!
//! Routes are added in declaration order with the regex text they will be
//! matched with. Consecutive routes sharing a prefix are grouped under a
//! child collection so the generated alternation only tests that prefix once:
//!
//! ```text
//! /foo/bar      ─┐
//! /foo/baz       ├─>  /foo/ (?: bar | baz ) | /qux
//! /qux          ─┘
//! ```
//!
//! Grouping never changes which route wins. A new route is merged with an
//! older entry only when every entry in between is known to be mutually
//! exclusive with it (different literal static prefixes); otherwise it is
//! appended at the end.
//!
//! The tree is generic over the payload so the dumper can use it both for
//! route records and for host grouping.

/// A child of a [`StaticPrefixCollection`].
#[derive(Debug, Clone)]
pub enum PrefixItem<T> {
    Collection(StaticPrefixCollection<T>),
    Route(T),
}

/// Ordered prefix-sharing collection of routes.
#[derive(Debug, Clone)]
pub struct StaticPrefixCollection<T> {
    prefix: String,
    /// Literal part of each item's prefix, up to the first group.
    static_prefixes: Vec<String>,
    prefixes: Vec<String>,
    items: Vec<PrefixItem<T>>,
}

impl<T> Default for StaticPrefixCollection<T> {
    fn default() -> Self {
        Self::new("/")
    }
}

impl<T> StaticPrefixCollection<T> {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            static_prefixes: Vec::new(),
            prefixes: Vec::new(),
            items: Vec::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn items(&self) -> &[PrefixItem<T>] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add a route whose regex text is `prefix`.
    pub fn add_route(&mut self, prefix: &str, route: T) {
        let (prefix, static_prefix) = self.common_prefix(prefix, prefix);

        for i in (0..self.items.len()).rev() {
            let (common, common_static) = self.common_prefix(&prefix, &self.prefixes[i]);

            if common == self.prefix {
                // No shared prefix with this item. Distinct literal prefixes
                // cannot both match, so older items may still be merged with.
                if self.prefix != static_prefix && self.prefix != self.static_prefixes[i] {
                    continue;
                }
                if self.prefix == static_prefix && self.prefix == self.static_prefixes[i] {
                    break;
                }
                if self.prefixes[i] != self.static_prefixes[i]
                    && self.prefix == self.static_prefixes[i]
                {
                    break;
                }
                if prefix != static_prefix && self.prefix == static_prefix {
                    break;
                }
                continue;
            }

            if self.prefixes[i] == common {
                if let PrefixItem::Collection(child) = &mut self.items[i] {
                    child.add_route(&prefix, route);
                    return;
                }
            }

            // Replace the item in place by a collection holding both.
            let mut child = StaticPrefixCollection::new(common.clone());
            let (existing_prefix, existing_static) =
                child.common_prefix(&self.prefixes[i], &self.prefixes[i]);
            let (new_prefix, new_static) = child.common_prefix(&prefix, &prefix);
            let existing = std::mem::replace(
                &mut self.items[i],
                PrefixItem::Collection(StaticPrefixCollection::new(String::new())),
            );
            child.static_prefixes = vec![existing_static, new_static];
            child.prefixes = vec![existing_prefix, new_prefix];
            child.items = vec![existing, PrefixItem::Route(route)];

            self.static_prefixes[i] = common_static;
            self.prefixes[i] = common;
            self.items[i] = PrefixItem::Collection(child);
            return;
        }

        // No common prefix found, or merging would reorder routes.
        self.static_prefixes.push(static_prefix);
        self.prefixes.push(prefix);
        self.items.push(PrefixItem::Route(route));
    }

    /// Flatten back to routes, in tree order.
    pub fn into_routes(self) -> Vec<T> {
        let mut out = Vec::new();
        self.populate(&mut out);
        out
    }

    fn populate(self, out: &mut Vec<T>) {
        for item in self.items {
            match item {
                PrefixItem::Collection(child) => child.populate(out),
                PrefixItem::Route(route) => out.push(route),
            }
        }
    }

    /// Common prefix of two regexes, and its literal part.
    ///
    /// Comparison starts after this collection's prefix. The result never
    /// ends inside an escape sequence or a UTF-8 character, and a group is
    /// only included when it is identical in both regexes and safe to share
    /// (see [`shareable_group`]).
    fn common_prefix(&self, prefix: &str, another: &str) -> (String, String) {
        let a = prefix.as_bytes();
        let b = another.as_bytes();
        let end = a.len().min(b.len());
        let mut static_len: Option<usize> = None;
        let mut i = self.prefix.len().min(end);

        while i < end && a[i] == b[i] {
            if a[i] == b'(' {
                static_len.get_or_insert(i);
                let mut depth = 1usize;
                let mut j = i + 1;
                while j < end && depth > 0 {
                    if a[j] != b[j] {
                        break;
                    }
                    match a[j] {
                        b'(' => depth += 1,
                        b')' => depth -= 1,
                        b'\\' => {
                            j += 1;
                            if j == end || a[j] != b[j] {
                                break;
                            }
                        }
                        _ => {}
                    }
                    j += 1;
                }
                if depth > 0 {
                    break;
                }
                // A quantifier after the group in only one of them.
                if (a.get(j) == Some(&b'?') || b.get(j) == Some(&b'?')) && a.get(j) != b.get(j) {
                    break;
                }
                if prefix != another && !shareable_group(&a[i..j], a, b, j) {
                    break;
                }
                i = j;
                continue;
            } else if a[i] == b'\\' {
                i += 1;
                if i == end || a[i] != b[i] {
                    i -= 1;
                    break;
                }
            }
            i += 1;
        }

        while !prefix.is_char_boundary(i) {
            i -= 1;
        }
        let static_len = static_len.unwrap_or(i).min(i);

        (prefix[..i].to_string(), prefix[..static_len].to_string())
    }
}

/// Whether `group` can be factored out of two regexes without changing
/// which of them matches first.
///
/// Only `([^…]+)` qualifies, and only when the character that follows it in
/// both regexes is excluded by the class (or the regex ends). The group then
/// has exactly one way to match, whatever comes after it.
fn shareable_group(group: &[u8], a: &[u8], b: &[u8], end: usize) -> bool {
    let Some(class) = group
        .strip_prefix(b"([^")
        .and_then(|rest| rest.strip_suffix(b"]+)"))
    else {
        return false;
    };

    let mut excluded = Vec::new();
    let mut k = 0;
    while k < class.len() {
        match class[k] {
            b'\\' if k + 1 < class.len() && class[k + 1].is_ascii_punctuation() => {
                excluded.push(class[k + 1]);
                k += 2;
            }
            b'\\' | b'[' | b']' | b'-' | b'^' | b'&' | b'~' => return false,
            c if c.is_ascii() => {
                excluded.push(c);
                k += 1;
            }
            _ => return false,
        }
    }

    let follows_excluded = |regex: &[u8]| match regex.get(end) {
        None => true,
        Some(b'\\') => regex
            .get(end + 1)
            .is_some_and(|c| c.is_ascii_punctuation() && excluded.contains(c)),
        Some(c) => !b".()[]|?*+{}^$".contains(c) && excluded.contains(c),
    };

    follows_excluded(a) && follows_excluded(b)
}
