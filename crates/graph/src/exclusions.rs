//! Per-language exclusion registry.
//!
//! A candidate edge target whose simple name is registered for the source
//! file's language is dropped: primitives and the common standard-library
//! types every file uses carry no structural information.
//!
//! | language | registered |
//! |---|---|
//! | java | primitives, boxed primitives, `String`/`Object`, `java.lang` exceptions, collections, `Optional`, streams, functional interfaces, common `java.time`/`java.math` values |
//! | rust | primitive scalars, `str`/`String`, `Self`, std smart pointers and collections, `Option`/`Result`, `Fn*`, std marker and formatting traits |
//! | python | builtins, `typing` generics, base exceptions |
//! | javascript | primitives, global constructors, `Promise`, built-in collections |
//! | typescript | javascript set plus `any`/`unknown`/`never` and utility types |
//!
//! Files whose language cannot be determined are checked against the union.

use context_parser::Language;
use std::collections::{BTreeMap, BTreeSet};

const JAVA: &[&str] = &[
    "byte", "short", "int", "long", "float", "double", "boolean", "char", "void", "var",
    "Byte", "Short", "Integer", "Long", "Float", "Double", "Boolean", "Character", "Void",
    "String", "Object", "CharSequence", "Number", "StringBuilder", "Class", "Enum", "Record",
    "Thread", "Runnable", "Iterable", "Comparable", "AutoCloseable", "Cloneable",
    "Exception", "RuntimeException", "Throwable", "Error", "IOException",
    "IllegalArgumentException", "IllegalStateException", "NullPointerException",
    "UnsupportedOperationException", "InterruptedException",
    "Collection", "List", "ArrayList", "LinkedList", "Map", "HashMap", "LinkedHashMap",
    "TreeMap", "Set", "HashSet", "LinkedHashSet", "TreeSet", "Queue", "Deque", "ArrayDeque",
    "Iterator", "Optional", "Stream", "Collectors", "Arrays", "Collections", "Objects",
    "Function", "BiFunction", "Supplier", "Consumer", "BiConsumer", "Predicate", "Callable",
    "Future", "CompletableFuture", "BigDecimal", "BigInteger", "UUID", "LocalDate",
    "LocalDateTime", "Instant", "Duration", "Override", "Deprecated", "FunctionalInterface",
    "SuppressWarnings", "System", "Math",
];

const RUST: &[&str] = &[
    "i8", "i16", "i32", "i64", "i128", "isize", "u8", "u16", "u32", "u64", "u128", "usize",
    "f32", "f64", "bool", "char", "str", "String", "Self", "self", "Vec", "VecDeque",
    "Option", "Result", "Box", "Rc", "Arc", "Weak", "Cell", "RefCell", "Mutex", "RwLock",
    "HashMap", "HashSet", "BTreeMap", "BTreeSet", "BinaryHeap", "Cow", "Path", "PathBuf",
    "OsStr", "OsString", "Duration", "Instant", "SystemTime", "PhantomData", "Pin", "Future",
    "Fn", "FnMut", "FnOnce", "Send", "Sync", "Sized", "Unpin", "Copy", "Clone", "Debug",
    "Display", "Default", "PartialEq", "Eq", "PartialOrd", "Ord", "Hash", "Iterator",
    "IntoIterator", "From", "Into", "TryFrom", "TryInto", "AsRef", "AsMut", "Deref",
    "DerefMut", "Drop", "ToString", "Formatter", "Ordering", "Range",
];

const PYTHON: &[&str] = &[
    "int", "float", "complex", "bool", "str", "bytes", "bytearray", "None", "NoneType",
    "object", "list", "dict", "set", "frozenset", "tuple", "type", "range", "self", "cls",
    "Any", "Optional", "Union", "List", "Dict", "Set", "FrozenSet", "Tuple", "Type",
    "Callable", "Iterable", "Iterator", "Sequence", "Mapping", "MutableMapping",
    "MutableSequence", "Generator", "AsyncIterator", "AsyncGenerator", "Awaitable",
    "Coroutine", "Literal", "Final", "ClassVar", "Self", "TypeVar", "Generic", "Protocol",
    "Annotated", "Exception", "BaseException", "ValueError", "TypeError", "KeyError",
    "RuntimeError", "NotImplementedError",
];

const JAVASCRIPT: &[&str] = &[
    "number", "string", "boolean", "bigint", "symbol", "undefined", "null", "void", "object",
    "this", "Object", "String", "Number", "Boolean", "BigInt", "Symbol", "Array", "Map",
    "Set", "WeakMap", "WeakSet", "Promise", "Date", "RegExp", "Error", "TypeError",
    "RangeError", "Function", "JSON", "Math", "console", "Iterable", "Iterator",
];

const TYPESCRIPT_ONLY: &[&str] = &[
    "any", "unknown", "never", "Record", "Partial", "Required", "Readonly", "ReadonlyArray",
    "Pick", "Omit", "Exclude", "Extract", "NonNullable", "ReturnType", "Parameters",
    "InstanceType", "Awaited", "PromiseLike", "ArrayLike",
];

/// Registry of excluded type names, keyed by language
#[derive(Debug, Clone)]
pub struct ExclusionRegistry {
    by_language: BTreeMap<Language, BTreeSet<String>>,
    union: BTreeSet<String>,
}

impl ExclusionRegistry {
    /// The built-in registry documented at module level
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.extend(Language::Java, JAVA.iter().copied());
        registry.extend(Language::Rust, RUST.iter().copied());
        registry.extend(Language::Python, PYTHON.iter().copied());
        registry.extend(Language::JavaScript, JAVASCRIPT.iter().copied());
        registry.extend(Language::TypeScript, JAVASCRIPT.iter().copied());
        registry.extend(Language::TypeScript, TYPESCRIPT_ONLY.iter().copied());
        registry
    }

    pub fn empty() -> Self {
        Self {
            by_language: BTreeMap::new(),
            union: BTreeSet::new(),
        }
    }

    /// Register more names for a language
    pub fn extend<'a>(&mut self, language: Language, names: impl IntoIterator<Item = &'a str>) {
        let entry = self.by_language.entry(language).or_default();
        for name in names {
            entry.insert(name.to_string());
            self.union.insert(name.to_string());
        }
    }

    /// Whether `name` is excluded for `language` (`None` checks the union)
    pub fn is_excluded(&self, language: Option<Language>, name: &str) -> bool {
        match language {
            Some(language) => self
                .by_language
                .get(&language)
                .is_some_and(|names| names.contains(name)),
            None => self.union.contains(name),
        }
    }

    pub fn names(&self, language: Language) -> impl Iterator<Item = &str> {
        self.by_language
            .get(&language)
            .into_iter()
            .flat_map(|names| names.iter().map(String::as_str))
    }
}

impl Default for ExclusionRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn java_primitives_and_string_are_excluded() {
        let registry = ExclusionRegistry::standard();
        for name in ["int", "String", "boolean"] {
            assert!(registry.is_excluded(Some(Language::Java), name), "{name}");
        }
        assert!(!registry.is_excluded(Some(Language::Java), "CustomReturnType"));
        assert!(!registry.is_excluded(Some(Language::Java), "CustomException"));
    }

    #[test]
    fn exclusions_are_per_language() {
        let registry = ExclusionRegistry::standard();
        assert!(registry.is_excluded(Some(Language::Rust), "Vec"));
        assert!(!registry.is_excluded(Some(Language::Java), "Vec"));
        assert!(registry.is_excluded(Some(Language::TypeScript), "Promise"));
        assert!(registry.is_excluded(None, "Vec"));
    }

    #[test]
    fn registry_can_be_extended() {
        let mut registry = ExclusionRegistry::empty();
        registry.extend(Language::Python, ["DataFrame"]);
        assert!(registry.is_excluded(Some(Language::Python), "DataFrame"));
        assert_eq!(registry.names(Language::Python).count(), 1);
    }
}
