use std::fmt::{Display, Formatter};

/// Per-call modifier of a streaming read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadOption {
    /// Yield keys only; values are neither fetched nor decompressed.
    KeyOnly,
}

impl ReadOption {
    pub fn apply(&self, options: &mut ReadOptions) {
        match self {
            ReadOption::KeyOnly => options.key_only = true,
        }
    }
}

/// Resolved read options of one streaming call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    pub key_only: bool,
}

impl ReadOptions {
    /// Applies each option in order over the defaults.
    pub fn from_options(options: &[ReadOption]) -> ReadOptions {
        let mut resolved = ReadOptions::default();
        for option in options {
            option.apply(&mut resolved);
        }
        resolved
    }
}

impl Display for ReadOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "key_only={}", self.key_only)
    }
}

/// An optional store behaviour a backend may or may not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// The store can persist empty values.
    EmptyValue,
}

/// Decorator applied to a freshly opened store.
///
/// Options are matched against the store's advertised capabilities; an option
/// the store does not support is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOption {
    /// Allow `put` with an empty value on stores that otherwise reject it.
    EmptyValue,
}

impl StoreOption {
    pub fn capability(&self) -> Capability {
        match self {
            StoreOption::EmptyValue => Capability::EmptyValue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_read_options() {
        let options = ReadOptions::from_options(&[]);
        assert!(!options.key_only);
        assert_eq!(options.to_string(), "key_only=false");
    }

    #[test]
    fn key_only_option_applies() {
        let options = ReadOptions::from_options(&[ReadOption::KeyOnly]);
        assert!(options.key_only);
    }

    #[test]
    fn repeated_options_are_idempotent() {
        let options = ReadOptions::from_options(&[ReadOption::KeyOnly, ReadOption::KeyOnly]);
        assert_eq!(options, ReadOptions { key_only: true });
    }

    #[test]
    fn store_option_maps_to_capability() {
        assert_eq!(StoreOption::EmptyValue.capability(), Capability::EmptyValue);
    }
}
