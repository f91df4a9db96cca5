//! Built-in splitters

use crate::component::{ComponentError, ComponentResult, Params, Splitter};

/// Splits on '.', trims pieces and drops empty ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeriodSplitter;

impl Splitter for PeriodSplitter {
    fn split(&self, text: &str) -> Vec<String> {
        text.split('.')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }
}

/// Fixed-size character windows with optional overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedSizeSplitter {
    chunk_size: usize,
    overlap: usize,
}

impl FixedSizeSplitter {
    /// Default window size in characters.
    pub const DEFAULT_CHUNK_SIZE: usize = 512;

    /// Windows of `chunk_size` characters, consecutive windows sharing `overlap`.
    ///
    /// # Errors
    ///
    /// Returns a fatal error if `chunk_size` is zero or `overlap >= chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> ComponentResult<Self> {
        if chunk_size == 0 {
            return Err(ComponentError::fatal("chunk_size must be at least 1"));
        }
        if overlap >= chunk_size {
            return Err(ComponentError::fatal(format!(
                "overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    /// Build from bound parameters `chunk_size` and `overlap`.
    ///
    /// # Errors
    ///
    /// Returns a fatal error for invalid bounds.
    pub fn from_params(params: &Params) -> ComponentResult<Self> {
        let read = |key: &str, default: usize| {
            params
                .get(key)
                .map_or(Some(default), |v| v.as_u64().and_then(|v| usize::try_from(v).ok()))
                .ok_or_else(|| ComponentError::fatal(format!("{key} must be an unsigned integer")))
        };
        Self::new(read("chunk_size", Self::DEFAULT_CHUNK_SIZE)?, read("overlap", 0)?)
    }
}

impl Splitter for FixedSizeSplitter {
    fn split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let step = self.chunk_size - self.overlap;
        let mut pieces = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            let piece: String = chars[start..end].iter().collect();
            if !piece.trim().is_empty() {
                pieces.push(piece);
            }
            if end == chars.len() {
                break;
            }
            start += step;
        }
        pieces
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_splitter_drops_empty() {
        let pieces = PeriodSplitter.split("Rust is fast. Arrow is columnar.. ");
        assert_eq!(pieces, vec!["Rust is fast", "Arrow is columnar"]);
        assert!(PeriodSplitter.split("...").is_empty());
    }

    #[test]
    fn test_fixed_size_windows_with_overlap() {
        let splitter = FixedSizeSplitter::new(4, 1).unwrap();
        assert_eq!(splitter.split("abcdefghij"), vec!["abcd", "defg", "ghij"]);
    }

    #[test]
    fn test_fixed_size_multibyte() {
        let splitter = FixedSizeSplitter::new(2, 0).unwrap();
        assert_eq!(splitter.split("héllo"), vec!["hé", "ll", "o"]);
    }

    #[test]
    fn test_fixed_size_rejects_bad_overlap() {
        assert!(FixedSizeSplitter::new(4, 4).is_err());
        assert!(FixedSizeSplitter::new(0, 0).is_err());
    }

    #[test]
    fn test_fixed_size_from_params() {
        let mut params = Params::new();
        params.insert("chunk_size".into(), 3.into());
        let splitter = FixedSizeSplitter::from_params(&params).unwrap();
        assert_eq!(splitter.split("abcdef"), vec!["abc", "def"]);
        params.insert("overlap".into(), "x".into());
        assert!(FixedSizeSplitter::from_params(&params).is_err());
    }
}
