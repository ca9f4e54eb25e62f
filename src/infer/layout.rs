//! Named parameter blocks inside a flat parameter vector.

use std::ops::Range;

use crate::error::FitError;

#[derive(Debug, Clone, PartialEq)]
struct Block {
    name: String,
    start: usize,
    len: usize,
}

/// Ordered set of named blocks (`"flux0"`, `"log_r"`, ...).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamLayout {
    blocks: Vec<Block>,
    dim: usize,
}

impl ParamLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a block of `len` coordinates and return its range.
    pub fn push(&mut self, name: impl Into<String>, len: usize) -> Range<usize> {
        let start = self.dim;
        self.blocks.push(Block {
            name: name.into(),
            start,
            len,
        });
        self.dim += len;
        start..self.dim
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn range(&self, name: &str) -> Option<Range<usize>> {
        self.blocks
            .iter()
            .find(|b| b.name == name)
            .map(|b| b.start..b.start + b.len)
    }

    /// Flat indices covered by the named blocks, in the order given.
    pub fn indices(&self, names: &[&str]) -> Result<Vec<usize>, FitError> {
        let mut out = Vec::new();
        for name in names {
            let range = self
                .range(name)
                .ok_or_else(|| FitError::UnknownBlock((*name).to_string()))?;
            for i in range {
                if !out.contains(&i) {
                    out.push(i);
                }
            }
        }
        Ok(out)
    }
}
