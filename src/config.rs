//! Configuration file.
//!
//! Options for every checker can be kept in a YAML file. Every section is
//! optional:
//!
//! ```yaml
//! fasta:
//!   alphabets: [DNA]
//!   gaps: false
//!   max_seq_len: 10000
//! background:
//!   file_max: 1048576
//! chunks:
//!   fasta: 1024
//!   motif: 4096
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::chunked::{FASTA_CHUNK_SIZE, MOTIF_CHUNK_SIZE};
use crate::formats::background::BgOptions;
use crate::formats::fasta_summary::FastaOptions;

/// Bytes read per chunk, by file kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkSizes {
    pub fasta: usize,
    pub motif: usize,
    pub background: usize,
}

impl Default for ChunkSizes {
    fn default() -> Self {
        Self {
            fasta: FASTA_CHUNK_SIZE,
            motif: MOTIF_CHUNK_SIZE,
            background: MOTIF_CHUNK_SIZE,
        }
    }
}

impl ChunkSizes {
    /// Uses `size` for every kind of file.
    pub fn all(size: usize) -> Self {
        Self {
            fasta: size,
            motif: size,
            background: size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fasta: FastaOptions,
    pub background: BgOptions,
    pub chunks: ChunkSizes,
}

impl Config {
    /// Loads and validates a YAML configuration file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Config = if content.trim().is_empty() {
            log::warn!("Configuration is empty, using defaults");
            Config::default()
        } else {
            serde_yaml::from_str(content).context("Failed to parse YAML config")?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.fasta.validate().context("Invalid fasta options")?;
        self.background.validate().context("Invalid background options")?;
        if self.chunks.fasta == 0 || self.chunks.motif == 0 || self.chunks.background == 0 {
            anyhow::bail!("Chunk sizes must be at least 1 byte");
        }
        if self.chunks.fasta < 64 || self.chunks.motif < 64 || self.chunks.background < 64 {
            log::warn!("Very small chunk sizes make checking slow");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::{Alphabet, AlphabetSet};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunks.fasta, 1024);
        assert_eq!(config.chunks.motif, 4096);
        assert_eq!(config.chunks.background, 4096);
        assert_eq!(config.background.file_max, Some(1 << 20));
    }

    #[test]
    fn test_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "fasta:\n  alphabets: [DNA, RNA]\n  gaps: true\n  max_seq_len: 500\nchunks:\n  motif: 8192").unwrap();
        let config = Config::from_yaml(file.path()).unwrap();
        assert_eq!(config.fasta.alphabets, AlphabetSet::of(&[Alphabet::Dna, Alphabet::Rna]));
        assert!(config.fasta.gaps);
        assert!(config.fasta.weights);
        assert_eq!(config.fasta.max_seq_len, Some(500));
        assert_eq!(config.chunks.motif, 8192);
        assert_eq!(config.chunks.fasta, 1024);
        assert_eq!(config.background, BgOptions::default());
    }

    #[test]
    fn test_empty_file() {
        let file = NamedTempFile::new().unwrap();
        assert_eq!(Config::from_yaml(file.path()).unwrap(), Config::default());
    }

    #[test]
    fn test_invalid_values() {
        let err = Config::from_yaml_str("fasta:\n  min_seq_len: 10\n  max_seq_len: 5\n").unwrap_err();
        assert!(format!("{:#}", err).contains("min_seq_len"));
        assert!(Config::from_yaml_str("chunks:\n  fasta: 0\n").is_err());
        assert!(Config::from_yaml_str("background:\n  alphabets: []\n").is_err());
        assert!(Config::from_yaml_str("fasta: [1, 2").is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_yaml("/nonexistent/memecheck.yaml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
