//! Text input readers and binary run output
//!
//! Input formats (one record per line, `#` comments and blank lines
//! skipped):
//! - token file: `word doc is_toponym is_stopword`
//! - region filter file: `toponym region region ...`
//! - lexicon file: `toponym lat,lng lat,lng ...` (degrees)
//!
//! Output run bundle layout:
//! - base.run (manifest)
//! - base.region.bin (region id per token)
//! - base.coord.bin (coordinate index per token, spherical only)
//! - base.wreg.bin (averaged word-by-region counts)
//! - base.dreg.bin (averaged region-by-document counts)
//! - base.means.bin (averaged region direction sums, spherical only)

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::ModelError;
use crate::geo::Coordinate;
use crate::stats::RegionStats;
use crate::types::{Assignments, Corpus, Lexicon, RegionFilter};
use crate::{RUN_MAGIC, RUN_VERSION};

/// Which sampler produced a run bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelMode {
    Discrete,
    Spherical,
}

impl ModelMode {
    fn tag(self) -> u8 {
        match self {
            ModelMode::Discrete => 0,
            ModelMode::Spherical => 1,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ModelMode::Discrete),
            1 => Some(ModelMode::Spherical),
            _ => None,
        }
    }
}

impl std::fmt::Display for ModelMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelMode::Discrete => write!(f, "discrete"),
            ModelMode::Spherical => write!(f, "spherical"),
        }
    }
}

/// A trained run: final token assignments plus the sample-averaged
/// region statistics, compacted to the active region range.
#[derive(Debug, Clone)]
pub struct RunBundle {
    pub mode: ModelMode,
    pub n_words: usize,
    pub n_docs: usize,
    pub n_regions: usize,
    pub samples: usize,
    /// Region id per token
    pub region: Vec<u32>,
    /// Candidate coordinate index per token (spherical runs)
    pub coord: Option<Vec<u32>>,
    /// Averaged word-by-region counts, stride `n_regions`
    pub avg_word_by_region: Vec<f64>,
    /// Averaged region-by-document counts, stride `n_regions`
    pub avg_region_by_doc: Vec<f64>,
    /// Averaged region direction sums (spherical runs)
    pub mean_sums: Option<Vec<[f64; 3]>>,
}

/// Manifest summary of a run bundle, read without loading the sidecars.
#[derive(Debug, Clone, Copy)]
pub struct RunInfo {
    pub mode: ModelMode,
    pub n_tokens: usize,
    pub n_words: usize,
    pub n_docs: usize,
    pub n_regions: usize,
    pub samples: usize,
}

impl RunBundle {
    /// Package a trained model's assignments and averaged statistics.
    /// Requires a completed sampling phase.
    pub fn from_model(
        mode: ModelMode,
        assignments: &Assignments,
        stats: &RegionStats,
    ) -> Result<Self, ModelError> {
        if stats.samples() == 0 {
            return Err(ModelError::NoSamples);
        }
        let n_regions = stats.current_r();
        let n_words = stats.n_words();
        let n_docs = stats.n_docs();

        // Compact from capacity stride to the active region range
        let mut avg_word_by_region = Vec::with_capacity(n_words * n_regions);
        for w in 0..n_words {
            for j in 0..n_regions {
                avg_word_by_region.push(stats.averaged_word_region(w as u32, j));
            }
        }
        let mut avg_region_by_doc = Vec::with_capacity(n_docs * n_regions);
        for d in 0..n_docs {
            for j in 0..n_regions {
                avg_region_by_doc.push(stats.averaged_doc_region(d as u32, j));
            }
        }
        let (coord, mean_sums) = match mode {
            ModelMode::Discrete => (None, None),
            ModelMode::Spherical => (
                Some(assignments.coord.clone()),
                Some((0..n_regions).map(|j| stats.averaged_mean_sum(j)).collect()),
            ),
        };

        Ok(Self {
            mode,
            n_words,
            n_docs,
            n_regions,
            samples: stats.samples(),
            region: assignments.region.clone(),
            coord,
            avg_word_by_region,
            avg_region_by_doc,
            mean_sums,
        })
    }
}

fn format_err(path: &Path, reason: impl Into<String>) -> ModelError {
    ModelError::Format {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

fn data_lines(path: &Path) -> Result<Vec<(usize, String)>, ModelError> {
    let file = BufReader::new(File::open(path)?);
    let mut lines = Vec::new();
    for (lineno, line) in file.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        lines.push((lineno + 1, trimmed.to_string()));
    }
    Ok(lines)
}

/// Read a token-array file: `word doc is_toponym is_stopword` per line.
/// Vocabulary size and document count are derived from the data, with
/// stopword tokens excluded from the vocabulary.
pub fn read_token_file(path: &Path) -> Result<Corpus, ModelError> {
    let mut word = Vec::new();
    let mut doc = Vec::new();
    let mut toponym = Vec::new();
    let mut stopword = Vec::new();

    for (lineno, line) in data_lines(path)? {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 4 {
            return Err(format_err(
                path,
                format!("line {lineno}: expected 4 fields, got {}", fields.len()),
            ));
        }
        let parse_id = |s: &str| -> Result<u32, ModelError> {
            s.parse()
                .map_err(|_| format_err(path, format!("line {lineno}: bad id `{s}`")))
        };
        let parse_flag = |s: &str| -> Result<bool, ModelError> {
            match s {
                "0" => Ok(false),
                "1" => Ok(true),
                other => Err(format_err(
                    path,
                    format!("line {lineno}: flag must be 0 or 1, got `{other}`"),
                )),
            }
        };
        word.push(parse_id(fields[0])?);
        doc.push(parse_id(fields[1])?);
        toponym.push(parse_flag(fields[2])?);
        stopword.push(parse_flag(fields[3])?);
    }

    Corpus::from_columns(word, doc, toponym, stopword)
}

/// Read a region filter file: `toponym region region ...` per line.
/// Toponym ids missing from the file get an empty candidate list.
pub fn read_filter_file(path: &Path, n_regions: usize) -> Result<RegionFilter, ModelError> {
    let mut candidates: Vec<Vec<u32>> = Vec::new();

    for (lineno, line) in data_lines(path)? {
        let mut fields = line.split_whitespace();
        let toponym: usize = fields
            .next()
            .ok_or_else(|| format_err(path, format!("line {lineno}: missing toponym id")))?
            .parse()
            .map_err(|_| format_err(path, format!("line {lineno}: bad toponym id")))?;
        let regions: Vec<u32> = fields
            .map(|s| {
                s.parse()
                    .map_err(|_| format_err(path, format!("line {lineno}: bad region id `{s}`")))
            })
            .collect::<Result<_, _>>()?;
        if toponym >= candidates.len() {
            candidates.resize(toponym + 1, Vec::new());
        }
        candidates[toponym] = regions;
    }

    RegionFilter::new(candidates, n_regions)
}

/// Read a lexicon file: `toponym lat,lng lat,lng ...` per line, with
/// coordinates in degrees.
pub fn read_lexicon_file(path: &Path) -> Result<Lexicon, ModelError> {
    let mut coords: Vec<Vec<Coordinate>> = Vec::new();

    for (lineno, line) in data_lines(path)? {
        let mut fields = line.split_whitespace();
        let toponym: usize = fields
            .next()
            .ok_or_else(|| format_err(path, format!("line {lineno}: missing toponym id")))?
            .parse()
            .map_err(|_| format_err(path, format!("line {lineno}: bad toponym id")))?;
        let mut candidates = Vec::new();
        for pair in fields {
            let (lat, lng) = pair.split_once(',').ok_or_else(|| {
                format_err(path, format!("line {lineno}: expected lat,lng, got `{pair}`"))
            })?;
            let lat: f64 = lat
                .parse()
                .map_err(|_| format_err(path, format!("line {lineno}: bad latitude `{lat}`")))?;
            let lng: f64 = lng
                .parse()
                .map_err(|_| format_err(path, format!("line {lineno}: bad longitude `{lng}`")))?;
            if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
                return Err(format_err(
                    path,
                    format!("line {lineno}: coordinate out of range: {lat},{lng}"),
                ));
            }
            candidates.push(Coordinate::from_degrees(lat, lng));
        }
        if toponym >= coords.len() {
            coords.resize(toponym + 1, Vec::new());
        }
        coords[toponym] = candidates;
    }

    Ok(Lexicon::new(coords))
}

/// Write a run bundle to disk as a manifest plus binary sidecars.
pub fn write_run(bundle: &RunBundle, base_path: &str) -> Result<(), ModelError> {
    let base = Path::new(base_path);

    let manifest_path = base.with_extension("run");
    let mut manifest = BufWriter::new(File::create(manifest_path)?);

    // Header
    manifest.write_all(&RUN_MAGIC.to_le_bytes())?;
    manifest.write_all(&RUN_VERSION.to_le_bytes())?;
    manifest.write_all(&[bundle.mode.tag()])?;

    // Dimensions
    manifest.write_all(&(bundle.region.len() as u32).to_le_bytes())?;
    manifest.write_all(&(bundle.n_words as u32).to_le_bytes())?;
    manifest.write_all(&(bundle.n_docs as u32).to_le_bytes())?;
    manifest.write_all(&(bundle.n_regions as u32).to_le_bytes())?;
    manifest.write_all(&(bundle.samples as u32).to_le_bytes())?;

    // Assignments
    let region_path = base.with_extension("region.bin");
    let mut region_file = BufWriter::new(File::create(region_path)?);
    region_file.write_all(bytemuck::cast_slice(&bundle.region))?;

    if let Some(ref coord) = bundle.coord {
        let coord_path = base.with_extension("coord.bin");
        let mut coord_file = BufWriter::new(File::create(coord_path)?);
        coord_file.write_all(bytemuck::cast_slice(coord))?;
    }

    // Averaged statistics
    let wreg_path = base.with_extension("wreg.bin");
    let mut wreg_file = BufWriter::new(File::create(wreg_path)?);
    wreg_file.write_all(bytemuck::cast_slice(&bundle.avg_word_by_region))?;

    let dreg_path = base.with_extension("dreg.bin");
    let mut dreg_file = BufWriter::new(File::create(dreg_path)?);
    dreg_file.write_all(bytemuck::cast_slice(&bundle.avg_region_by_doc))?;

    if let Some(ref means) = bundle.mean_sums {
        let means_path = base.with_extension("means.bin");
        let mut means_file = BufWriter::new(File::create(means_path)?);
        means_file.write_all(bytemuck::cast_slice(means))?;
    }

    Ok(())
}

fn read_manifest(base: &Path) -> Result<RunInfo, ModelError> {
    let manifest_path = base.with_extension("run");
    let mut manifest = BufReader::new(File::open(&manifest_path)?);

    let mut magic = [0u8; 4];
    manifest.read_exact(&mut magic)?;
    if u32::from_le_bytes(magic) != RUN_MAGIC {
        return Err(format_err(&manifest_path, "bad magic number"));
    }

    let mut version = [0u8; 2];
    manifest.read_exact(&mut version)?;
    let version = u16::from_le_bytes(version);
    if version != RUN_VERSION {
        return Err(format_err(
            &manifest_path,
            format!("unsupported run version: {version}"),
        ));
    }

    let mut mode = [0u8; 1];
    manifest.read_exact(&mut mode)?;
    let mode = ModelMode::from_tag(mode[0])
        .ok_or_else(|| format_err(&manifest_path, format!("unknown model tag {}", mode[0])))?;

    let mut dims = [0u8; 20];
    manifest.read_exact(&mut dims)?;
    let field = |i: usize| {
        let bytes: [u8; 4] = dims[i * 4..i * 4 + 4].try_into().unwrap_or([0; 4]);
        u32::from_le_bytes(bytes) as usize
    };

    Ok(RunInfo {
        mode,
        n_tokens: field(0),
        n_words: field(1),
        n_docs: field(2),
        n_regions: field(3),
        samples: field(4),
    })
}

/// Read a full run bundle back from disk.
pub fn read_run(base_path: &str) -> Result<RunBundle, ModelError> {
    let base = Path::new(base_path);
    let info = read_manifest(base)?;

    fn read_column<T: bytemuck::Pod>(
        path: std::path::PathBuf,
        expect: usize,
    ) -> Result<Vec<T>, ModelError> {
        let data = std::fs::read(&path)?;
        if data.len() % std::mem::size_of::<T>() != 0 {
            return Err(ModelError::Format {
                path: path.display().to_string(),
                reason: format!("truncated column file ({} bytes)", data.len()),
            });
        }
        // pod_collect_to_vec tolerates the u8 buffer's alignment
        let values: Vec<T> = bytemuck::pod_collect_to_vec(&data);
        if values.len() != expect {
            return Err(ModelError::Format {
                path: path.display().to_string(),
                reason: format!("expected {expect} entries, found {}", values.len()),
            });
        }
        Ok(values)
    }

    let region: Vec<u32> = read_column(base.with_extension("region.bin"), info.n_tokens)?;
    let avg_word_by_region: Vec<f64> = read_column(
        base.with_extension("wreg.bin"),
        info.n_words * info.n_regions,
    )?;
    let avg_region_by_doc: Vec<f64> = read_column(
        base.with_extension("dreg.bin"),
        info.n_docs * info.n_regions,
    )?;

    let (coord, mean_sums) = match info.mode {
        ModelMode::Discrete => (None, None),
        ModelMode::Spherical => {
            let coord: Vec<u32> = read_column(base.with_extension("coord.bin"), info.n_tokens)?;
            let flat: Vec<f64> =
                read_column(base.with_extension("means.bin"), info.n_regions * 3)?;
            let means = flat.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect();
            (Some(coord), Some(means))
        }
    };

    Ok(RunBundle {
        mode: info.mode,
        n_words: info.n_words,
        n_docs: info.n_docs,
        n_regions: info.n_regions,
        samples: info.samples,
        region,
        coord,
        avg_word_by_region,
        avg_region_by_doc,
        mean_sums,
    })
}

/// Summarize a run bundle from its manifest alone.
pub fn read_run_info(base_path: &str) -> Result<RunInfo, ModelError> {
    read_manifest(Path::new(base_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_file_roundtrip() {
        let path = Path::new("/tmp/geogibbs_tokens.txt");
        std::fs::write(path, "# word doc top stop\n0 0 1 0\n1 0 0 0\n2 1 0 1\n").unwrap();
        let corpus = read_token_file(path).unwrap();
        assert_eq!(corpus.n_tokens(), 3);
        assert_eq!(corpus.n_words, 2); // stopword token excluded from W
        assert_eq!(corpus.n_docs, 2);
        assert!(corpus.toponym[0]);
        assert!(corpus.stopword[2]);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_token_file_bad_flag() {
        let path = Path::new("/tmp/geogibbs_tokens_bad.txt");
        std::fs::write(path, "0 0 2 0\n").unwrap();
        let err = read_token_file(path).unwrap_err();
        assert!(matches!(err, ModelError::Format { .. }));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_filter_file() {
        let path = Path::new("/tmp/geogibbs_filter.txt");
        std::fs::write(path, "0 1 3\n2 0\n").unwrap();
        let filter = read_filter_file(path, 4).unwrap();
        assert_eq!(filter.regions_for(0), &[1, 3]);
        assert_eq!(filter.regions_for(1), &[] as &[u32]);
        assert_eq!(filter.regions_for(2), &[0]);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_lexicon_file() {
        let path = Path::new("/tmp/geogibbs_lexicon.txt");
        std::fs::write(path, "0 40.7,-74.0 51.5,-0.1\n1 -33.9,151.2\n").unwrap();
        let lexicon = read_lexicon_file(path).unwrap();
        assert_eq!(lexicon.n_toponyms(), 2);
        assert_eq!(lexicon.candidate_count(0), 2);
        assert!((lexicon.coords[0][0].lat_degrees() - 40.7).abs() < 1e-9);
        assert!((lexicon.coords[1][0].lng_degrees() - 151.2).abs() < 1e-9);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_lexicon_rejects_out_of_range() {
        let path = Path::new("/tmp/geogibbs_lexicon_bad.txt");
        std::fs::write(path, "0 95.0,10.0\n").unwrap();
        assert!(read_lexicon_file(path).is_err());
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_run_roundtrip() {
        let bundle = RunBundle {
            mode: ModelMode::Spherical,
            n_words: 2,
            n_docs: 1,
            n_regions: 2,
            samples: 5,
            region: vec![0, 1, 0],
            coord: Some(vec![1, 0, 0]),
            avg_word_by_region: vec![1.2, 0.0, 0.4, 1.4],
            avg_region_by_doc: vec![1.6, 1.4],
            mean_sums: Some(vec![[0.1, 0.2, 0.3], [-0.5, 0.0, 0.5]]),
        };

        let base = "/tmp/geogibbs_run_test";
        write_run(&bundle, base).unwrap();

        let info = read_run_info(base).unwrap();
        assert_eq!(info.mode, ModelMode::Spherical);
        assert_eq!(info.n_tokens, 3);
        assert_eq!(info.n_regions, 2);
        assert_eq!(info.samples, 5);

        let loaded = read_run(base).unwrap();
        assert_eq!(loaded.region, bundle.region);
        assert_eq!(loaded.coord, bundle.coord);
        assert_eq!(loaded.avg_word_by_region, bundle.avg_word_by_region);
        assert_eq!(loaded.mean_sums, bundle.mean_sums);

        for ext in ["run", "region.bin", "coord.bin", "wreg.bin", "dreg.bin", "means.bin"] {
            std::fs::remove_file(format!("{base}.{ext}")).ok();
        }
    }

    #[test]
    fn test_run_bad_magic() {
        let base = "/tmp/geogibbs_run_badmagic";
        std::fs::write(format!("{base}.run"), [0u8; 27]).unwrap();
        let err = read_run_info(base).unwrap_err();
        assert!(matches!(err, ModelError::Format { .. }));
        std::fs::remove_file(format!("{base}.run")).ok();
    }
}
