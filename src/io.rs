//! Reading tree collections and writing distance matrices.
//!
//! Inputs are either plain Newick files (one or more `;`-terminated trees) or
//! BEAST/NEXUS `.trees` files. Both may be gzip-compressed. Outputs go to a
//! file, a `.gz` file, or stdout.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use phylotree::tree::Tree;
use tracing::debug;

use crate::distances::DistanceMatrix;
use crate::error::{HashRfError, Result};

/// A tree together with the name it is reported under.
pub type NamedTree = (String, Tree);

fn is_gz(path: &Path) -> bool {
    path.to_string_lossy().ends_with(".gz")
}

/// Whole file as text, decompressing `.gz` paths on the fly.
fn read_text(path: &Path) -> Result<String> {
    let file = File::open(path)?;
    let mut content = String::new();
    if is_gz(path) {
        MultiGzDecoder::new(file).read_to_string(&mut content)?;
    } else {
        io::BufReader::new(file).read_to_string(&mut content)?;
    }
    Ok(content)
}

/// File name without `.gz` and the usual tree extensions.
fn base_name(path: &Path) -> String {
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("trees");
    let name = name.trim_end_matches(".gz");
    [".trees", ".nwk", ".newick", ".tre", ".tree"]
        .iter()
        .find_map(|ext| name.strip_suffix(ext))
        .unwrap_or(name)
        .to_string()
}

/// Removes every `[...]` comment, including BEAST `[&rate=...]` annotations.
/// Branch lengths written after an annotation are kept.
fn strip_comments(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut depth = 0usize;
    for ch in text.chars() {
        match ch {
            '[' => depth += 1,
            ']' if depth > 0 => depth -= 1,
            _ if depth == 0 => result.push(ch),
            _ => {}
        }
    }
    result
}

fn parse_newick_str(text: &str) -> Result<Vec<Tree>> {
    strip_comments(text)
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Tree::from_newick(&format!("{s};")).map_err(HashRfError::from))
        .collect()
}

fn name_newick_trees(base: &str, trees: Vec<Tree>, limit: Option<usize>) -> Vec<NamedTree> {
    trees
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
        .enumerate()
        .map(|(idx, tree)| (format!("{base}_{idx}"), tree))
        .collect()
}

/// Reads `;`-terminated Newick trees from `path`.
///
/// `limit = Some(k)` keeps only the first `k` trees. Trees are named
/// `<file stem>_<index>`.
pub fn read_newick_trees<P: AsRef<Path>>(path: P, limit: Option<usize>) -> Result<Vec<NamedTree>> {
    let path = path.as_ref();
    let content = read_text(path)?;
    let trees = name_newick_trees(&base_name(path), parse_newick_str(&content)?, limit);
    debug!(path = %path.display(), trees = trees.len(), "read newick file");
    Ok(trees)
}

/// Body of the `TRANSLATE` block: `id -> label`.
///
/// ```text
/// Translate
///     1 'A.1959',
///     2 B_1960;
/// ```
fn parse_translate_block(content: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let mut lines = content
        .lines()
        .skip_while(|line| !line.trim().to_ascii_uppercase().starts_with("TRANSLATE"))
        .skip(1);

    for line in lines.by_ref() {
        let line = line.trim();
        if line.starts_with(';') {
            break;
        }
        let last = line.ends_with(';');
        let mut parts = line.trim_end_matches([',', ';']).split_whitespace();
        if let (Some(id), Some(label)) = (parts.next(), parts.next()) {
            map.insert(id.to_string(), label.trim_matches('\'').to_string());
        }
        if last {
            break;
        }
    }
    map
}

/// `tree <name> = <newick>` lines of the `TREES` block.
fn tree_lines(content: &str) -> impl Iterator<Item = (&str, &str)> {
    content.lines().filter_map(|line| {
        let line = line.trim();
        let keyword = line.get(..4)?;
        let after = line[4..].chars().next()?;
        if !keyword.eq_ignore_ascii_case("TREE") || !after.is_ascii_whitespace() {
            return None;
        }
        let (header, body) = line.split_once('=')?;
        let name = header[4..].trim().trim_start_matches('*').trim();
        Some((name, body.trim()))
    })
}

/// Renames leaves through `translate`. Labels without a mapping are kept.
pub fn rename_leaves(tree: &mut Tree, translate: &HashMap<String, String>) -> Result<()> {
    for leaf_id in tree.get_leaves() {
        let node = tree.get_mut(&leaf_id)?;
        if let Some(label) = node.name.as_ref().and_then(|n| translate.get(n)) {
            node.name = Some(label.clone());
        }
    }
    Ok(())
}

fn parse_nexus_str(content: &str, use_real_taxa: bool) -> Result<Vec<NamedTree>> {
    let translate = if use_real_taxa {
        parse_translate_block(content)
    } else {
        HashMap::new()
    };

    tree_lines(content)
        .map(|(name, body)| -> Result<NamedTree> {
            let newick = strip_comments(body);
            let mut tree = Tree::from_newick(newick.trim())?;
            if !translate.is_empty() {
                rename_leaves(&mut tree, &translate)?;
            }
            Ok((name.to_string(), tree))
        })
        .collect()
}

fn is_nexus(content: &str) -> bool {
    content.trim_start().to_ascii_uppercase().starts_with("#NEXUS")
}

/// Reads the trees of a BEAST/NEXUS file.
///
/// `[&...]` annotations are stripped. With `use_real_taxa`, leaf labels are
/// mapped through the `TRANSLATE` block when the file has one.
pub fn read_nexus_trees<P: AsRef<Path>>(path: P, use_real_taxa: bool) -> Result<Vec<NamedTree>> {
    let path = path.as_ref();
    let trees = parse_nexus_str(&read_text(path)?, use_real_taxa)?;
    debug!(path = %path.display(), trees = trees.len(), "read nexus file");
    Ok(trees)
}

/// Reads a tree file, NEXUS when it starts with `#NEXUS` and Newick otherwise.
/// NEXUS leaves are renamed through the `TRANSLATE` block if there is one.
pub fn read_trees<P: AsRef<Path>>(path: P, limit: Option<usize>) -> Result<Vec<NamedTree>> {
    let path = path.as_ref();
    let content = read_text(path)?;
    let trees = if is_nexus(&content) {
        let mut trees = parse_nexus_str(&content, true)?;
        trees.truncate(limit.unwrap_or(usize::MAX));
        trees
    } else {
        name_newick_trees(&base_name(path), parse_newick_str(&content)?, limit)
    };
    debug!(path = %path.display(), trees = trees.len(), "read tree file");
    Ok(trees)
}

/// Reads the first `declared` trees of `path`, or every tree when
/// `declared == 0`.
///
/// # Errors
/// `Config` when the file holds fewer than `declared` trees.
pub fn read_declared_trees<P: AsRef<Path>>(path: P, declared: usize) -> Result<Vec<NamedTree>> {
    let path = path.as_ref();
    let limit = (declared > 0).then_some(declared);
    let trees = read_trees(path, limit)?;
    if declared > 0 && trees.len() != declared {
        return Err(HashRfError::Config(format!(
            "declared {declared} trees but {} holds only {}",
            path.display(),
            trees.len()
        )));
    }
    Ok(trees)
}

/// Layout of the written distance matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    /// Nothing is written
    None,
    /// `<i,j> d`, one ordered pair per line
    List,
    /// `<i,j> pct`, the distance as a percentage of `n - 3`
    Rate,
    /// Full square matrix, space separated
    Matrix,
    /// Strictly lower triangle, row `i` holding `d(i, 0..i)`
    LowerTriangle,
    /// Square matrix with tree names as header row and column
    Tsv,
}

impl Presentation {
    /// Rejects layouts that are not defined for the kind of run.
    pub fn check(self, weighted: bool) -> Result<()> {
        if weighted && self == Presentation::Rate {
            return Err(HashRfError::Config(
                "RF rate is only defined for unweighted distances".to_string(),
            ));
        }
        Ok(())
    }
}

/// Writes `matrix` to `output`: stdout for `-`, gzip for `.gz`, a plain file
/// otherwise.
pub fn write_distances<P: AsRef<Path>>(
    output: P,
    names: &[String],
    matrix: &DistanceMatrix,
    presentation: Presentation,
) -> Result<()> {
    presentation.check(matrix.is_weighted())?;
    if presentation == Presentation::None {
        return Ok(());
    }

    let p = output.as_ref();
    let mut out: Box<dyn Write> = if p.as_os_str() == "-" {
        Box::new(BufWriter::new(io::stdout().lock()))
    } else if is_gz(p) {
        let enc = GzEncoder::new(File::create(p)?, Compression::default());
        Box::new(BufWriter::new(enc))
    } else {
        Box::new(BufWriter::new(File::create(p)?))
    };

    render(&mut out, names, matrix, presentation)?;
    out.flush()?;
    Ok(())
}

/// Formats `matrix` into any writer.
pub fn render<W: Write>(
    out: &mut W,
    names: &[String],
    matrix: &DistanceMatrix,
    presentation: Presentation,
) -> Result<()> {
    let t = matrix.len();
    match presentation {
        Presentation::None => {}
        Presentation::List => {
            for i in 0..t {
                for j in 0..t {
                    writeln!(out, "<{i},{j}> {}", matrix.value(i, j))?;
                }
            }
        }
        Presentation::Rate => {
            let rates = matrix.rates()?;
            for (i, row) in rates.iter().enumerate() {
                for (j, rate) in row.iter().enumerate() {
                    writeln!(out, "<{i},{j}> {rate}")?;
                }
            }
        }
        Presentation::Matrix => {
            for i in 0..t {
                for j in 0..t {
                    write!(out, "{} ", matrix.value(i, j))?;
                }
                writeln!(out)?;
            }
        }
        Presentation::LowerTriangle => {
            for i in 0..t {
                for j in 0..i {
                    write!(out, "{} ", matrix.value(i, j))?;
                }
                writeln!(out)?;
            }
        }
        Presentation::Tsv => {
            if names.len() != t {
                return Err(HashRfError::Config(format!(
                    "{} tree names for a {t}x{t} matrix",
                    names.len()
                )));
            }
            for name in names {
                write!(out, "\t{name}")?;
            }
            writeln!(out)?;
            for (i, name) in names.iter().enumerate() {
                write!(out, "{name}")?;
                for j in 0..t {
                    write!(out, "\t{}", matrix.value(i, j))?;
                }
                writeln!(out)?;
            }
        }
    }
    Ok(())
}
