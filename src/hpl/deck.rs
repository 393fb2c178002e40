//! HPL.dat input deck
//!
//! One fact per line: a value padded to 20 columns followed by a comment.
//! List parameters are written as a count line and a values line whose
//! lengths always agree.

use crate::config::{AlgorithmKnobs, RunConfiguration};
use crate::error::{HarnessError, IoResultExt, Result};
use crate::system::topology::ProcessGrid;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

/// Default knob values written when a run does not set them
pub const DEFAULT_KNOBS: [(&str, i64); 7] = [
    ("pmap", 0),
    ("depth", 1),
    ("bcast", 0),
    ("rfact", 2),
    ("ndiv", 2),
    ("pfact", 2),
    ("nbmin", 1),
];

fn default_knob(name: &str) -> i64 {
    DEFAULT_KNOBS
        .iter()
        .find(|(n, _)| *n == name)
        .map_or(0, |(_, v)| *v)
}

/// Contents of an HPL.dat file
#[derive(Debug, Clone, PartialEq)]
pub struct HplDeck {
    /// First title line
    pub title: String,
    /// Second title line
    pub origin: String,
    /// Output file name (used when `device_out` is neither 6 nor 7)
    pub output_file: String,
    /// Output device: 6 stdout, 7 stderr, anything else the output file
    pub device_out: String,
    /// Problem sizes
    pub sizes: Vec<u64>,
    /// Block sizes
    pub block_sizes: Vec<u64>,
    /// Process mapping (0 row-major, 1 column-major)
    pub pmap: i64,
    /// Process grids
    pub grids: Vec<ProcessGrid>,
    /// Residual threshold
    pub threshold: f64,
    /// Panel factorizations
    pub pfacts: Vec<i64>,
    /// Recursive stopping criteria
    pub nbmins: Vec<i64>,
    /// Panels in recursion
    pub ndivs: Vec<i64>,
    /// Recursive panel factorizations
    pub rfacts: Vec<i64>,
    /// Broadcast algorithms
    pub bcasts: Vec<i64>,
    /// Look-ahead depths
    pub depths: Vec<i64>,
    /// Swapping algorithm (0 bin-exch, 1 long, 2 mix)
    pub swap: i64,
    /// Swapping threshold
    pub swap_threshold: i64,
    /// L1 form (0 transposed, 1 no-transposed)
    pub l1: i64,
    /// U form (0 transposed, 1 no-transposed)
    pub u: i64,
    /// Equilibration (0 no, 1 yes)
    pub equilibration: i64,
    /// Memory alignment in doubles
    pub alignment: i64,
}

impl HplDeck {
    /// Deck for a single run configuration; results go to stdout
    pub fn from_run(run: &RunConfiguration) -> Self {
        let knob = |name: &str| run.knob(name, default_knob(name));

        Self {
            title: "HPL input".to_string(),
            origin: "hpcbench".to_string(),
            output_file: "HPL.out".to_string(),
            device_out: "6".to_string(),
            sizes: vec![run.problem_size()],
            block_sizes: vec![run.block_size()],
            pmap: knob("pmap"),
            grids: vec![run.grid()],
            threshold: 16.0,
            pfacts: vec![knob("pfact")],
            nbmins: vec![knob("nbmin")],
            ndivs: vec![knob("ndiv")],
            rfacts: vec![knob("rfact")],
            bcasts: vec![knob("bcast")],
            depths: vec![knob("depth")],
            swap: 2,
            swap_threshold: 60,
            l1: 1,
            u: 0,
            equilibration: 1,
            alignment: 8,
        }
    }

    /// Knobs of the first entry of every list
    pub fn knobs(&self) -> AlgorithmKnobs {
        let first = |values: &[i64]| values.first().copied();
        [
            ("pmap", Some(self.pmap)),
            ("depth", first(&self.depths)),
            ("bcast", first(&self.bcasts)),
            ("rfact", first(&self.rfacts)),
            ("ndiv", first(&self.ndivs)),
            ("pfact", first(&self.pfacts)),
            ("nbmin", first(&self.nbmins)),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name.to_string(), v)))
        .collect()
    }

    /// Render the deck, refusing empty lists
    pub fn render(&self) -> Result<String> {
        let lists: [(&str, usize); 9] = [
            ("Ns", self.sizes.len()),
            ("NBs", self.block_sizes.len()),
            ("process grids", self.grids.len()),
            ("PFACTs", self.pfacts.len()),
            ("NBMINs", self.nbmins.len()),
            ("NDIVs", self.ndivs.len()),
            ("RFACTs", self.rfacts.len()),
            ("BCASTs", self.bcasts.len()),
            ("DEPTHs", self.depths.len()),
        ];
        if let Some((name, _)) = lists.iter().find(|(_, len)| *len == 0) {
            return Err(HarnessError::config(format!("HPL.dat: {} must not be empty", name)));
        }

        let ps: Vec<usize> = self.grids.iter().map(|g| g.p).collect();
        let qs: Vec<usize> = self.grids.iter().map(|g| g.q).collect();

        let mut out = String::new();
        out.push_str(&format!("{}\n{}\n", self.title, self.origin));
        line(&mut out, &self.output_file, "output file name");
        line(&mut out, &self.device_out, "device out (6=stdout,7=stderr,file)");
        list(&mut out, &self.sizes, "number of problem sizes (N)", "Ns");
        list(&mut out, &self.block_sizes, "number of NBs", "NBs");
        line(&mut out, self.pmap, "PMAP process mapping (0=Row-,1=Column-major)");
        list(&mut out, &ps, "number of process grids (P x Q)", "Ps");
        line(&mut out, join(&qs), "Qs");
        line(&mut out, format!("{:.1}", self.threshold), "threshold");
        list(&mut out, &self.pfacts, "number of panel fact", "PFACTs (0=left, 1=Crout, 2=Right)");
        list(&mut out, &self.nbmins, "number of recursive stopping criterium", "NBMINs (>= 1)");
        list(&mut out, &self.ndivs, "number of panels in recursion", "NDIVs");
        list(&mut out, &self.rfacts, "number of recursive panel fact", "RFACTs (0=left, 1=Crout, 2=Right)");
        list(&mut out, &self.bcasts, "number of broadcast", "BCASTs (0=1rg,1=1rM,2=2rg,3=2rM,4=Lng,5=LnM)");
        list(&mut out, &self.depths, "number of lookahead depth", "DEPTHs (>=0)");
        line(&mut out, self.swap, "SWAP (0=bin-exch,1=long,2=mix)");
        line(&mut out, self.swap_threshold, "swapping threshold");
        line(&mut out, self.l1, "L1 in (0=transposed,1=no-transposed) form");
        line(&mut out, self.u, "U  in (0=transposed,1=no-transposed) form");
        line(&mut out, self.equilibration, "Equilibration (0=no,1=yes)");
        line(&mut out, self.alignment, "memory alignment in double (> 0)");

        Ok(out)
    }

    /// Render and write the deck to `path`
    pub fn write(&self, path: &Path) -> Result<()> {
        let text = self.render()?;
        std::fs::write(path, text).with_path(path)
    }

    /// Read a deck back; every count must match its list
    pub fn parse(text: &str) -> Result<Self> {
        let lines: Vec<&str> = text.lines().collect();
        let reader = Reader { lines: &lines };

        let grids_p: Vec<usize> = reader.list(9, 10)?;
        let grids_q: Vec<usize> = reader.values(11, grids_p.len())?;

        Ok(Self {
            title: reader.line(0)?.trim_end().to_string(),
            origin: reader.line(1)?.trim_end().to_string(),
            output_file: reader.first(2)?,
            device_out: reader.first(3)?,
            sizes: reader.list(4, 5)?,
            block_sizes: reader.list(6, 7)?,
            pmap: reader.scalar(8)?,
            grids: grids_p
                .into_iter()
                .zip(grids_q)
                .map(|(p, q)| ProcessGrid { p, q })
                .collect(),
            threshold: reader.scalar(12)?,
            pfacts: reader.list(13, 14)?,
            nbmins: reader.list(15, 16)?,
            ndivs: reader.list(17, 18)?,
            rfacts: reader.list(19, 20)?,
            bcasts: reader.list(21, 22)?,
            depths: reader.list(23, 24)?,
            swap: reader.scalar(25)?,
            swap_threshold: reader.scalar(26)?,
            l1: reader.scalar(27)?,
            u: reader.scalar(28)?,
            equilibration: reader.scalar(29)?,
            alignment: reader.scalar(30)?,
        })
    }

    /// Read a deck file
    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_path(path)?;
        Self::parse(&text)
    }
}

fn join<T: Display>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

fn line(out: &mut String, value: impl Display, comment: &str) {
    out.push_str(&format!("{:<20} {}\n", value.to_string(), comment));
}

fn list<T: Display>(out: &mut String, values: &[T], count_comment: &str, comment: &str) {
    line(out, values.len(), count_comment);
    line(out, join(values), comment);
}

struct Reader<'a> {
    lines: &'a [&'a str],
}

impl Reader<'_> {
    fn line(&self, index: usize) -> Result<&str> {
        self.lines
            .get(index)
            .copied()
            .ok_or_else(|| HarnessError::config(format!("HPL.dat: missing line {}", index + 1)))
    }

    fn first(&self, index: usize) -> Result<String> {
        self.line(index)?
            .split_whitespace()
            .next()
            .map(str::to_string)
            .ok_or_else(|| HarnessError::config(format!("HPL.dat: line {} is empty", index + 1)))
    }

    fn scalar<T: FromStr>(&self, index: usize) -> Result<T> {
        let token = self.first(index)?;
        token.parse().map_err(|_| {
            HarnessError::config(format!("HPL.dat: bad value '{}' on line {}", token, index + 1))
        })
    }

    fn values<T: FromStr>(&self, index: usize, count: usize) -> Result<Vec<T>> {
        let tokens: Vec<&str> = self.line(index)?.split_whitespace().take(count).collect();
        if tokens.len() < count {
            return Err(HarnessError::config(format!(
                "HPL.dat: line {} has {} values, expected {}",
                index + 1,
                tokens.len(),
                count
            )));
        }
        tokens
            .into_iter()
            .map(|t| {
                t.parse().map_err(|_| {
                    HarnessError::config(format!("HPL.dat: bad value '{}' on line {}", t, index + 1))
                })
            })
            .collect()
    }

    fn list<T: FromStr>(&self, count_line: usize, values_line: usize) -> Result<Vec<T>> {
        let count: usize = self.scalar(count_line)?;
        self.values(values_line, count)
    }
}
