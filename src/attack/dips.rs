use crate::error::{Error, Result};
use giputils::hash::GHashSet;
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

/// Input vectors of frames 1, 2, ...
pub type Dip = Vec<Vec<bool>>;

/// Confirmed dips in discovery order, optionally mirrored to a file with one
/// dip per line.
#[derive(Debug, Default)]
pub struct DipLog {
    dips: Vec<Dip>,
    seen: GHashSet<Dip>,
    file: Option<PathBuf>,
}

/// Frames separated by single spaces. A frame without inputs is written as
/// `-` so that every frame keeps a token of its own.
pub fn format_dip(dip: &Dip) -> String {
    dip.iter()
        .map(|frame| {
            if frame.is_empty() {
                "-".to_string()
            } else {
                frame.iter().map(|b| if *b { '1' } else { '0' }).collect()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

impl DipLog {
    pub fn new(file: Option<PathBuf>) -> Self {
        Self {
            file,
            ..Default::default()
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.dips.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dips.is_empty()
    }

    #[inline]
    pub fn contains(&self, dip: &Dip) -> bool {
        self.seen.contains(dip)
    }

    /// Records a new dip and appends it to the file. Returns false for a
    /// repeat.
    pub fn record(&mut self, dip: Dip) -> Result<bool> {
        self.insert(dip, true)
    }

    fn insert(&mut self, dip: Dip, persist: bool) -> Result<bool> {
        if !self.seen.insert(dip.clone()) {
            return Ok(false);
        }
        if let (true, Some(path)) = (persist, self.file.as_ref()) {
            let mut f = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| Error::io(path, e))?;
            writeln!(f, "{}", format_dip(&dip)).map_err(|e| Error::io(path, e))?;
        }
        self.dips.push(dip);
        Ok(true)
    }

    /// Takes over dips read back from the file without writing them again.
    pub fn restore(&mut self, dip: Dip) -> bool {
        // persist is off, so this never touches the file
        self.insert(dip, false).unwrap_or(false)
    }

    /// Reads a dip file written by [`DipLog::record`]. Every frame vector must
    /// have `width` bits.
    pub fn load(path: impl AsRef<Path>, width: usize) -> Result<Vec<Dip>> {
        let path = path.as_ref();
        let src = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let mut dips = Vec::new();
        for (i, line) in src.lines().enumerate() {
            let parse_err = |reason: String| Error::Parse {
                path: path.to_path_buf(),
                line: i + 1,
                reason,
            };
            if line.trim().is_empty() {
                continue;
            }
            let mut dip = Dip::new();
            for frame in line.split_whitespace() {
                let frame = if frame == "-" { "" } else { frame };
                if frame.len() != width {
                    return Err(parse_err(format!(
                        "frame `{frame}` has {} bits, expected {width}",
                        frame.len()
                    )));
                }
                let bits = frame
                    .chars()
                    .map(|c| match c {
                        '0' => Ok(false),
                        '1' => Ok(true),
                        c => Err(parse_err(format!("unexpected `{c}`"))),
                    })
                    .collect::<Result<Vec<bool>>>()?;
                dip.push(bits);
            }
            dips.push(dip);
        }
        Ok(dips)
    }
}
