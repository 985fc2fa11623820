mod bench;
mod verilog;

use crate::{
    circuit::Circuit,
    error::{Error, Result},
};
use std::{fs, path::Path};

/// A gate line as written in the source file, before validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Gate {
    pub output: String,
    pub kind: String,
    pub operands: Vec<String>,
}

impl Gate {
    pub fn new(output: impl Into<String>, kind: impl Into<String>, operands: &[&str]) -> Self {
        Self {
            output: output.into(),
            kind: kind.into(),
            operands: operands.iter().map(|o| o.to_string()).collect(),
        }
    }
}

/// Unvalidated netlist. Key inputs are the inputs whose name contains
/// `keyinput`; [`Circuit::load`] does the partitioning.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Netlist {
    pub name: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub gates: Vec<Gate>,
}

impl Netlist {
    pub fn parse_bench(name: &str, src: &str) -> std::result::Result<Self, (usize, String)> {
        bench::parse(name, src)
    }

    pub fn parse_verilog(src: &str) -> std::result::Result<Self, (usize, String)> {
        verilog::parse(src)
    }

    pub fn to_bench(&self) -> String {
        bench::write(self)
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn read_netlist(path: impl AsRef<Path>) -> Result<Netlist> {
    let path = path.as_ref();
    let src = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let parsed = match path.extension().and_then(|e| e.to_str()) {
        Some("v") | Some("sv") => Netlist::parse_verilog(&src),
        _ => Netlist::parse_bench(&file_stem(path), &src),
    };
    parsed.map_err(|(line, reason)| Error::Parse {
        path: path.to_path_buf(),
        line,
        reason,
    })
}

pub fn write_bench(path: impl AsRef<Path>, netlist: &Netlist) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, netlist.to_bench()).map_err(|e| Error::io(path, e))
}

pub fn load_circuit(path: impl AsRef<Path>) -> Result<Circuit> {
    Circuit::load(read_netlist(path)?)
}
