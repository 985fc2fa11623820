use super::{Gate, Netlist};
use std::fmt::Write;

type ParseResult<T> = Result<T, (usize, String)>;

fn call(line: &str) -> Option<(&str, Vec<&str>)> {
    let open = line.find('(')?;
    let close = line.rfind(')')?;
    if close < open || !line[close + 1..].trim().is_empty() {
        return None;
    }
    let args = line[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .collect();
    Some((line[..open].trim(), args))
}

pub fn parse(name: &str, src: &str) -> ParseResult<Netlist> {
    let mut netlist = Netlist {
        name: name.to_string(),
        ..Default::default()
    };
    for (i, line) in src.lines().enumerate() {
        let lineno = i + 1;
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        if let Some((lhs, rhs)) = line.split_once('=') {
            let output = lhs.trim();
            let Some((kind, operands)) = call(rhs.trim()) else {
                return Err((lineno, format!("expected `TYPE(...)` after `{output} =`")));
            };
            if output.is_empty() || kind.is_empty() {
                return Err((lineno, "gate without name or type".to_string()));
            }
            netlist.gates.push(Gate::new(output, kind, &operands));
            continue;
        }
        let Some((decl, args)) = call(line) else {
            return Err((lineno, format!("unrecognized line `{line}`")));
        };
        let [port] = args[..] else {
            return Err((lineno, format!("{decl} takes exactly one name")));
        };
        match decl.to_ascii_uppercase().as_str() {
            "INPUT" => netlist.inputs.push(port.to_string()),
            "OUTPUT" => netlist.outputs.push(port.to_string()),
            _ => return Err((lineno, format!("unknown declaration `{decl}`"))),
        }
    }
    Ok(netlist)
}

pub fn write(netlist: &Netlist) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}", netlist.name);
    for i in netlist.inputs.iter() {
        let _ = writeln!(out, "INPUT({i})");
    }
    for o in netlist.outputs.iter() {
        let _ = writeln!(out, "OUTPUT({o})");
    }
    out.push('\n');
    for g in netlist.gates.iter() {
        let _ = writeln!(
            out,
            "{} = {}({})",
            g.output,
            g.kind.to_ascii_uppercase(),
            g.operands.join(", ")
        );
    }
    out
}
