use super::{Gate, Netlist};
use giputils::hash::GHashSet;

type ParseResult<T> = Result<T, (usize, String)>;

fn strip_comments(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut rest = src;
    loop {
        let line = rest.find("//");
        let block = rest.find("/*");
        match (line, block) {
            (Some(l), b) if b.is_none_or(|b| l < b) => {
                out.push_str(&rest[..l]);
                rest = &rest[l..];
                match rest.find('\n') {
                    Some(nl) => rest = &rest[nl..],
                    None => break,
                }
            }
            (_, Some(b)) => {
                out.push_str(&rest[..b]);
                rest = &rest[b + 2..];
                let end = rest.find("*/").unwrap_or(rest.len());
                // keep newlines so line numbers survive
                out.extend(rest[..end].chars().filter(|c| *c == '\n'));
                rest = rest.get(end + 2..).unwrap_or_default();
            }
            _ => {
                out.push_str(rest);
                break;
            }
        }
    }
    out
}

fn compact(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

fn parse_range(decl: &str) -> ParseResult<Option<(i64, i64)>> {
    let Some(open) = decl.find('[') else {
        return Ok(None);
    };
    let close = decl.find(']').ok_or((0, "unterminated range".to_string()))?;
    let range = compact(&decl[open + 1..close]);
    let (msb, lsb) = range
        .split_once(':')
        .ok_or((0, format!("bad range `{range}`")))?;
    let msb = msb.parse().map_err(|_| (0, format!("bad msb `{msb}`")))?;
    let lsb = lsb.parse().map_err(|_| (0, format!("bad lsb `{lsb}`")))?;
    Ok(Some((msb, lsb)))
}

fn declared_names(body: &str) -> ParseResult<Vec<String>> {
    let range = parse_range(body)?;
    let names = match body.find(']') {
        Some(close) => &body[close + 1..],
        None => body,
    };
    let mut res = Vec::new();
    for name in names.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        match range {
            Some((msb, lsb)) => {
                let (lo, hi) = (msb.min(lsb), msb.max(lsb));
                for i in lo..=hi {
                    res.push(format!("{name}[{i}]"));
                }
            }
            None => res.push(name.to_string()),
        }
    }
    Ok(res)
}

fn constant(net: &str) -> Option<&'static str> {
    match net {
        "1'b0" | "1'h0" => Some("const0"),
        "1'b1" | "1'h1" => Some("const1"),
        _ => None,
    }
}

/// One instance connection, `.NAME(net)` or a bare positional `net`.
struct Port {
    name: Option<String>,
    net: String,
}

fn port(arg: &str) -> Port {
    let arg = compact(arg);
    match (arg.strip_prefix('.'), arg.find('('), arg.rfind(')')) {
        (Some(_), Some(o), Some(c)) if o < c => Port {
            name: Some(arg[1..o].to_ascii_uppercase()),
            net: arg[o + 1..c].to_string(),
        },
        _ => Port {
            name: None,
            net: arg,
        },
    }
}

const CLOCK_PORTS: [&str; 4] = ["CK", "CLK", "C", "G"];
const OUTPUT_PORTS: [&str; 6] = ["Y", "Z", "ZN", "O", "OUT", "Q"];

/// Puts named connections into positional order: `(CK, Q, D, ...)` for
/// registers and `(out, in...)` for gates. Unknown port names keep their
/// written order after the fixed ones.
fn positional(kind: &str, ports: Vec<Port>) -> ParseResult<Vec<String>> {
    let named = ports.iter().filter(|p| p.name.is_some()).count();
    if named == 0 {
        return Ok(ports.into_iter().map(|p| p.net).collect());
    }
    if named != ports.len() {
        return Err((0, format!("{kind} instance mixes named and positional ports")));
    }
    let mut rest: Vec<(String, String)> = ports
        .into_iter()
        .filter_map(|p| p.name.map(|n| (n, p.net)))
        .collect();
    let mut take = |names: &[&str]| {
        let i = rest.iter().position(|(n, _)| names.contains(&n.as_str()))?;
        Some(rest.remove(i).1)
    };
    let fixed = if matches!(kind, "dff" | "lat" | "latch") {
        let clock = take(&CLOCK_PORTS[..]).unwrap_or_default();
        let (Some(q), Some(d)) = (take(&["Q"]), take(&["D"])) else {
            return Err((0, format!("named {kind} instance needs .Q and .D ports")));
        };
        vec![clock, q, d]
    } else {
        let Some(out) = take(&OUTPUT_PORTS[..]) else {
            return Err((0, format!("named {kind} instance has no output port")));
        };
        vec![out]
    };
    Ok(fixed.into_iter().chain(rest.into_iter().map(|(_, n)| n)).collect())
}

fn split_ports(args: &str) -> Vec<Port> {
    let mut res = Vec::new();
    let mut depth = 0;
    let mut cur = String::new();
    for c in args.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                res.push(port(&cur));
                cur.clear();
                continue;
            }
            _ => (),
        }
        cur.push(c);
    }
    if !cur.trim().is_empty() {
        res.push(port(&cur));
    }
    res
}

struct Builder {
    netlist: Netlist,
    clocks: GHashSet<String>,
    constants: GHashSet<&'static str>,
}

impl Builder {
    fn operand(&mut self, net: String) -> String {
        match constant(&net) {
            Some(kind) => {
                if self.constants.insert(kind) {
                    self.netlist.gates.push(Gate::new(kind, kind, &[]));
                }
                kind.to_string()
            }
            None => net,
        }
    }

    fn instance(&mut self, stmt: &str) -> ParseResult<()> {
        let open = stmt
            .find('(')
            .ok_or((0, format!("unrecognized statement `{stmt}`")))?;
        let close = stmt.rfind(')').ok_or((0, "missing `)`".to_string()))?;
        let head: Vec<&str> = stmt[..open].split_whitespace().collect();
        let Some(kind) = head.first() else {
            return Err((0, "instance without gate type".to_string()));
        };
        let kind = kind.to_ascii_lowercase();
        let ports = positional(&kind, split_ports(&stmt[open + 1..close]))?;
        let (output, operands) = match kind.as_str() {
            "dff" | "lat" | "latch" => {
                if ports.len() < 3 {
                    return Err((0, format!("{kind} needs (CK, Q, D) ports")));
                }
                if !ports[0].is_empty() {
                    self.clocks.insert(ports[0].clone());
                }
                let end = if kind == "dff" { 3 } else { ports.len().min(5) };
                (ports[1].clone(), ports[2..end].to_vec())
            }
            _ => {
                let Some((out, ins)) = ports.split_first() else {
                    return Err((0, format!("{kind} instance without ports")));
                };
                (out.clone(), ins.to_vec())
            }
        };
        let operands: Vec<String> = operands.into_iter().map(|o| self.operand(o)).collect();
        self.netlist.gates.push(Gate {
            output,
            kind,
            operands,
        });
        Ok(())
    }

    fn assign(&mut self, body: &str) -> ParseResult<()> {
        let (lhs, rhs) = body
            .split_once('=')
            .ok_or((0, "assign without `=`".to_string()))?;
        let (lhs, rhs) = (compact(lhs), compact(rhs));
        if rhs.is_empty() || rhs.contains(|c: char| "&|^~?!(".contains(c)) {
            return Err((0, format!("only plain `assign a = b` is supported, got `{rhs}`")));
        }
        let rhs = self.operand(rhs);
        self.netlist.gates.push(Gate {
            output: lhs,
            kind: "buf".to_string(),
            operands: vec![rhs],
        });
        Ok(())
    }

    fn statement(&mut self, stmt: &str) -> ParseResult<bool> {
        let word = stmt.split(|c: char| c.is_whitespace() || c == '(' || c == '[').next();
        match word.unwrap_or_default() {
            "module" => {
                let rest = stmt["module".len()..].trim_start();
                let end = rest
                    .find(|c: char| c.is_whitespace() || c == '(')
                    .unwrap_or(rest.len());
                self.netlist.name = rest[..end].to_string();
            }
            "endmodule" => return Ok(false),
            "input" => {
                let names = declared_names(&stmt["input".len()..])?;
                self.netlist.inputs.extend(names);
            }
            "output" => {
                let names = declared_names(&stmt["output".len()..])?;
                self.netlist.outputs.extend(names);
            }
            "wire" | "reg" | "supply0" | "supply1" => (),
            "assign" => self.assign(&stmt["assign".len()..])?,
            _ => self.instance(stmt)?,
        }
        Ok(true)
    }
}

pub fn parse(src: &str) -> ParseResult<Netlist> {
    let src = strip_comments(src);
    let mut builder = Builder {
        netlist: Netlist::default(),
        clocks: GHashSet::new(),
        constants: GHashSet::new(),
    };
    let mut line = 1;
    for stmt in src.split(';') {
        let text = stmt.trim_start();
        let lineno = line + stmt[..stmt.len() - text.len()].matches('\n').count();
        line += stmt.matches('\n').count();
        let text = text.trim_end();
        if text.is_empty() {
            continue;
        }
        match builder.statement(text) {
            Ok(true) => (),
            Ok(false) => break,
            Err((_, reason)) => return Err((lineno, reason)),
        }
    }
    let Builder {
        mut netlist,
        clocks,
        ..
    } = builder;
    netlist.inputs.retain(|i| {
        !clocks.contains(i) || netlist.gates.iter().any(|g| g.operands.contains(i))
    });
    Ok(netlist)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_structural_module() {
        let src = "
// locked counter
module top(CK, a, keyinput0, y);
  input CK;
  input [1:0] a;
  input keyinput0;
  output y;
  wire n1, q;
  /* gates
     follow */
  xor g0 (n1, a[0], keyinput0);
  and g1 (y, n1, q, 1'b1);
  dff r0 (CK, q, a[1]);
  assign unused = q;
endmodule
";
        let n = parse(src).unwrap();
        assert_eq!(n.name, "top");
        assert_eq!(n.inputs, ["a[0]", "a[1]", "keyinput0"]);
        assert_eq!(n.outputs, ["y"]);
        assert!(n.gates.contains(&Gate::new("n1", "xor", &["a[0]", "keyinput0"])));
        assert!(n.gates.contains(&Gate::new("y", "and", &["n1", "q", "const1"])));
        assert!(n.gates.contains(&Gate::new("q", "dff", &["a[1]"])));
        assert!(n.gates.contains(&Gate::new("const1", "const1", &[])));
        assert!(n.gates.contains(&Gate::new("unused", "buf", &["q"])));
    }

    #[test]
    fn named_ports_follow_their_names() {
        let src = "
module m(clk, a, y);
  input clk, a;
  output y;
  DFF r0 (.D(a), .Q(q), .CK(clk));
  nand g0 (.A(a), .B(q), .ZN(y));
endmodule
";
        let n = parse(src).unwrap();
        assert_eq!(n.inputs, ["a"]);
        assert!(n.gates.contains(&Gate::new("q", "dff", &["a"])));
        assert!(n.gates.contains(&Gate::new("y", "nand", &["a", "q"])));

        let missing_d = "module m(a);\ninput a;\ndff r (.CK(c), .Q(q));\nendmodule\n";
        assert_eq!(parse(missing_d).unwrap_err().0, 3);
        let mixed = "module m(a);\ninput a;\nand g (y, .A(a));\nendmodule\n";
        assert_eq!(parse(mixed).unwrap_err().0, 3);
    }

    #[test]
    fn error_line_points_at_statement() {
        let src = "module m(a);\ninput a;\n\nassign b = a & a;\nendmodule\n";
        let (line, _) = parse(src).unwrap_err();
        assert_eq!(line, 4);
    }
}
