use crate::{
    attack::Key,
    circuit::{Circuit, WireId},
    error::{Error, Result},
    frontend::{Gate, Netlist},
};
use giputils::hash::GHashSet;
use rand::Rng;
use tracing::{debug, info};

/// Inserts `num_keys` random xor/xnor key gates. A gate driving `w` is
/// renamed to `w_obf` and `w = xor(w_obf, keyinputN)` is added for key bit 0,
/// `xnor` for key bit 1, so the returned key restores the unlocked function.
pub fn lock(netlist: &Netlist, num_keys: usize, rng: &mut impl Rng) -> Result<(Netlist, Key)> {
    let circuit = Circuit::load(netlist.clone())?;
    let lockable = (0..circuit.num_wires())
        .map(WireId::new)
        .filter(|w| {
            !circuit.wire(*w).kind.is_source() || circuit.wire(*w).kind.is_register()
        })
        .filter(|w| !circuit.fanout(*w).is_empty())
        .count();
    if lockable < num_keys {
        return Err(Error::malformed(
            &circuit.name,
            format!("only {lockable} wires can take a key gate, {num_keys} requested"),
        ));
    }
    let mut chosen = GHashSet::new();
    let mut picked = Vec::with_capacity(num_keys);
    while picked.len() < num_keys {
        let Some(w) = circuit.random_wire(rng) else {
            break;
        };
        if circuit.fanout(w).is_empty() || !chosen.insert(w) {
            continue;
        }
        picked.push(w);
    }
    let mut locked = netlist.clone();
    let mut key = Vec::with_capacity(num_keys);
    let mut next_key = circuit.keys.len();
    for w in picked {
        let name = circuit.name(w).to_string();
        let key_name = loop {
            let k = format!("keyinput{next_key}");
            next_key += 1;
            if circuit.get(&k).is_none() {
                break k;
            }
        };
        let obf = format!("{name}_obf");
        for g in locked.gates.iter_mut().filter(|g| g.output == name) {
            g.output = obf.clone();
        }
        let bit: bool = rng.random();
        let kind = if bit { "XNOR" } else { "XOR" };
        debug!("{name} = {kind}({obf}, {key_name})");
        locked.gates.push(Gate::new(name, kind, &[&obf, &key_name]));
        locked.inputs.push(key_name);
        key.push(bit);
    }
    locked.name = format!("{}_locked", netlist.name);
    let key = Key(key);
    info!("locked `{}` with {} key bits, key={key}", netlist.name, key.0.len());
    Ok((locked, key))
}
