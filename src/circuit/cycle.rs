use super::{Circuit, WireId};
use giputils::hash::{GHashMap, GHashSet};

/// Finds one combinational cycle among `stuck`, the wires the levelling pass
/// could not order. Each stuck wire reads at least one other stuck wire, so
/// walking backwards through stuck operands must revisit a wire.
pub(super) fn find(circuit: &Circuit, stuck: &[WireId]) -> Vec<WireId> {
    let mut stuck_set = GHashSet::new();
    stuck_set.extend(stuck.iter().copied());
    let Some(&start) = stuck.first() else {
        return Vec::new();
    };
    let mut path = Vec::new();
    let mut on_path: GHashMap<WireId, usize> = GHashMap::new();
    let mut w = start;
    loop {
        if let Some(&pos) = on_path.get(&w) {
            return path.split_off(pos);
        }
        on_path.insert(w, path.len());
        path.push(w);
        let next = circuit
            .wire(w)
            .operands
            .iter()
            .find(|o| stuck_set.contains(o));
        match next {
            Some(&n) => w = n,
            None => return path,
        }
    }
}
