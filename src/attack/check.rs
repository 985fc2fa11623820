use super::Attack;
use crate::formula::KeyCopy;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Umc {
    Unique,
    Unknown,
}

impl Attack {
    /// Called once no dip exists at the current depth. Without registers a
    /// single frame covers every behavior. Otherwise the key is unique once
    /// some dip has been confirmed and no two distinct keys satisfy the
    /// constraints at all.
    pub(super) fn unique_completion(&mut self) -> bool {
        if !self.locked.circuit.has_state() {
            info!("uc successful");
            return true;
        }
        let start = Instant::now();
        let distinct = self.dip_solver.is_sat(&self.locked.tm, &[]);
        self.statistic.check_time += start.elapsed();
        if !distinct && !self.dips.is_empty() {
            info!("uc successful");
            return true;
        }
        false
    }

    /// One-step equivalence: from any common register state, no input makes
    /// two consistent keys disagree on an output or a next state.
    pub(super) fn combinational_equivalence(&mut self) -> bool {
        let start = Instant::now();
        self.key_solver.push();
        let frame = self.locked.obf_frame(1);
        self.key_solver.assert_all(&self.locked.tm, &frame);
        let same_state: Vec<_> = (0..self.locked.circuit.next_states.len())
            .map(|i| {
                let a = self.locked.next_sym(Some(KeyCopy::K0), 0, i);
                let b = self.locked.next_sym(Some(KeyCopy::K1), 0, i);
                self.locked.tm.iff(a, b)
            })
            .collect();
        let same_state = self.locked.tm.and(same_state);
        let out = self.locked.outputs_differ(1);
        let next = self.locked.next_states_differ(1);
        let differ = self.locked.tm.or([out, next]);
        let sat = self
            .key_solver
            .is_sat(&self.locked.tm, &[same_state, differ]);
        self.key_solver.pop();
        self.statistic.check_time += start.elapsed();
        if sat {
            warn!("ce failed");
        } else {
            info!("ce successful");
        }
        !sat
    }

    pub(super) fn unique_minimal_completion(&mut self) -> Umc {
        warn!("umc check is not supported by the sat engine");
        Umc::Unknown
    }
}
