use dipsat::{
    frontend::{write_bench, Netlist},
    lock::lock,
    options::{AttackOptions, OracleEngine, Reset, UnrollOptions},
    oracle::{Oracle, SimOracle},
    sim::Simulator,
    supervise::attack_files,
    Attack, AttackConfig, Circuit, Error, Key, Outcome,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{fs, thread, time::Duration};

const S27: &str = "
# ISCAS'89 s27
INPUT(G0)
INPUT(G1)
INPUT(G2)
INPUT(G3)
OUTPUT(G17)
G5 = DFF(G10)
G6 = DFF(G11)
G7 = DFF(G13)
G14 = NOT(G0)
G17 = NOT(G11)
G8 = AND(G14, G6)
G15 = OR(G12, G8)
G16 = OR(G3, G8)
G9 = NAND(G16, G15)
G10 = NOR(G14, G11)
G11 = NOR(G5, G9)
G12 = NOR(G1, G7)
G13 = NOR(G2, G12)
";

fn circuit(src: &str) -> Circuit {
    Circuit::load(Netlist::parse_bench("t", src).unwrap()).unwrap()
}

fn config(boundary: u32, step: u32, stop: u32) -> AttackConfig {
    AttackConfig {
        unroll: UnrollOptions {
            boundary,
            step,
            stop,
        },
        ..Default::default()
    }
}

fn attack(oracle: &str, locked: &str, config: AttackConfig) -> dipsat::AttackReport {
    Attack::new(circuit(oracle), circuit(locked), config)
        .unwrap()
        .run()
        .unwrap()
}

const BUF: &str = "INPUT(a)\nOUTPUT(out)\nout = BUF(a)\n";
const NOT: &str = "INPUT(a)\nOUTPUT(out)\nout = NOT(a)\n";

#[test]
fn key_independent_buffer_is_unique_at_depth_one() {
    let locked = "
INPUT(a)
INPUT(keyinput0)
OUTPUT(out)
t = XOR(keyinput0, a)
out = XOR(t, keyinput0)
";
    let r = attack(BUF, locked, AttackConfig::default());
    assert_eq!(r.outcome, Outcome::UniqueCompletion);
    assert_eq!(r.depth, 1);
    assert_eq!(r.iterations, 0);
    assert_eq!(r.key.map(|k| k.0.len()), Some(1));
}

#[test]
fn inverter_needs_one_dip() {
    let locked = "INPUT(a)\nINPUT(keyinput0)\nOUTPUT(out)\nout = XOR(a, keyinput0)\n";
    for engine in [OracleEngine::Sat, OracleEngine::Sim] {
        let config = AttackConfig {
            oracle_engine: engine,
            ..Default::default()
        };
        let r = attack(NOT, locked, config);
        assert_eq!(r.outcome, Outcome::UniqueCompletion);
        assert_eq!(r.iterations, 1);
        assert_eq!(r.key, Some("1".parse().unwrap()));
    }
}

#[test]
fn repeated_stateful_dip_bans_the_wrong_key() {
    // with key 1 the output depends on a register that powers up anywhere
    let locked = "
INPUT(a)
INPUT(keyinput0)
OUTPUT(out)
r = DFF(a)
g = AND(keyinput0, r)
out = XOR(a, g)
";
    let config = AttackConfig {
        reset: Reset::Free,
        ..config(4, 2, 8)
    };
    let r = attack(BUF, locked, config);
    assert_eq!(r.outcome, Outcome::UniqueCompletion);
    assert_eq!(r.banned_keys, 1);
    assert!((1..=2).contains(&r.iterations), "{r:?}");
    assert_eq!(r.key, Some(Key(vec![false])));
}

#[test]
fn equivalent_keys_end_in_combinational_equivalence() {
    // only keyinput0 ^ keyinput1 matters
    let oracle = "INPUT(a)\nOUTPUT(out)\nr = DFF(a)\nout = BUF(r)\n";
    let locked = "
INPUT(a)
INPUT(keyinput0)
INPUT(keyinput1)
OUTPUT(out)
t = XOR(keyinput0, keyinput1)
d = XOR(a, t)
r = DFF(d)
out = BUF(r)
";
    let r = attack(oracle, locked, config(1, 1, 5));
    assert_eq!(r.outcome, Outcome::CombinationalEquivalence);
    assert_eq!(r.iterations, 1);
    let key = r.key.unwrap();
    assert_eq!(key.0[0], key.0[1]);
}

#[test]
fn recovers_random_key_of_s27() {
    let netlist = Netlist::parse_bench("s27", S27).unwrap();
    let mut rng = StdRng::seed_from_u64(2024);
    let (locked, _) = lock(&netlist, 3, &mut rng).unwrap();
    let oracle = Circuit::load(netlist).unwrap();
    let locked = Circuit::load(locked).unwrap();
    let r = Attack::new(oracle.clone(), locked.clone(), config(4, 4, 16))
        .unwrap()
        .run()
        .unwrap();
    assert_ne!(r.outcome, Outcome::Timeout);
    let key = r.key.unwrap();
    // an exhausted search only vouches for sequences up to its depth
    let len = match r.outcome {
        Outcome::Exhausted => r.highest_depth.min(8),
        _ => 8,
    };
    for _ in 0..50 {
        let seq: Vec<Vec<bool>> = (0..len)
            .map(|_| (0..4).map(|_| rng.random()).collect())
            .collect();
        let want = Simulator::new(&oracle, &[]).run(&seq);
        let got = Simulator::new(&locked, &key.0).run(&seq);
        assert_eq!(want, got);
    }
}

#[test]
fn keyless_circuit_is_trivially_unique() {
    let r = attack(BUF, BUF, AttackConfig::default());
    assert_eq!(r.outcome, Outcome::UniqueCompletion);
    assert_eq!(r.key, Some(Key(Vec::new())));
}

#[test]
fn mismatched_interfaces_are_rejected() {
    let other = "INPUT(b)\nOUTPUT(out)\nout = BUF(b)\n";
    let err = Attack::new(circuit(BUF), circuit(other), AttackConfig::default())
        .err()
        .unwrap();
    assert!(matches!(err, Error::CircuitMismatch(_)));
}

#[test]
fn expired_deadline_reports_timeout() {
    let locked = "INPUT(a)\nINPUT(keyinput0)\nOUTPUT(out)\nout = XOR(a, keyinput0)\n";
    let config = AttackConfig {
        timeout: Some(Duration::ZERO),
        ..Default::default()
    };
    let r = attack(NOT, locked, config);
    assert_eq!(r.outcome, Outcome::Timeout);
    assert_eq!(r.key, None);
}

#[test]
fn dips_file_resumes_attack() {
    let dir = tempfile::tempdir().unwrap();
    let oracle = dir.path().join("oracle.bench");
    let locked = dir.path().join("locked.bench");
    let dips = dir.path().join("dips.txt");
    fs::write(&oracle, NOT).unwrap();
    write_bench(
        &locked,
        &Netlist::parse_bench(
            "locked",
            "INPUT(a)\nINPUT(keyinput0)\nOUTPUT(out)\nout = XOR(a, keyinput0)\n",
        )
        .unwrap(),
    )
    .unwrap();
    let mut options = AttackOptions {
        oracle,
        locked,
        oracle_engine: OracleEngine::Sat,
        unroll: UnrollOptions::default(),
        reset: Reset::Zero,
        timeout: 60,
        dips: Some(dips.clone()),
        resume: false,
        no_isolate: true,
    };
    let first = attack_files(&options).unwrap();
    assert_eq!(first.iterations, 1);
    assert_eq!(fs::read_to_string(&dips).unwrap().lines().count(), 1);

    options.resume = true;
    let second = attack_files(&options).unwrap();
    assert_eq!(second.outcome, Outcome::UniqueCompletion);
    assert_eq!(second.iterations, 1);
    assert_eq!(second.key, first.key);
    assert_eq!(fs::read_to_string(&dips).unwrap().lines().count(), 1);
}

#[test]
fn key_hidden_past_stop_is_exhausted() {
    // the key enters a three-register shift chain, so no output can tell
    // two keys apart before frame 4
    let oracle = "
INPUT(a)
OUTPUT(out)
r1 = DFF(a)
r2 = DFF(r1)
r3 = DFF(r2)
out = BUF(r3)
";
    let locked = "
INPUT(a)
INPUT(keyinput0)
OUTPUT(out)
d = XOR(a, keyinput0)
r1 = DFF(d)
r2 = DFF(r1)
r3 = DFF(r2)
out = BUF(r3)
";
    let r = attack(oracle, locked, config(1, 1, 3));
    assert_eq!(r.outcome, Outcome::Exhausted);
    assert_eq!(r.iterations, 0);
    assert_eq!(r.highest_depth, 3);
    assert_eq!(r.key.map(|k| k.0.len()), Some(1));

    // one frame deeper the dip exists and pins the key
    let r = attack(oracle, locked, config(1, 1, 4));
    assert_eq!(r.outcome, Outcome::UniqueCompletion);
    assert_eq!(r.key, Some(Key(vec![false])));
}

#[test]
fn stop_is_checked_before_boundary() {
    // the key drives a dangling gate, so every key is equivalent
    let oracle = "INPUT(a)\nOUTPUT(out)\nr = DFF(a)\nout = BUF(r)\n";
    let locked = "
INPUT(a)
INPUT(keyinput0)
OUTPUT(out)
r = DFF(a)
out = BUF(r)
u = NOT(keyinput0)
";
    let r = attack(oracle, locked, config(1, 1, 1));
    assert_eq!(r.outcome, Outcome::Exhausted);
    let r = attack(oracle, locked, config(1, 1, 2));
    assert_eq!(r.outcome, Outcome::CombinationalEquivalence);
    assert_eq!(r.depth, 1);
}

/// Answers the first query at once and stalls on the rest.
struct StallAfterFirst {
    inner: SimOracle,
    calls: usize,
}

impl Oracle for StallAfterFirst {
    fn query(&mut self, seq: &[Vec<bool>]) -> dipsat::Result<Vec<Vec<bool>>> {
        self.calls += 1;
        if self.calls > 1 {
            thread::sleep(Duration::from_millis(1500));
        }
        self.inner.query(seq)
    }
}

#[test]
fn timeout_keeps_depth_of_confirmed_dips() {
    // every dip reveals one bit of k0 & a ^ k1 & b, so two are needed
    let oracle = "INPUT(a)\nINPUT(b)\nOUTPUT(out)\nout = XOR(a, b)\n";
    let locked = "
INPUT(a)
INPUT(b)
INPUT(keyinput0)
INPUT(keyinput1)
OUTPUT(out)
x = AND(a, keyinput0)
y = AND(b, keyinput1)
out = XOR(x, y)
";
    let oracle = StallAfterFirst {
        inner: SimOracle::new(circuit(oracle)),
        calls: 0,
    };
    let config = AttackConfig {
        timeout: Some(Duration::from_millis(500)),
        ..Default::default()
    };
    let mut attack = Attack::with_oracle(circuit(locked), Box::new(oracle), config);
    let r = attack.run().unwrap();
    assert_eq!(attack.statistic().num_oracle_query, 2);
    assert_eq!(r.outcome, Outcome::Timeout);
    assert_eq!(r.iterations, 1);
    assert_eq!(r.highest_depth, 1);
}
