#![no_main]

use std::collections::{HashMap, HashSet};

use lazer_core::{Lazer, ParameterIdentity, PickMode};
use libfuzzer_sys::fuzz_target;

/// One pick of a generated program.
struct Step {
    param: u8,
    /// Only run when the previous combined pick returned 0.
    guarded: bool,
}

// Parameters 0..4 are combined, 4..6 share one uncombined group. Sizes are fixed per parameter so domains stay
// consistent across repetitions.
fn size_of(param: u8) -> usize {
    2 + usize::from(param % 4)
}

fn mode_of(param: u8) -> PickMode {
    if param >= 4 { PickMode::uncombined("g") } else { PickMode::Combined }
}

fn decode(data: &[u8]) -> Vec<Step> {
    data.iter()
        .take(8)
        .map(|byte| {
            let param = byte % 6;
            // Uncombined members are always reached; a branch-local member could wrap onto an earlier combination.
            Step {
                param,
                guarded: param < 4 && byte & 0x80 != 0,
            }
        })
        .collect()
}

fuzz_target!(|data: &[u8]| {
    let program = decode(data);
    let bound: usize = program
        .iter()
        .map(|step| step.param)
        .collect::<HashSet<_>>()
        .into_iter()
        .map(size_of)
        .product();

    let mut lazer = Lazer::new();
    let mut produced = HashSet::new();
    while lazer.pending_combinations() {
        lazer.start_new().expect("pending combination must start");
        let mut last_combined = 0;
        let mut picked = HashMap::new();
        for step in &program {
            if step.guarded && last_combined != 0 {
                continue;
            }
            let identity = ParameterIdentity::keyed("p", u64::from(step.param));
            let index = lazer
                .pick(identity, size_of(step.param), &mode_of(step.param))
                .expect("consistent program");
            assert!(index < size_of(step.param));
            // Replays within one repetition return the same index.
            assert_eq!(*picked.entry(step.param).or_insert(index), index);
            if step.param < 4 {
                last_combined = index;
            }
        }
        let combination = lazer.complete_repetition().expect("deterministic program");
        assert!(produced.insert(combination));
        assert!(produced.len() <= bound.max(1), "more combinations than the domains allow");
    }
});
