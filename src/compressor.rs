//! Collapse a [`Timeline`] into a flat list of steps.
//!
//! Runs of inexact cycles become a single wait. The wait in front of an
//! exact bus access that carries an address is stretched at run time if the
//! access lands in the 1MHz region.

use crate::timeline::{AddrExpr, MicroOp, Timeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Wait(u32),
    /// Wait `cycles`, plus one or two more if `at` is a slow address.
    StretchedWait { cycles: u32, at: AddrExpr },
    Op(MicroOp),
}

fn wait(cycles: u32, addr: Option<AddrExpr>) -> Step {
    match addr {
        Some(at) => Step::StretchedWait { cycles, at },
        None => Step::Wait(cycles),
    }
}

/// Extra cycles for a stretched wait of `cycles` starting at clock `now`.
///
/// A 1MHz access has to line up with the slow clock, which ticks every other
/// 2MHz cycle, so the penalty is one or two cycles depending on where the
/// access would otherwise land.
pub fn stretch(cycles: u32, slow: bool, now: u64) -> u32 {
    if !slow {
        return 0;
    }
    let odd_now = (now & 1) as u32;
    let parity = if cycles & 1 != 0 { odd_now ^ 1 } else { odd_now };
    parity + 1
}

pub fn compress(timeline: &Timeline) -> Vec<Step> {
    let last = timeline.cycle();
    let mut steps = Vec::new();
    let mut pending = 0;

    for cycle in 0..last {
        let Some(slot) = timeline.slot(cycle) else {
            pending += 1;
            continue;
        };
        if pending > 0 && slot.exact {
            steps.push(wait(pending, slot.addr));
            pending = 0;
        }
        steps.extend(slot.ops.iter().copied().map(Step::Op));
        pending += 1;
    }

    let final_slot = timeline.slot(last);
    if pending > 0 {
        steps.push(wait(pending, final_slot.and_then(|slot| slot.addr)));
    }
    if let Some(slot) = final_slot {
        steps.extend(slot.ops.iter().copied().map(Step::Op));
    }

    steps
}
