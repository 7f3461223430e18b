//! The undocumented NMOS opcodes that are modelled: SAX, ASR and SLO.

use rust_beeb::bus::BusEvent;
use rust_beeb::{BeebBus, Bus, CpuType, DispatchStrategy, Dispatcher, Flags, CPU};
use std::sync::Arc;

fn setup_cpu() -> CPU<BeebBus> {
    let dispatcher = Dispatcher::build(CpuType::NMOS6502, DispatchStrategy::Table).unwrap();
    let mut cpu = CPU::new(BeebBus::new(), Arc::new(dispatcher));
    cpu.pc = 0x1000;
    cpu.regs.sp = 0xFF;
    cpu.p = Flags::empty();
    cpu
}

// ========== SAX ==========

#[test]
fn test_sax_zero_page_stores_a_and_x() {
    // SAX $10
    let mut cpu = setup_cpu();
    cpu.bus.load(0x1000, &[0x87, 0x10]);
    cpu.regs.a = 0xF0;
    cpu.regs.x = 0x3C;
    cpu.p = Flags::CARRY;

    cpu.step().unwrap();

    assert_eq!(cpu.bus.peek(0x0010), 0x30);
    assert_eq!((cpu.regs.a, cpu.regs.x), (0xF0, 0x3C));
    assert_eq!(cpu.p, Flags::CARRY);
    assert_eq!(cpu.pc, 0x1002);
    assert_eq!(cpu.bus.cycles(), 3);
}

#[test]
fn test_sax_absolute_leaves_flags_alone() {
    // SAX $2000 with a zero result
    let mut cpu = setup_cpu();
    cpu.bus.load(0x2000, &[0xFF]);
    cpu.bus.load(0x1000, &[0x8F, 0x00, 0x20]);
    cpu.regs.a = 0x0F;
    cpu.regs.x = 0xF0;

    cpu.step().unwrap();

    assert_eq!(cpu.bus.peek(0x2000), 0x00);
    assert!(!cpu.p.contains(Flags::ZERO));
    assert_eq!(cpu.bus.cycles(), 4);
}

// ========== ASR ==========

#[test]
fn test_asr_immediate_rotates_through_carry() {
    // ASR #$05 with A=$0F, C set
    let mut cpu = setup_cpu();
    cpu.bus.load(0x1000, &[0x4B, 0x05]);
    cpu.regs.a = 0x0F;
    cpu.p = Flags::CARRY;

    cpu.step().unwrap();

    assert_eq!(cpu.regs.a, 0x82);
    assert!(cpu.p.contains(Flags::CARRY | Flags::NEGATIVE));
    assert!(!cpu.p.contains(Flags::ZERO));
    assert_eq!(cpu.pc, 0x1002);
    assert_eq!(cpu.bus.cycles(), 2);
}

#[test]
fn test_asr_immediate_sets_zero() {
    // ASR #$01 with A=$FF, C clear
    let mut cpu = setup_cpu();
    cpu.bus.load(0x1000, &[0x4B, 0x01]);
    cpu.regs.a = 0xFF;

    cpu.step().unwrap();

    assert_eq!(cpu.regs.a, 0x00);
    assert!(cpu.p.contains(Flags::CARRY | Flags::ZERO));
    assert!(!cpu.p.contains(Flags::NEGATIVE));
}

// ========== SLO ==========

#[test]
fn test_slo_zero_page_ors_into_accumulator() {
    // SLO $10 with A=$01, C set
    let mut cpu = setup_cpu();
    cpu.bus.load(0x0010, &[0x81]);
    cpu.bus.load(0x1000, &[0x07, 0x10]);
    cpu.regs.a = 0x01;
    cpu.p = Flags::CARRY;

    cpu.step().unwrap();

    assert_eq!(cpu.bus.peek(0x0010), 0x03);
    assert_eq!(cpu.regs.a, 0x03);
    assert!(cpu.p.contains(Flags::CARRY));
    assert!(!cpu.p.intersects(Flags::NEGATIVE | Flags::ZERO));
    assert_eq!(cpu.bus.cycles(), 5);
}

#[test]
fn test_slo_absolute_x_writes_base_address() {
    // SLO $20F0,X with X=$20
    let mut cpu = setup_cpu();
    cpu.bus.load(0x2010, &[0xAA]);
    cpu.bus.load(0x2110, &[0x01]);
    cpu.bus.load(0x1000, &[0x1F, 0xF0, 0x20]);
    cpu.regs.x = 0x20;
    cpu.bus.enable_trace();

    cpu.step().unwrap();

    let accesses: Vec<BusEvent> = cpu
        .bus
        .take_trace()
        .into_iter()
        .filter(|event| match event {
            BusEvent::Read { addr, .. } => !(0x1000..0x1003).contains(addr),
            BusEvent::Wait(_) => false,
            _ => true,
        })
        .collect();
    assert_eq!(
        accesses,
        vec![
            BusEvent::Read {
                addr: 0x2010,
                value: 0xAA
            },
            BusEvent::Read {
                addr: 0x2110,
                value: 0x01
            },
            BusEvent::Write {
                addr: 0x2110,
                value: 0x01
            },
            BusEvent::Write {
                addr: 0x20F0,
                value: 0x02
            },
            BusEvent::Write {
                addr: 0x2110,
                value: 0x02
            },
        ]
    );
    assert_eq!(cpu.regs.a, 0x02);
    assert_eq!(cpu.bus.cycles(), 7);
}
