use bitflags::bitflags;
use log::debug;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InterruptType {
    NMI,
    IRQ,
    BRK,
}

impl InterruptType {
    pub fn vector(self) -> u16 {
        match self {
            InterruptType::NMI => 0xFFFA,
            InterruptType::IRQ | InterruptType::BRK => 0xFFFE,
        }
    }
}

bitflags! {
    /// Devices that can hold the IRQ line low.
    #[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
    pub struct IrqSource: u8 {
        const FEEDBACK   = 0b0000_0001;
        const SYSTEM_VIA = 0b0000_0010;
        const USER_VIA   = 0b0000_0100;
    }
}

/// IRQ is level-triggered and stays asserted while any source holds it.
/// NMI is edge-triggered and latched until the CPU takes it.
#[derive(Default)]
pub struct InterruptController {
    irq: IrqSource,
    nmi: bool,
}

impl InterruptController {
    pub fn request_irq(&mut self, source: IrqSource) {
        if !self.irq.contains(source) {
            debug!("IRQ asserted by {:?}", source);
        }
        self.irq.insert(source);
    }

    pub fn clear_irq(&mut self, source: IrqSource) {
        self.irq.remove(source);
    }

    pub fn request_nmi(&mut self) {
        debug!("NMI requested");
        self.nmi = true;
    }

    pub fn acknowledge_nmi(&mut self) {
        self.nmi = false;
    }

    pub fn irq_asserted(&self) -> bool {
        !self.irq.is_empty()
    }

    pub fn nmi_pending(&self) -> bool {
        self.nmi
    }

    pub fn status_string(&self) -> String {
        format!(
            "I:{}{}",
            if self.nmi { "N" } else { "." },
            if self.irq_asserted() { "I" } else { "." },
        )
    }
}
