use crate::sync::irq::IrqControl;

/// IRQ mask bit in the CPSR.
const CPSR_I_BIT: u32 = 1 << 7;

/// Local IRQ masking through the ARM CPSR.
///
/// `State` records whether IRQs were enabled before [`IrqControl::disable`]
/// so that nested critical sections only unmask on the outermost exit.
pub struct ArmIrq;

impl IrqControl for ArmIrq {
    type State = bool;

    #[inline(always)]
    fn disable() -> bool {
        let cpsr: u32;
        // SAFETY: reads the CPSR and sets the I bit; touches no memory.
        unsafe {
            core::arch::asm!(
                "mrs {0}, cpsr",
                "cpsid i",
                out(reg) cpsr,
                options(nomem, nostack)
            );
        }
        cpsr & CPSR_I_BIT == 0
    }

    #[inline(always)]
    fn restore(was_enabled: bool) {
        if was_enabled {
            // SAFETY: clears the I bit that `disable` set.
            unsafe {
                core::arch::asm!("cpsie i", options(nomem, nostack));
            }
        }
    }
}
