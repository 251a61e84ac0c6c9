//! Architecture selection for interrupt masking.

cfg_if::cfg_if! {
    if #[cfg(target_arch = "arm")] {
        pub mod arm;
        pub use arm::irq::ArmIrq as CurrentIrq;
    } else {
        pub use crate::sync::irq::NoIrq as CurrentIrq;
    }
}
